//! Scripted collaborators for meeting integration tests.
#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use parley::config::{LoggingConfig, MeetingConfig};
use parley::llm::{GenerationError, GenerationRequest, RequestKind, TextGenerator};
use parley::meeting::{
    HumanInput, InterruptScope, InterruptSource, MeetingServices, MeetingSettings, NeverInterrupt,
    Participant, PostMeetingHook, Turn, TurnSink,
};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// Answers by request kind; spoken turns are numbered so they stay distinct.
pub struct ScriptedGenerator {
    pub progression: &'static str,
    pub selection: &'static str,
    pub speaker_choice: &'static str,
    spoken: AtomicUsize,
    kinds: Mutex<Vec<RequestKind>>,
}

impl ScriptedGenerator {
    pub fn new(progression: &'static str) -> Self {
        Self {
            progression,
            selection: "cfo, engineer, designer",
            speaker_choice: "",
            spoken: AtomicUsize::new(0),
            kinds: Mutex::new(Vec::new()),
        }
    }

    pub fn with_selection(mut self, reply: &'static str) -> Self {
        self.selection = reply;
        self
    }

    pub fn count(&self, kind: RequestKind) -> usize {
        self.kinds
            .lock()
            .unwrap()
            .iter()
            .filter(|k| **k == kind)
            .count()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        self.kinds.lock().unwrap().push(request.kind);
        let reply = match request.kind {
            RequestKind::Urgency => "3".to_string(),
            RequestKind::Progression => self.progression.to_string(),
            RequestKind::ParticipantSelection => self.selection.to_string(),
            RequestKind::SpeakerChoice => self.speaker_choice.to_string(),
            RequestKind::Summary => "Minutes: travel budget cut, two hires approved.".to_string(),
            kind => {
                let n = self.spoken.fetch_add(1, Ordering::SeqCst);
                format!("{} number {}", kind, n)
            }
        };
        Ok(reply)
    }
}

/// Plays back a fixed list of lines, then passes.
pub struct ScriptedHuman {
    lines: Mutex<VecDeque<&'static str>>,
    pub prompts: AtomicUsize,
}

impl ScriptedHuman {
    pub fn new(lines: &[&'static str]) -> Self {
        Self {
            lines: Mutex::new(lines.iter().copied().collect()),
            prompts: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl HumanInput for ScriptedHuman {
    async fn read_line(&self, _prompt: &str) -> Result<String> {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .lines
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or("")
            .to_string())
    }
}

/// Fires immediately on the nth arm (1-based), never otherwise.
pub struct InterruptOnArm {
    target: usize,
    armed: AtomicUsize,
}

impl InterruptOnArm {
    pub fn new(target: usize) -> Self {
        Self {
            target,
            armed: AtomicUsize::new(0),
        }
    }
}

impl InterruptSource for InterruptOnArm {
    fn arm(&self) -> InterruptScope {
        let token = CancellationToken::new();
        if self.armed.fetch_add(1, Ordering::SeqCst) + 1 == self.target {
            token.cancel();
        }
        InterruptScope::detached(token)
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub turns: Mutex<Vec<Turn>>,
    pub notices: Mutex<Vec<String>>,
    pub abandoned: AtomicUsize,
}

impl TurnSink for RecordingSink {
    fn speaking(&self, _participant: &Participant) {}

    fn chunk(&self, _participant: &Participant, _text: &str) {}

    fn abandon(&self, _participant: &Participant) {
        self.abandoned.fetch_add(1, Ordering::SeqCst);
    }

    fn restart(&self, _participant: &Participant) {}

    fn turn(&self, turn: &Turn) {
        self.turns.lock().unwrap().push(turn.clone());
    }

    fn notice(&self, message: &str) {
        self.notices.lock().unwrap().push(message.to_string());
    }
}

pub fn settings(transcript_dir: &Path) -> MeetingSettings {
    MeetingSettings {
        meeting: MeetingConfig {
            retry_delay_seconds: 0,
            seed: Some(7),
            ..MeetingConfig::default()
        },
        max_tokens: 200,
        logging: LoggingConfig::default(),
        transcript_dir: transcript_dir.to_path_buf(),
    }
}

pub fn services(
    generator: Arc<ScriptedGenerator>,
    human: Option<Arc<ScriptedHuman>>,
    interrupts: Arc<dyn InterruptSource>,
    sink: Arc<RecordingSink>,
    hook: Option<Box<dyn PostMeetingHook>>,
) -> MeetingServices {
    MeetingServices {
        generator,
        interrupts,
        human: human.map(|h| h as Arc<dyn HumanInput>),
        sink,
        hook,
    }
}

pub fn never() -> Arc<dyn InterruptSource> {
    Arc::new(NeverInterrupt)
}
