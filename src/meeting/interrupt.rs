//! Barge-in: run one participant's generation while listening for the human.
//!
//! An [`InterruptScope`] is armed for exactly one generation and released when
//! it drops, on every exit path. An interrupt that arrives while nothing is
//! armed is reported to the meeting loop as an end-of-meeting request instead.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::llm::{GenerationError, GenerationRequest, TextGenerator};

use super::conversation::{ConversationLog, Turn};
use super::participant::Participant;
use super::retry::RetryPolicy;

pub const END_COMMANDS: [&str; 3] = ["exit", "quit", "end meeting"];

/// Spoken in place of a reply that could not be generated.
pub const FALLBACK_REPLY: &str = "I don't have anything to add on this point right now.";

pub fn is_end_command(input: &str) -> bool {
    let normalized = input.trim().to_lowercase();
    END_COMMANDS.contains(&normalized.as_str())
}

/// What the human typed when offered the floor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HumanReply {
    Spoke(String),
    Passed,
    EndRequested,
}

impl HumanReply {
    pub fn classify(input: &str) -> Self {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            Self::Passed
        } else if is_end_command(trimmed) {
            Self::EndRequested
        } else {
            Self::Spoke(trimmed.to_string())
        }
    }
}

/// Interrupt window for one generation. Dropping it disarms the source.
pub struct InterruptScope {
    token: CancellationToken,
    release: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl InterruptScope {
    pub fn new(token: CancellationToken, release: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            token,
            release: Some(Box::new(release)),
        }
    }

    /// A scope with nothing to release.
    pub fn detached(token: CancellationToken) -> Self {
        Self {
            token,
            release: None,
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_fired(&self) -> bool {
        self.token.is_cancelled()
    }

    pub async fn fired(&self) {
        self.token.cancelled().await
    }
}

impl Drop for InterruptScope {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

pub trait InterruptSource: Send + Sync {
    /// Arm for one generation.
    fn arm(&self) -> InterruptScope;

    /// Whether an interrupt arrived while nothing was armed.
    fn end_requested(&self) -> bool {
        false
    }
}

/// Never fires. Used when nobody is at the keyboard.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeverInterrupt;

impl InterruptSource for NeverInterrupt {
    fn arm(&self) -> InterruptScope {
        InterruptScope::detached(CancellationToken::new())
    }
}

#[derive(Default)]
struct CtrlCState {
    armed: Mutex<Option<CancellationToken>>,
    idle_presses: AtomicU32,
}

impl CtrlCState {
    fn armed(&self) -> Option<CancellationToken> {
        self.armed.lock().ok().and_then(|slot| slot.clone())
    }

    fn set_armed(&self, token: Option<CancellationToken>) {
        if let Ok(mut slot) = self.armed.lock() {
            *slot = token;
        }
    }
}

/// Ctrl-C as the interrupt key. One listener task for the whole process; the
/// armed token decides what a press means.
#[derive(Clone)]
pub struct CtrlCInterrupts {
    state: Arc<CtrlCState>,
}

impl CtrlCInterrupts {
    /// Spawn the signal listener. Must be called inside a tokio runtime.
    pub fn install() -> Self {
        let state = Arc::new(CtrlCState::default());
        let listener = Arc::clone(&state);

        tokio::spawn(async move {
            loop {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!("Failed to listen for Ctrl-C: {}", e);
                    break;
                }

                if let Some(token) = listener.armed() {
                    info!("Interrupt received, handing the floor to the human");
                    token.cancel();
                    continue;
                }

                let presses = listener.idle_presses.fetch_add(1, Ordering::SeqCst) + 1;
                if presses > 1 {
                    eprintln!("\nAborted.");
                    std::process::exit(130);
                }
                eprintln!("\nEnding the meeting after this step. Press Ctrl-C again to quit now.");
            }
        });

        Self { state }
    }
}

impl InterruptSource for CtrlCInterrupts {
    fn arm(&self) -> InterruptScope {
        let token = CancellationToken::new();
        self.state.set_armed(Some(token.clone()));

        let state = Arc::clone(&self.state);
        InterruptScope::new(token, move || state.set_armed(None))
    }

    fn end_requested(&self) -> bool {
        self.state.idle_presses.load(Ordering::SeqCst) > 0
    }
}

/// Blocking "one line from the human" primitive.
#[async_trait]
pub trait HumanInput: Send + Sync {
    async fn read_line(&self, prompt: &str) -> Result<String>;
}

/// Where turns are shown as they happen.
pub trait TurnSink: Send + Sync {
    /// A participant has started generating.
    fn speaking(&self, participant: &Participant);

    /// Incremental text for the participant currently speaking.
    fn chunk(&self, participant: &Participant, text: &str);

    /// The in-flight generation was interrupted; discard what was shown.
    fn abandon(&self, participant: &Participant);

    /// A failed attempt is being retried; text shown so far is void.
    fn restart(&self, participant: &Participant);

    /// A turn was appended to the log.
    fn turn(&self, turn: &Turn);

    /// Out-of-band status line.
    fn notice(&self, message: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The participant's reply (or its fallback) was appended.
    Spoke,
    /// The human interrupted and said something.
    HumanSpoke,
    /// The human was offered the floor and declined.
    HumanPassed,
    /// The human asked to end the meeting.
    EndRequested,
    /// Nothing was appended.
    Skipped,
}

enum Generation {
    Finished(String),
    Interrupted,
}

enum Progress {
    Chunk(String),
    Restart,
}

/// One streaming attempt, forwarded into `events`. Attempts after the first
/// announce themselves so partial text from a failed try can be withdrawn.
async fn stream_attempt(
    generator: &dyn TextGenerator,
    request: &GenerationRequest,
    events: &mpsc::UnboundedSender<Progress>,
    attempts: &AtomicUsize,
) -> Result<String, GenerationError> {
    if attempts.fetch_add(1, Ordering::SeqCst) > 0 {
        let _ = events.send(Progress::Restart);
    }

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let forward = async {
        while let Some(chunk) = rx.recv().await {
            let _ = events.send(Progress::Chunk(chunk));
        }
    };
    let (result, ()) = tokio::join!(generator.generate_streaming(request, tx), forward);
    result
}

pub struct InterruptionController {
    interrupts: Arc<dyn InterruptSource>,
    human: Option<Arc<dyn HumanInput>>,
    sink: Arc<dyn TurnSink>,
    retry: RetryPolicy,
}

impl InterruptionController {
    pub fn new(
        interrupts: Arc<dyn InterruptSource>,
        human: Option<Arc<dyn HumanInput>>,
        sink: Arc<dyn TurnSink>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            interrupts,
            human,
            sink,
            retry,
        }
    }

    pub fn has_human(&self) -> bool {
        self.human.is_some()
    }

    pub fn end_requested(&self) -> bool {
        self.interrupts.end_requested()
    }

    pub fn sink(&self) -> &Arc<dyn TurnSink> {
        &self.sink
    }

    /// Generate `speaker`'s turn unless the human barges in first.
    pub async fn run_turn(
        &self,
        log: &mut ConversationLog,
        speaker: &Participant,
        generator: Arc<dyn TextGenerator>,
        request: GenerationRequest,
        agenda_index: Option<usize>,
    ) -> TurnOutcome {
        match self.generate(speaker, generator, request).await {
            Generation::Finished(text) => {
                match log.append_participant(&speaker.id, text, agenda_index) {
                    Ok(turn) => {
                        self.sink.turn(turn);
                        TurnOutcome::Spoke
                    }
                    Err(e) => {
                        warn!("Dropping turn: {}", e);
                        TurnOutcome::Skipped
                    }
                }
            }
            Generation::Interrupted => {
                self.sink.abandon(speaker);
                if self.human.is_none() {
                    info!("Interrupted with no human present, ending meeting");
                    return TurnOutcome::EndRequested;
                }
                self.prompt_human(log, agenda_index, "You have the floor").await
            }
        }
    }

    /// Offer the floor to the human and record the answer.
    pub async fn prompt_human(
        &self,
        log: &mut ConversationLog,
        agenda_index: Option<usize>,
        prompt: &str,
    ) -> TurnOutcome {
        let Some(human) = &self.human else {
            return TurnOutcome::Skipped;
        };

        let input = match human.read_line(prompt).await {
            Ok(input) => input,
            Err(e) => {
                warn!("Failed to read human input: {}", e);
                String::new()
            }
        };

        match HumanReply::classify(&input) {
            HumanReply::Spoke(text) => {
                let turn = log.append_human(text, agenda_index);
                self.sink.turn(turn);
                TurnOutcome::HumanSpoke
            }
            HumanReply::Passed => {
                debug!("Human passed");
                log.human_passed();
                TurnOutcome::HumanPassed
            }
            HumanReply::EndRequested => {
                info!("Human asked to end the meeting");
                TurnOutcome::EndRequested
            }
        }
    }

    async fn generate(
        &self,
        speaker: &Participant,
        generator: Arc<dyn TextGenerator>,
        request: GenerationRequest,
    ) -> Generation {
        let scope = self.interrupts.arm();
        let (tx, mut rx) = mpsc::unbounded_channel::<Progress>();
        let retry = self.retry;
        let label = format!("Reply from {}", speaker.name);

        // Runs detached. Once the receiver is gone nobody will read the reply,
        // so a pending retry is dropped rather than slept through.
        let mut task = tokio::spawn(async move {
            let attempts = AtomicUsize::new(0);
            let (generator, request, tx, attempts) = (&*generator, &request, &tx, &attempts);
            tokio::select! {
                result = retry.run(&label, move || stream_attempt(generator, request, tx, attempts)) => {
                    Some(result)
                }
                _ = tx.closed() => None,
            }
        });

        self.sink.speaking(speaker);

        let outcome = loop {
            tokio::select! {
                biased;
                _ = scope.fired() => break Generation::Interrupted,
                Some(progress) = rx.recv() => match progress {
                    Progress::Chunk(chunk) => self.sink.chunk(speaker, &chunk),
                    Progress::Restart => self.sink.restart(speaker),
                },
                joined = &mut task => {
                    let text = match joined {
                        Ok(Some(Ok(text))) => text,
                        Ok(Some(Err(e))) => {
                            warn!("{} unavailable ({}), using fallback", speaker.name, e);
                            FALLBACK_REPLY.to_string()
                        }
                        Ok(None) => FALLBACK_REPLY.to_string(),
                        Err(e) => {
                            warn!("Generation task for {} failed: {}", speaker.name, e);
                            FALLBACK_REPLY.to_string()
                        }
                    };
                    break Generation::Finished(text);
                }
            }
        };

        drop(scope);
        outcome
    }
}
