//! Terminal front end: streamed turns with a thinking spinner, and line input
//! for the human.

use anyhow::{Context, Result};
use async_trait::async_trait;
use dialoguer::{theme::ColorfulTheme, Input};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::sync::Mutex;
use std::time::Duration;

use crate::meeting::{HumanInput, Participant, Turn, TurnSink};

#[derive(Default)]
struct RenderState {
    spinner: Option<ProgressBar>,
    /// A participant's text is mid-stream on the current line.
    streaming: bool,
    /// What has been streamed for the current speaker.
    shown: String,
}

impl RenderState {
    fn clear_spinner(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }

    /// Closes the streamed line and returns the text it showed.
    fn end_stream(&mut self) -> String {
        if self.streaming {
            println!();
            self.streaming = false;
        }
        std::mem::take(&mut self.shown)
    }
}

/// A logged turn is printed in full unless streaming already showed exactly it.
fn needs_reprint(streamed: &str, turn: &Turn) -> bool {
    !turn.is_human() && streamed.trim() != turn.text.trim()
}

/// Prints turns to stdout as they stream in.
#[derive(Default)]
pub struct TerminalRenderer {
    state: Mutex<RenderState>,
}

impl TerminalRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state(&self, f: impl FnOnce(&mut RenderState)) {
        if let Ok(mut state) = self.state.lock() {
            f(&mut state);
        }
        let _ = io::stdout().flush();
    }
}

fn create_spinner(message: String) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

impl TurnSink for TerminalRenderer {
    fn speaking(&self, participant: &Participant) {
        let message = format!("{} is thinking...", participant.name);
        self.with_state(|state| {
            state.clear_spinner();
            state.end_stream();
            state.spinner = Some(create_spinner(message));
        });
    }

    fn chunk(&self, participant: &Participant, text: &str) {
        self.with_state(|state| {
            state.clear_spinner();
            if !state.streaming {
                print!("\n{}: ", participant.name);
                state.streaming = true;
            }
            print!("{}", text);
            state.shown.push_str(text);
        });
    }

    fn abandon(&self, participant: &Participant) {
        self.with_state(|state| {
            state.clear_spinner();
            state.shown.clear();
            if state.streaming {
                println!(" [interrupted]");
                state.streaming = false;
            } else {
                println!("\n({} was interrupted)", participant.name);
            }
        });
    }

    fn restart(&self, participant: &Participant) {
        let message = format!("{} is trying again...", participant.name);
        self.with_state(|state| {
            state.clear_spinner();
            state.shown.clear();
            if state.streaming {
                println!(" [cut off]");
                state.streaming = false;
            }
            state.spinner = Some(create_spinner(message));
        });
    }

    fn turn(&self, turn: &Turn) {
        self.with_state(|state| {
            state.clear_spinner();
            let streamed = state.end_stream();
            if needs_reprint(&streamed, turn) {
                println!("\n{}: {}", turn.speaker_name, turn.text);
            }
        });
    }

    fn notice(&self, message: &str) {
        self.with_state(|state| {
            state.clear_spinner();
            state.end_stream();
            println!("\n--- {} ---", message);
        });
    }
}

/// Reads the human's lines with a dialoguer prompt.
#[derive(Debug, Clone)]
pub struct TerminalInput {
    name: String,
}

impl TerminalInput {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl HumanInput for TerminalInput {
    async fn read_line(&self, prompt: &str) -> Result<String> {
        let prompt = format!("{} | {}", self.name, prompt);
        tokio::task::spawn_blocking(move || {
            let theme = ColorfulTheme::default();
            Input::<String>::with_theme(&theme)
                .with_prompt(prompt)
                .allow_empty(true)
                .interact_text()
        })
        .await
        .context("Input task panicked")?
        .context("Failed to read input")
    }
}
