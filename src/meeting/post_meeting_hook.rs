//! Post-meeting hook abstraction and shell command implementation.
//!
//! Once the transcript is on disk an optional hook can post-process it
//! (e-mail the minutes, file them in a wiki, open a ticket per action item).

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable names for meeting metadata passed to hooks.
pub mod hook_env {
    pub const TRANSCRIPT_PATH: &str = "PARLEY_TRANSCRIPT_PATH";
    pub const MEETING_TITLE: &str = "PARLEY_MEETING_TITLE";
    pub const TURN_COUNT: &str = "PARLEY_TURN_COUNT";
    pub const AGENDA: &str = "PARLEY_AGENDA";
}

/// A finished meeting, passed to hooks for post-processing.
pub struct MeetingResult {
    pub title: String,
    pub agenda: Vec<String>,
    pub turn_count: usize,
    pub transcript_path: PathBuf,
    pub transcript_text: String,
}

#[async_trait]
pub trait PostMeetingHook: Send + Sync {
    async fn execute(&self, result: &MeetingResult) -> Result<()>;
}

/// Runs `sh -c <command>` with the transcript on stdin and metadata in the
/// environment. The agenda is newline separated. A non-zero exit or a timeout
/// is logged, never returned as an error; the child is killed on timeout.
pub struct ShellCommandHook {
    command: String,
    timeout: Duration,
}

impl ShellCommandHook {
    pub fn new(command: String, timeout_seconds: u64) -> Self {
        Self {
            command,
            timeout: Duration::from_secs(timeout_seconds),
        }
    }
}

#[async_trait]
impl PostMeetingHook for ShellCommandHook {
    async fn execute(&self, result: &MeetingResult) -> Result<()> {
        info!(
            "Running post-meeting hook for '{}': {}",
            result.title, self.command
        );

        let mut child = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .env(
                hook_env::TRANSCRIPT_PATH,
                result.transcript_path.to_string_lossy().as_ref(),
            )
            .env(hook_env::MEETING_TITLE, &result.title)
            .env(hook_env::TURN_COUNT, result.turn_count.to_string())
            .env(hook_env::AGENDA, result.agenda.join("\n"))
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn hook: {}", self.command))?;

        if let Some(mut stdin) = child.stdin.take() {
            use tokio::io::AsyncWriteExt;
            let _ = stdin.write_all(result.transcript_text.as_bytes()).await;
        }

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                if output.status.success() {
                    let stdout = String::from_utf8_lossy(&output.stdout);
                    if !stdout.is_empty() {
                        info!("Post-meeting hook stdout: {}", stdout.trim());
                    }
                    info!("Post-meeting hook completed successfully");
                } else {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    warn!(
                        "Post-meeting hook exited with status {}: {}",
                        output.status,
                        stderr.trim()
                    );
                }
            }
            Ok(Err(e)) => {
                warn!("Post-meeting hook failed to execute: {}", e);
            }
            Err(_) => {
                warn!(
                    "Post-meeting hook timed out after {}s (process will be killed)",
                    self.timeout.as_secs()
                );
            }
        }

        Ok(())
    }
}
