use crate::global;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub meeting: MeetingConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// OpenAI-compatible chat completions endpoint.
    pub endpoint: String,
    /// Falls back to the OPENAI_API_KEY environment variable when unset.
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    /// Upper bound on tokens for a spoken turn. Short structured replies use less.
    pub max_tokens: u32,
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeetingConfig {
    /// Delay before the single retry of a transiently failed call.
    pub retry_delay_seconds: u64,
    /// Number of recent turns shown to each participant when scoring urgency.
    pub urgency_window: usize,
    pub top_k: usize,
    /// Probability of handing the floor straight to the top-scored participant.
    pub direct_pick_probability: f64,
    /// Offer the human the floor after this many rounds without them.
    pub human_turn_interval: u32,
    pub max_participants: usize,
    pub introductions: bool,
    /// Turns fed into the closing synthesis.
    pub closing_window: usize,
    pub transcript_dir: Option<PathBuf>,
    /// Shell command to run after the transcript is written.
    /// Receives the transcript text via stdin.
    /// Env vars: PARLEY_TRANSCRIPT_PATH, PARLEY_MEETING_TITLE,
    /// PARLEY_TURN_COUNT, PARLEY_AGENDA
    pub post_command: String,
    pub post_command_timeout_seconds: u64,
    /// Fixes the speaker-selection RNG for repeatable runs.
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub verbose: bool,
    /// Emit prompt text and raw replies at debug level.
    pub log_prompts: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            temperature: 0.8,
            max_tokens: 300,
            request_timeout_seconds: 60,
        }
    }
}

impl Default for MeetingConfig {
    fn default() -> Self {
        Self {
            retry_delay_seconds: 10,
            urgency_window: 5,
            top_k: 3,
            direct_pick_probability: 0.7,
            human_turn_interval: 3,
            max_participants: 4,
            introductions: true,
            closing_window: 20,
            transcript_dir: None,
            post_command: String::new(),
            post_command_timeout_seconds: 600,
            seed: None,
        }
    }
}

impl LlmConfig {
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .or_else(|| std::env::var(API_KEY_ENV).ok())
            .filter(|key| !key.trim().is_empty())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl MeetingConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_seconds)
    }

    pub fn transcript_dir(&self) -> Result<PathBuf> {
        match &self.transcript_dir {
            Some(dir) => Ok(dir.clone()),
            None => global::transcripts_dir(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        if !config_path.exists() {
            info!(
                "Config file not found, creating default at {:?}",
                config_path
            );
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content =
            std::fs::read_to_string(&config_path).context("Failed to read config file")?;

        let config: Self = toml::from_str(&content).context("Failed to parse config file")?;

        info!("Loaded config from {:?}", config_path);
        Ok(config)
    }

    /// Read the config file without creating it. `None` when absent or invalid.
    pub fn peek() -> Option<Self> {
        let content = std::fs::read_to_string(Self::config_path().ok()?).ok()?;
        toml::from_str(&content).ok()
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&config_path, content).context("Failed to write config file")?;

        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        global::config_file()
    }
}
