//! Text generation boundary.
//!
//! Every participant utterance and every structured question the meeting asks
//! (urgency, progression, next speaker) goes through a [`TextGenerator`].
//! The core only depends on the trait; [`OpenAiGenerator`] is the concrete
//! client used by the CLI.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;

pub mod openai;

pub use openai::OpenAiGenerator;

/// Errors surfaced by a generation call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    #[error("rate limited by generation service")]
    RateLimited,

    #[error("generation service unavailable: {0}")]
    Unavailable(String),

    #[error("generation service returned an empty result")]
    EmptyResult,

    #[error("invalid generation request: {0}")]
    InvalidRequest(String),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("failed to parse generation response: {0}")]
    Parse(String),
}

impl GenerationError {
    /// Rate limits, upstream outages and empty replies are worth one more try.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::Unavailable(_) | Self::EmptyResult
        )
    }

    /// Classify a non-success HTTP status.
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            429 => Self::RateLimited,
            401 | 403 => Self::Authentication(body.to_string()),
            500..=599 => Self::Unavailable(format!("status {status}: {body}")),
            _ => Self::InvalidRequest(format!("status {status}: {body}")),
        }
    }
}

/// What a request is for. Used for log fields and by test doubles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    ParticipantSelection,
    Opening,
    Introduction,
    Urgency,
    SpeakerChoice,
    Progression,
    Response,
    Transition,
    Closing,
    Summary,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ParticipantSelection => "participant_selection",
            Self::Opening => "opening",
            Self::Introduction => "introduction",
            Self::Urgency => "urgency",
            Self::SpeakerChoice => "speaker_choice",
            Self::Progression => "progression",
            Self::Response => "response",
            Self::Transition => "transition",
            Self::Closing => "closing",
            Self::Summary => "summary",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// One call to the generation service.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub kind: RequestKind,
    pub system: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
}

impl GenerationRequest {
    pub fn new(kind: RequestKind, system: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            kind,
            system: system.into(),
            messages: Vec::new(),
            max_tokens,
        }
    }

    pub fn with_messages(mut self, messages: Vec<ChatMessage>) -> Self {
        self.messages = messages;
        self
    }

    pub fn with_user(mut self, content: impl Into<String>) -> Self {
        self.messages.push(ChatMessage::user(content));
        self
    }
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;

    /// Streaming variant: incremental text goes to `chunks`, the full reply is
    /// returned at the end. A dropped receiver is not an error.
    async fn generate_streaming(
        &self,
        request: &GenerationRequest,
        chunks: mpsc::UnboundedSender<String>,
    ) -> Result<String, GenerationError> {
        let text = self.generate(request).await?;
        let _ = chunks.send(text.clone());
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(GenerationError::RateLimited.is_transient());
        assert!(GenerationError::Unavailable("502".into()).is_transient());
        assert!(GenerationError::EmptyResult.is_transient());
        assert!(!GenerationError::InvalidRequest("bad".into()).is_transient());
        assert!(!GenerationError::Authentication("nope".into()).is_transient());
        assert!(!GenerationError::Parse("junk".into()).is_transient());
    }

    #[test]
    fn test_from_status() {
        assert_eq!(GenerationError::from_status(429, ""), GenerationError::RateLimited);
        assert!(GenerationError::from_status(503, "down").is_transient());
        assert!(matches!(
            GenerationError::from_status(401, "key"),
            GenerationError::Authentication(_)
        ));
        assert!(matches!(
            GenerationError::from_status(400, "schema"),
            GenerationError::InvalidRequest(_)
        ));
    }

    #[test]
    fn test_request_kind_serialization() {
        let json = serde_json::to_string(&RequestKind::SpeakerChoice).unwrap();
        assert_eq!(json, "\"speaker_choice\"");
        assert_eq!(RequestKind::Progression.to_string(), "progression");
    }

    struct Echo;

    #[async_trait]
    impl TextGenerator for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
            Ok(request.system.clone())
        }
    }

    #[tokio::test]
    async fn test_default_streaming_sends_single_chunk() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let request = GenerationRequest::new(RequestKind::Response, "hello there", 50);
        let text = Echo.generate_streaming(&request, tx).await.unwrap();

        assert_eq!(text, "hello there");
        assert_eq!(rx.recv().await.as_deref(), Some("hello there"));
        assert!(rx.recv().await.is_none());
    }
}
