use async_trait::async_trait;
use eventsource_stream::{EventStreamError, Eventsource};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::{ChatMessage, GenerationError, GenerationRequest, TextGenerator};
use crate::config::{LlmConfig, LoggingConfig};

#[derive(Debug, Serialize)]
struct CompletionPayload<'a> {
    model: &'a str,
    messages: Vec<PayloadMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct PayloadMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Client for any OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiGenerator {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    logging: LoggingConfig,
}

impl OpenAiGenerator {
    pub fn new(config: &LlmConfig, logging: LoggingConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        info!(
            "Initialized generation client for model {} at {}",
            config.model, config.endpoint
        );

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.resolved_api_key(),
            model: config.model.clone(),
            temperature: config.temperature,
            logging,
        })
    }

    fn payload<'a>(&'a self, request: &'a GenerationRequest, stream: bool) -> CompletionPayload<'a> {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        messages.push(PayloadMessage {
            role: "system",
            content: &request.system,
        });
        messages.extend(request.messages.iter().map(payload_message));

        CompletionPayload {
            model: &self.model,
            messages,
            max_tokens: request.max_tokens,
            temperature: self.temperature,
            stream,
        }
    }

    async fn send(
        &self,
        request: &GenerationRequest,
        stream: bool,
    ) -> Result<reqwest::Response, GenerationError> {
        if self.logging.log_prompts {
            debug!(kind = %request.kind, "System prompt: {}", request.system);
            for message in &request.messages {
                debug!(kind = %request.kind, "{:?}: {}", message.role, message.content);
            }
        }

        let mut builder = self
            .client
            .post(&self.endpoint)
            .json(&self.payload(request, stream));
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(transport_error)?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        error!(
            kind = %request.kind,
            "Generation request failed with status {}: {}",
            status, body
        );
        let detail = serde_json::from_str::<ErrorResponse>(&body)
            .map(|e| e.error.message)
            .unwrap_or(body);
        Err(GenerationError::from_status(status.as_u16(), &detail))
    }

    fn finish(&self, request: &GenerationRequest, text: String) -> Result<String, GenerationError> {
        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(GenerationError::EmptyResult);
        }
        if self.logging.log_prompts {
            debug!(kind = %request.kind, "Reply: {}", text);
        }
        Ok(text)
    }
}

fn payload_message(message: &ChatMessage) -> PayloadMessage<'_> {
    let role = match message.role {
        super::ChatRole::User => "user",
        super::ChatRole::Assistant => "assistant",
    };
    PayloadMessage {
        role,
        content: &message.content,
    }
}

fn transport_error(err: reqwest::Error) -> GenerationError {
    if let Some(status) = err.status() {
        return GenerationError::from_status(status.as_u16(), &err.to_string());
    }
    GenerationError::Unavailable(err.to_string())
}

fn stream_error(err: EventStreamError<reqwest::Error>) -> GenerationError {
    match err {
        EventStreamError::Transport(e) => transport_error(e),
        other => GenerationError::Parse(other.to_string()),
    }
}

/// Pulls the text delta out of one SSE event's data. `None` for deltas
/// without content.
fn parse_delta(data: &str) -> Result<Option<String>, GenerationError> {
    let chunk: StreamChunk =
        serde_json::from_str(data).map_err(|e| GenerationError::Parse(e.to_string()))?;
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|content| !content.is_empty()))
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let response = self.send(request, false).await?;
        let body = response.text().await.map_err(transport_error)?;

        let completion: CompletionResponse = serde_json::from_str(&body)
            .map_err(|e| GenerationError::Parse(e.to_string()))?;

        let text = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();

        self.finish(request, text)
    }

    async fn generate_streaming(
        &self,
        request: &GenerationRequest,
        chunks: mpsc::UnboundedSender<String>,
    ) -> Result<String, GenerationError> {
        let response = self.send(request, true).await?;
        let mut stream = response.bytes_stream().eventsource();
        let mut text = String::new();

        while let Some(event) = stream.next().await {
            let event = event.map_err(stream_error)?;
            let data = event.data.trim();
            if data == "[DONE]" {
                break;
            }
            if data.is_empty() {
                continue;
            }
            if let Some(delta) = parse_delta(data)? {
                text.push_str(&delta);
                let _ = chunks.send(delta);
            }
        }

        self.finish(request, text)
    }
}
