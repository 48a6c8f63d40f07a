//! Chat-completion request and streaming chunk types
//!
//! `CompletionRequest` is what a tool hands to the cascade. The `Wire*` and
//! `ChatCompletionChunk` types mirror the OpenAI-compatible JSON that goes over
//! the network.

use serde::{Deserialize, Serialize};

/// Message role
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
}

/// A single chat message
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatMessage {
    role: MessageRole,
    content: String,
}

impl ChatMessage {
    pub fn role(&self) -> MessageRole {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

/// Outbound chat completion, built once per incoming request
///
/// Always exactly one system message followed by one user message, with
/// streaming enabled. The same value is reused for every model attempt; only
/// the target model varies.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    messages: [ChatMessage; 2],
    temperature: f64,
    max_tokens: u32,
}

impl CompletionRequest {
    pub fn new(
        system: impl Into<String>,
        user: impl Into<String>,
        temperature: f64,
        max_tokens: u32,
    ) -> Self {
        Self {
            messages: [
                ChatMessage {
                    role: MessageRole::System,
                    content: system.into(),
                },
                ChatMessage {
                    role: MessageRole::User,
                    content: user.into(),
                },
            ],
            temperature,
            max_tokens,
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn system(&self) -> &str {
        self.messages[0].content()
    }

    pub fn user(&self) -> &str {
        self.messages[1].content()
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    /// Streaming is never disabled
    pub fn stream(&self) -> bool {
        true
    }

    /// Rough prompt size in tokens (4 characters per token)
    pub fn estimated_prompt_tokens(&self) -> usize {
        self.messages.iter().map(|m| m.content.len()).sum::<usize>() / 4
    }

    /// JSON body for a specific model
    pub fn to_wire<'a>(&'a self, model: &'a str) -> WireRequest<'a> {
        WireRequest {
            model,
            messages: &self.messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream: self.stream(),
        }
    }
}

/// Serialized request body for `POST /chat/completions`
#[derive(Debug, Serialize)]
pub struct WireRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [ChatMessage],
    pub temperature: f64,
    pub max_tokens: u32,
    pub stream: bool,
}

/// One decoded upstream event
///
/// `text` is `None` for role announcements, finish markers, usage reports and
/// other chunks that carry no content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamChunk {
    text: Option<String>,
}

impl StreamChunk {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
        }
    }

    pub fn empty() -> Self {
        Self { text: None }
    }

    pub fn as_text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn into_text(self) -> Option<String> {
        self.text
    }
}

/// Delta content in a streaming chunk
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Delta {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

/// A single choice in a streaming chunk
#[derive(Debug, Clone, Deserialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub delta: Delta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Error object some providers embed in the event stream
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub code: Option<serde_json::Value>,
}

/// OpenAI-compatible streaming chunk
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionChunk {
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
    #[serde(default)]
    pub error: Option<UpstreamErrorBody>,
}

impl ChatCompletionChunk {
    /// Text delta of the first choice, if any
    pub fn into_stream_chunk(self) -> StreamChunk {
        StreamChunk {
            text: self
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.delta.content),
        }
    }
}
