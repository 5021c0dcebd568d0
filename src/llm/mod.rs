//! OpenAI-compatible chat-completion wire types.
//!
//! The structures here are intentionally kept compatible with the OpenAI
//! REST API specification so the worker can point at any service exposing
//! that shape (OpenAI itself, a gateway, or a local server).

pub mod client;

use serde::{Deserialize, Serialize};

/// A single message in the conversation history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    /// The role of the message author (`"system"`, `"user"`, `"assistant"`).
    pub role: String,
    /// The content of the message.
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self { role: role.into(), content: content.into() }
    }
}

/// Request body for `POST /chat/completions`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    /// The model identifier to use.
    pub model: String,
    /// Conversation history sent as the prompt.
    pub messages: Vec<ChatMessage>,
    /// Sampling temperature in [0, 2].
    pub temperature: f32,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
}

/// A single choice in the completion response.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoice {
    /// The generated message.
    pub message: ChatMessage,
    /// Why generation stopped (`"stop"`, `"length"`, …).
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Response body for `POST /chat/completions`.
///
/// Only the fields the worker consumes are modeled; serde ignores the rest.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionResponse {
    /// Generated choices; the worker uses the first one.
    pub choices: Vec<ChatChoice>,
}
