//! HTTP client for the completion service.
//!
//! [`ChatBackend`] is the seam between the retry logic and the network:
//! one attempt in, one completion text (or classified failure) out. The
//! production implementation is [`OpenAiClient`]; tests substitute scripted
//! backends so retry behavior can be exercised without a server.

use reqwest::StatusCode;
use thiserror::Error;

use super::{ChatCompletionRequest, ChatCompletionResponse};
use crate::config::Config;

/// Failure classification for a single completion attempt.
///
/// The caller's retry policy branches on the variant: [`ChatError::RateLimited`]
/// is backed off and retried, everything else propagates immediately.
#[derive(Debug, Error)]
pub enum ChatError {
    /// The service answered HTTP 429.
    #[error("rate limited by the completion service")]
    RateLimited,

    /// Transport-level failure (connect, TLS, body read, JSON decode).
    #[error("http transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Any other non-success status from the service.
    #[error("completion service returned {status}: {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body, best effort.
        body: String,
    },

    /// A 200 response that contained no choices.
    #[error("completion contained no choices")]
    Empty,
}

/// Trait for issuing one chat-completion attempt.
pub trait ChatBackend: Send + Sync {
    /// Send `request` and return the first choice's message content,
    /// trimmed. Performs no retries; that is the caller's job.
    fn complete(
        &self,
        request: ChatCompletionRequest,
    ) -> impl std::future::Future<Output = Result<String, ChatError>> + Send;
}

/// [`reqwest`]-based client for any OpenAI-compatible endpoint.
#[derive(Clone, Debug)]
pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenAiClient {
    /// Build a client from configuration. The base URL may or may not carry
    /// a trailing slash.
    pub fn new(cfg: &Config) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(concat!("chat-analyzer/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url: cfg.openai_base_url.trim_end_matches('/').to_owned(),
            api_key: cfg.openai_api_key.clone(),
        }
    }
}

impl ChatBackend for OpenAiClient {
    async fn complete(&self, request: ChatCompletionRequest) -> Result<String, ChatError> {
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ChatError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::Api { status: status.as_u16(), body });
        }

        let completion: ChatCompletionResponse = response.json().await?;
        completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.trim().to_owned())
            .ok_or(ChatError::Empty)
    }
}
