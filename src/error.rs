//! Unified worker error type.
//!
//! Every fallible path in the pipeline returns `Result<T, AnalyzerError>`.
//! The poll loop decides per variant whether a failure skips one session or
//! aborts the whole cycle; nothing here is fatal to the process.

use thiserror::Error;

/// All errors that can occur while analyzing a session.
#[derive(Debug, Error)]
pub enum AnalyzerError {
    /// Propagated from the Postgres (or other) store.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Propagated from the completion-service HTTP client.
    #[error("completion request failed: {0}")]
    Chat(#[from] crate::llm::client::ChatError),

    /// The service kept rate-limiting us for the full attempt budget.
    #[error("rate limited by the completion service after {attempts} attempts")]
    RateLimited { attempts: u32 },

    /// The completion never parsed as the expected JSON shape, even after
    /// the substring-extraction fallback and the full attempt budget.
    #[error("completion is not the expected JSON shape: {reason}")]
    MalformedResponse { reason: String },

    /// Every attempt failed without a more specific cause.
    #[error("analysis of session {session_id} failed after {attempts} attempts")]
    Exhausted { session_id: i64, attempts: u32 },
}
