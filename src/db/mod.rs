//! Database abstraction layer.
//!
//! [`AnalysisStore`] defines the interface the poll loop needs: list the
//! sessions still awaiting analysis, and persist one finished analysis.
//! The default implementation is [`postgres::PgStore`]; tests use an
//! in-memory mock. To swap to another database, implement [`AnalysisStore`]
//! for your new type and change the concrete type in `main`.
//!
//! All trait methods use `impl Future` in their signatures (stable since
//! Rust 1.75) so no extra `async-trait` crate is required.

pub mod postgres;

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// One message of a session, as aggregated by the selection query.
///
/// `content` is kept as a raw JSON value: the aggregation produces `null`
/// for messages without text, and the transcript formatter is the one place
/// that decides what counts as usable content.
#[derive(Debug, Clone, Deserialize)]
pub struct StoredMessage {
    /// Message body; `null` or non-string values are dropped downstream.
    #[serde(default)]
    pub content: serde_json::Value,
    /// `true` when the message came from the customer, `false` for the
    /// support assistant.
    pub remote: bool,
    /// Creation timestamp as rendered by the database. Ordering is already
    /// applied inside the selection query, so this is never re-parsed.
    #[serde(default)]
    pub created_at: String,
}

/// A session that has messages but no analysis row yet.
#[derive(Debug, Clone)]
pub struct PendingSession {
    /// Session identifier.
    pub id: i64,
    /// Messages ordered by creation time.
    pub messages: Vec<StoredMessage>,
    /// Message count as reported by the query (always `> 1`).
    pub message_count: i64,
}

/// A single row to insert into the `analysis` table.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRecord {
    /// Session this analysis belongs to.
    pub session_id: i64,
    /// Satisfaction score on the 0–10 scale, derived from sentiment.
    pub satisfaction: i64,
    /// Free-text summary of the conversation.
    pub summary: String,
    /// Concatenated topics and key points.
    pub improvement: String,
    /// Timestamp of when the analysis was produced.
    pub created_at: DateTime<Utc>,
}

/// Trait for the worker's two store operations.
///
/// Implement this trait to swap Postgres for another backend without
/// touching the poll loop.
pub trait AnalysisStore: Send + Sync {
    /// Sessions with more than one message and no analysis row, each with
    /// its messages aggregated in creation order.
    fn pending_sessions(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<PendingSession>, sqlx::Error>> + Send;

    /// Persist a finished analysis. Commits immediately.
    fn insert_analysis(
        &self,
        record: AnalysisRecord,
    ) -> impl std::future::Future<Output = Result<(), sqlx::Error>> + Send;
}
