//! Postgres implementation of [`AnalysisStore`].
//!
//! Uses [`sqlx`] with the `postgres` feature. The `sqlx::query` /
//! `sqlx::query_as` (runtime-verified) form is used deliberately so that no
//! `DATABASE_URL` environment variable is needed at compile time.
//!
//! The pool is capped at a single connection and dropped at the end of each
//! poll cycle; the worker is fully sequential and never needs more.

use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use tracing::info;

use super::{AnalysisRecord, AnalysisStore, PendingSession, StoredMessage};
use crate::config::Config;

/// Postgres-backed analysis store.
#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect to the database described by `cfg`, retrying indefinitely at
    /// a fixed delay while it is unreachable.
    ///
    /// This blocks the caller until the store is up; during startup of a
    /// compose stack the database routinely comes up after the worker.
    pub async fn connect(cfg: &Config) -> Self {
        let options = PgConnectOptions::new()
            .host(&cfg.db_host)
            .database(&cfg.db_name)
            .username(&cfg.db_user)
            .password(&cfg.db_password);

        loop {
            match Self::try_connect(options.clone()).await {
                Ok(pool) => return Self { pool },
                Err(e) => {
                    info!(error = %e, retry_in = ?cfg.db_connect_retry, "waiting for database");
                    tokio::time::sleep(cfg.db_connect_retry).await;
                }
            }
        }
    }

    async fn try_connect(options: PgConnectOptions) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await
    }
}

impl AnalysisStore for PgStore {
    async fn pending_sessions(&self) -> Result<Vec<PendingSession>, sqlx::Error> {
        let rows: Vec<(i64, serde_json::Value, i64)> = sqlx::query_as(
            "SELECT s.id, \
                    json_agg(json_build_object( \
                        'content', m.content, \
                        'remote', m.remote, \
                        'created_at', m.created_at \
                    ) ORDER BY m.created_at) AS messages, \
                    COUNT(*) AS msg_count \
             FROM session s \
             JOIN message m ON s.id = m.session_id \
             LEFT JOIN analysis a ON s.id = a.session_id \
             WHERE a.session_id IS NULL \
             GROUP BY s.id \
             HAVING COUNT(*) > 1",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(id, messages, message_count)| {
                let messages: Vec<StoredMessage> = serde_json::from_value(messages)
                    .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
                Ok(PendingSession { id, messages, message_count })
            })
            .collect()
    }

    async fn insert_analysis(&self, record: AnalysisRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO analysis (session_id, satisfaction, summary, improvement, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(record.session_id)
        .bind(record.satisfaction)
        .bind(&record.summary)
        .bind(&record.improvement)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
