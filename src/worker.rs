//! Poll loop and Result Persister.
//!
//! Each cycle connects to the store, selects the sessions still awaiting
//! analysis, and processes them strictly in sequence. A failure while
//! processing one session is logged and that session skipped; a failure at
//! the selection/connection level aborts the cycle. Neither kills the
//! process: the loop ticks again after the configured interval and runs
//! until the shutdown future resolves.

use chrono::Utc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::analyzer::{Analyzer, ConversationAnalysis};
use crate::config::Config;
use crate::db::postgres::PgStore;
use crate::db::{AnalysisRecord, AnalysisStore, PendingSession};
use crate::error::AnalyzerError;
use crate::llm::client::ChatBackend;
use crate::transcript::format_transcript;

/// Map a sentiment classification to the 0–10 satisfaction scale.
///
/// Unknown or absent sentiment falls back to the neutral score.
pub fn satisfaction_score(sentiment: &str) -> i64 {
    match sentiment {
        "negative" => 3,
        "neutral" => 5,
        "positive" => 8,
        _ => 5,
    }
}

/// Concatenate main topics and key points (in that order) into the
/// improvement-notes column.
pub fn improvement_notes(analysis: &ConversationAnalysis) -> String {
    analysis
        .main_topics
        .iter()
        .chain(analysis.key_points.iter())
        .cloned()
        .collect::<Vec<_>>()
        .join(". ")
}

/// The sequential poll-transform-persist worker.
pub struct Worker<B> {
    analyzer: Analyzer<B>,
}

impl<B: ChatBackend> Worker<B> {
    pub fn new(analyzer: Analyzer<B>) -> Self {
        Self { analyzer }
    }

    /// Run cycles until `shutdown` resolves.
    ///
    /// A fresh store connection is acquired per cycle and dropped at its
    /// end; the connect call retries indefinitely while the database is
    /// unreachable, so shutdown is only observed between cycles.
    pub async fn run(&self, cfg: &Config, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);
        let mut ticker = tokio::time::interval(cfg.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown requested; stopping poll loop");
                    return;
                }
                _ = ticker.tick() => {
                    let store = PgStore::connect(cfg).await;
                    if let Err(e) = self.run_cycle(&store).await {
                        error!(error = %e, "poll cycle failed");
                    }
                }
            }
        }
    }

    /// One poll cycle: select pending sessions, analyze and persist each.
    pub async fn run_cycle<S: AnalysisStore>(&self, store: &S) -> Result<(), AnalyzerError> {
        let sessions = store.pending_sessions().await?;
        info!(count = sessions.len(), "found sessions to analyze");

        for session in &sessions {
            if let Err(e) = self.process_session(store, session).await {
                warn!(session_id = session.id, error = %e, "failed to process session; skipping");
            }
        }
        Ok(())
    }

    async fn process_session<S: AnalysisStore>(
        &self,
        store: &S,
        session: &PendingSession,
    ) -> Result<(), AnalyzerError> {
        info!(
            session_id = session.id,
            messages = session.message_count,
            "analyzing session"
        );

        let transcript = format_transcript(&session.messages);
        let analysis = self.analyzer.analyze(session.id, &transcript).await?;

        if analysis.is_empty() {
            debug!(session_id = session.id, "analysis came back empty; nothing to persist");
            return Ok(());
        }

        let record = AnalysisRecord {
            session_id: session.id,
            satisfaction: satisfaction_score(&analysis.sentiment),
            summary: analysis.summary.clone(),
            improvement: improvement_notes(&analysis),
            created_at: Utc::now(),
        };
        info!(
            session_id = session.id,
            satisfaction = record.satisfaction,
            "session analyzed"
        );
        store.insert_analysis(record).await?;
        Ok(())
    }
}
