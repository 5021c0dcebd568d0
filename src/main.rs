//! chat-analyzer – entry point.
//!
//! Startup order:
//! 1. Parse configuration from environment variables.
//! 2. Initialise structured tracing (JSON in production, pretty in dev).
//! 3. Build the completion-service client and the analyzer around it.
//! 4. Run the poll loop until SIGINT / SIGTERM.

mod analyzer;
mod config;
mod db;
mod error;
mod llm;
mod transcript;
mod worker;

use tracing::{info, warn};

use crate::analyzer::{Analyzer, RetryPolicy};
use crate::config::Config;
use crate::llm::client::OpenAiClient;
use crate::worker::Worker;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Configuration ───────────────────────────────────────────────────────
    let cfg = Config::from_env();

    // ── 2. Tracing ─────────────────────────────────────────────────────────────
    // Build the log-level filter, warning loudly if the configured value is
    // not a valid tracing filter expression.
    let env_filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => match cfg.log_level.parse::<tracing_subscriber::EnvFilter>() {
            Ok(f) => f,
            Err(e) => {
                eprintln!(
                    "WARN: ANALYZER_LOG='{}' is not a valid tracing filter ({}); \
                     falling back to 'info'",
                    cfg.log_level, e
                );
                tracing_subscriber::EnvFilter::new("info")
            }
        },
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true);

    if cfg.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!(version = env!("CARGO_PKG_VERSION"), "chat-analyzer starting");
    if cfg.openai_api_key.is_empty() {
        warn!("OPENAI_API_KEY is empty; completion requests will likely be rejected");
    }

    // ── 3. Analyzer ────────────────────────────────────────────────────────────
    let policy = RetryPolicy {
        max_attempts: cfg.max_attempts,
        base_delay: cfg.backoff_base,
    };
    let analyzer = Analyzer::new(
        OpenAiClient::new(&cfg),
        cfg.model.clone(),
        cfg.temperature,
        cfg.max_output_tokens,
        policy,
    );

    // ── 4. Poll loop until shutdown ────────────────────────────────────────────
    Worker::new(analyzer).run(&cfg, shutdown_signal()).await;

    info!("chat-analyzer stopped");
    Ok(())
}

/// Returns a future that resolves when SIGINT (Ctrl-C) or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install CTRL+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received; stopping after the current cycle");
}
