//! Worker configuration, loaded from environment variables at startup.

use std::time::Duration;

/// Runtime configuration for the analysis worker.
///
/// Every field has a default so the worker runs out-of-the-box inside a
/// compose stack without any environment variables set (the only value you
/// will realistically always provide is `OPENAI_API_KEY`).
#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres host (default: `"db"`).
    pub db_host: String,

    /// Postgres database name (default: `"support"`).
    pub db_name: String,

    /// Postgres user (default: `"support"`).
    pub db_user: String,

    /// Postgres password (default: `"support"`).
    pub db_password: String,

    /// Delay between connection attempts while the database is unreachable
    /// (default: 2 s). Connection is retried indefinitely.
    pub db_connect_retry: Duration,

    /// Base URL of the OpenAI-compatible completion service
    /// (default: `"https://api.openai.com/v1"`).
    pub openai_base_url: String,

    /// API key sent as a bearer token (default: empty).
    pub openai_api_key: String,

    /// Model identifier passed to the completion service (default: `"gpt-4"`).
    pub model: String,

    /// Sampling temperature for the analysis prompt (default: 0.7).
    pub temperature: f32,

    /// Maximum completion tokens per analysis request (default: 500).
    pub max_output_tokens: u32,

    /// Maximum completion attempts per session before surfacing the failure
    /// (default: 3).
    pub max_attempts: u32,

    /// Base backoff delay after a rate-limit response; doubles per attempt
    /// (default: 2 s).
    pub backoff_base: Duration,

    /// Sleep between poll cycles (default: 30 s).
    pub poll_interval: Duration,

    /// `tracing` filter string, e.g. `"info"` or `"debug,sqlx=warn"`.
    pub log_level: String,

    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,
}

impl Config {
    /// Build [`Config`] from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            db_host: env_or("POSTGRES_HOST", "db"),
            db_name: env_or("POSTGRES_DB", "support"),
            db_user: env_or("POSTGRES_USER", "support"),
            db_password: env_or("POSTGRES_PASSWORD", "support"),
            db_connect_retry: Duration::from_secs(parse_env("ANALYZER_DB_RETRY_SECS", 2)),
            openai_base_url: env_or("ANALYZER_OPENAI_BASE_URL", "https://api.openai.com/v1"),
            openai_api_key: env_or("OPENAI_API_KEY", ""),
            model: env_or("ANALYZER_MODEL", "gpt-4"),
            temperature: parse_env("ANALYZER_TEMPERATURE", 0.7),
            max_output_tokens: parse_env("ANALYZER_MAX_TOKENS", 500),
            max_attempts: parse_env("ANALYZER_MAX_ATTEMPTS", 3),
            backoff_base: Duration::from_secs(parse_env("ANALYZER_BACKOFF_SECS", 2)),
            poll_interval: Duration::from_secs(parse_env("ANALYZER_POLL_SECS", 30)),
            log_level: env_or("ANALYZER_LOG", "info"),
            log_json: std::env::var("ANALYZER_LOG_JSON")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        }
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
