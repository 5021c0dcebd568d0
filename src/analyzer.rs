//! Analysis Client: prompt construction, the completion call, and the
//! retry policy wrapped around it.
//!
//! One session in, one [`ConversationAnalysis`] out. The service is asked
//! for a strict four-field JSON object; responses that arrive wrapped in
//! prose are recovered by extracting the outermost `{`..`}` substring
//! before giving up on the attempt.

use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::error::AnalyzerError;
use crate::llm::client::{ChatBackend, ChatError};
use crate::llm::{ChatCompletionRequest, ChatMessage};

/// Instruction prompt sent as the system message of every analysis request.
const ANALYSIS_INSTRUCTION: &str = "\
You are an AI conversation analyzer. Analyze the conversation and return a JSON object \
with the following structure:
{
    \"summary\": \"Brief summary of the conversation\",
    \"main_topics\": [\"List of main topics discussed\"],
    \"sentiment\": \"Overall sentiment (positive/negative/neutral)\",
    \"key_points\": [\"List of key points or decisions made\"]
}
Respond ONLY with the JSON object, no additional text.";

/// Bounded-retry configuration for the completion call.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum completion attempts before the failure is surfaced.
    pub max_attempts: u32,
    /// Backoff before retrying a rate-limited attempt; doubles per attempt.
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Delay applied after the rate-limited attempt with zero-based index
    /// `attempt`: `base_delay × 2^attempt`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.checked_pow(attempt).unwrap_or(u32::MAX))
    }
}

/// The structured result the service is asked to produce.
///
/// Every field defaults to empty so a completion missing a field still
/// parses; downstream consumers treat empty values as "absent".
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ConversationAnalysis {
    /// Brief summary of the conversation.
    #[serde(default)]
    pub summary: String,
    /// Main topics discussed.
    #[serde(default)]
    pub main_topics: Vec<String>,
    /// Overall sentiment: `"positive"`, `"negative"`, or `"neutral"`.
    #[serde(default)]
    pub sentiment: String,
    /// Key points or decisions made.
    #[serde(default)]
    pub key_points: Vec<String>,
}

impl ConversationAnalysis {
    /// `true` when all four fields are empty; such a result is not worth
    /// persisting.
    pub fn is_empty(&self) -> bool {
        self.summary.is_empty()
            && self.main_topics.is_empty()
            && self.sentiment.is_empty()
            && self.key_points.is_empty()
    }
}

/// Wraps a [`ChatBackend`] with the analysis prompt and retry policy.
pub struct Analyzer<B> {
    backend: B,
    model: String,
    temperature: f32,
    max_output_tokens: u32,
    policy: RetryPolicy,
}

impl<B: ChatBackend> Analyzer<B> {
    pub fn new(
        backend: B,
        model: impl Into<String>,
        temperature: f32,
        max_output_tokens: u32,
        policy: RetryPolicy,
    ) -> Self {
        Self { backend, model: model.into(), temperature, max_output_tokens, policy }
    }

    /// Analyze one session transcript.
    ///
    /// Retry behavior, bounded by the policy's attempt budget:
    /// - rate limiting backs off exponentially, then surfaces
    ///   [`AnalyzerError::RateLimited`];
    /// - a completion that fails to parse is retried, then surfaces
    ///   [`AnalyzerError::MalformedResponse`];
    /// - every other failure propagates immediately.
    pub async fn analyze(
        &self,
        session_id: i64,
        transcript: &[ChatMessage],
    ) -> Result<ConversationAnalysis, AnalyzerError> {
        let request = self.build_request(transcript);
        let attempts = self.policy.max_attempts;

        for attempt in 0..attempts {
            let last = attempt + 1 == attempts;
            match self.backend.complete(request.clone()).await {
                Ok(text) => match parse_analysis(&text) {
                    Ok(analysis) => return Ok(analysis),
                    Err(e) if last => return Err(e),
                    Err(e) => {
                        warn!(
                            session_id,
                            attempt = attempt + 1,
                            error = %e,
                            "completion did not parse; retrying"
                        );
                    }
                },
                Err(ChatError::RateLimited) if !last => {
                    let delay = self.policy.backoff_delay(attempt);
                    warn!(
                        session_id,
                        attempt = attempt + 1,
                        delay = ?delay,
                        "rate limited; backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(ChatError::RateLimited) => {
                    return Err(AnalyzerError::RateLimited { attempts });
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(AnalyzerError::Exhausted { session_id, attempts })
    }

    fn build_request(&self, transcript: &[ChatMessage]) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage::new("system", ANALYSIS_INSTRUCTION),
                ChatMessage::new(
                    "user",
                    format!("Analyze this conversation:\n{}", render_transcript(transcript)),
                ),
            ],
            temperature: self.temperature,
            max_tokens: self.max_output_tokens,
        }
    }
}

/// Render the transcript as plain text, one `role: content` line per entry.
fn render_transcript(transcript: &[ChatMessage]) -> String {
    let mut text = String::new();
    for message in transcript {
        text.push_str(&message.role);
        text.push_str(": ");
        text.push_str(&message.content);
        text.push('\n');
    }
    text
}

/// Parse a completion as [`ConversationAnalysis`].
///
/// First a strict parse of the whole (trimmed) text; if that fails, one
/// fallback: extract the outermost `{`..`}` substring and parse that. Any
/// remaining failure is a typed [`AnalyzerError::MalformedResponse`].
fn parse_analysis(text: &str) -> Result<ConversationAnalysis, AnalyzerError> {
    let trimmed = text.trim();
    let strict_err = match serde_json::from_str(trimmed) {
        Ok(analysis) => return Ok(analysis),
        Err(e) => e,
    };

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            if let Ok(analysis) = serde_json::from_str(&trimmed[start..=end]) {
                return Ok(analysis);
            }
        }
    }

    Err(AnalyzerError::MalformedResponse { reason: strict_err.to_string() })
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    use super::*;

    /// Backend that replays a scripted sequence of attempt outcomes.
    #[derive(Clone, Default)]
    struct ScriptedBackend {
        replies: Arc<Mutex<VecDeque<Result<String, ChatError>>>>,
        calls: Arc<AtomicU32>,
    }

    impl ScriptedBackend {
        fn push(&self, reply: Result<String, ChatError>) {
            self.replies.lock().unwrap().push_back(reply);
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ChatBackend for ScriptedBackend {
        async fn complete(&self, _request: ChatCompletionRequest) -> Result<String, ChatError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .expect("backend called more often than scripted")
        }
    }

    fn analyzer(backend: ScriptedBackend) -> Analyzer<ScriptedBackend> {
        // Zero base delay so rate-limit tests never sleep.
        let policy = RetryPolicy { max_attempts: 3, base_delay: Duration::ZERO };
        Analyzer::new(backend, "gpt-4", 0.7, 500, policy)
    }

    fn transcript() -> Vec<ChatMessage> {
        vec![ChatMessage::new("user", "my room was cold")]
    }

    const VALID: &str =
        r#"{"summary":"S","main_topics":["T1"],"sentiment":"positive","key_points":["K1"]}"#;

    // ── parse_analysis ────────────────────────────────────────────────────────

    #[test]
    fn parses_clean_json() {
        let analysis = parse_analysis(VALID).unwrap();
        assert_eq!(analysis.summary, "S");
        assert_eq!(analysis.sentiment, "positive");
        assert_eq!(analysis.main_topics, vec!["T1"]);
        assert_eq!(analysis.key_points, vec!["K1"]);
    }

    #[test]
    fn recovers_json_wrapped_in_prose() {
        let text = format!("Here is the analysis:\n{VALID}\nHope that helps!");
        let analysis = parse_analysis(&text).unwrap();
        assert_eq!(analysis.summary, "S");
    }

    #[test]
    fn missing_fields_default_to_empty() {
        let analysis = parse_analysis(r#"{"summary":"S"}"#).unwrap();
        assert_eq!(analysis.sentiment, "");
        assert!(analysis.main_topics.is_empty());
        assert!(analysis.key_points.is_empty());
    }

    #[test]
    fn braceless_text_is_malformed() {
        let err = parse_analysis("sorry, I cannot help with that").unwrap_err();
        assert!(matches!(err, AnalyzerError::MalformedResponse { .. }));
    }

    // ── RetryPolicy ───────────────────────────────────────────────────────────

    #[test]
    fn backoff_doubles_per_attempt() {
        let policy = RetryPolicy { max_attempts: 3, base_delay: Duration::from_secs(2) };
        assert_eq!(policy.backoff_delay(0), Duration::from_secs(2));
        assert_eq!(policy.backoff_delay(1), Duration::from_secs(4));
        assert_eq!(policy.backoff_delay(2), Duration::from_secs(8));
    }

    // ── analyze retry behavior ────────────────────────────────────────────────

    #[tokio::test]
    async fn succeeds_first_attempt() {
        let backend = ScriptedBackend::default();
        backend.push(Ok(VALID.to_owned()));
        let analysis = analyzer(backend.clone()).analyze(1, &transcript()).await.unwrap();
        assert_eq!(analysis.sentiment, "positive");
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn retries_after_rate_limit_then_succeeds() {
        let backend = ScriptedBackend::default();
        backend.push(Err(ChatError::RateLimited));
        backend.push(Err(ChatError::RateLimited));
        backend.push(Ok(VALID.to_owned()));
        let analysis = analyzer(backend.clone()).analyze(1, &transcript()).await.unwrap();
        assert_eq!(analysis.summary, "S");
        assert_eq!(backend.calls(), 3);
    }

    #[tokio::test]
    async fn rate_limit_surfaces_after_attempt_budget() {
        let backend = ScriptedBackend::default();
        for _ in 0..3 {
            backend.push(Err(ChatError::RateLimited));
        }
        let err = analyzer(backend.clone()).analyze(1, &transcript()).await.unwrap_err();
        assert!(matches!(err, AnalyzerError::RateLimited { attempts: 3 }));
        assert_eq!(backend.calls(), 3);
    }

    #[tokio::test]
    async fn malformed_output_retried_then_succeeds() {
        let backend = ScriptedBackend::default();
        backend.push(Ok("not json at all".to_owned()));
        backend.push(Ok(VALID.to_owned()));
        let analysis = analyzer(backend.clone()).analyze(1, &transcript()).await.unwrap();
        assert_eq!(analysis.summary, "S");
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn malformed_output_surfaces_after_attempt_budget() {
        let backend = ScriptedBackend::default();
        for _ in 0..3 {
            backend.push(Ok("still not json".to_owned()));
        }
        let err = analyzer(backend.clone()).analyze(1, &transcript()).await.unwrap_err();
        assert!(matches!(err, AnalyzerError::MalformedResponse { .. }));
        assert_eq!(backend.calls(), 3);
    }

    #[tokio::test]
    async fn other_failures_propagate_without_retry() {
        let backend = ScriptedBackend::default();
        backend.push(Err(ChatError::Api { status: 500, body: "boom".to_owned() }));
        let err = analyzer(backend.clone()).analyze(1, &transcript()).await.unwrap_err();
        assert!(matches!(err, AnalyzerError::Chat(ChatError::Api { status: 500, .. })));
        assert_eq!(backend.calls(), 1);
    }
}
