//! LLM-backed [`Classifier`] with bounded retry.
//!
//! Each attempt is capped by a timeout. Transient provider failures
//! (`ProviderUnavailable`, timeouts) are retried with exponential backoff up
//! to [`RetryPolicy::max_retries`] times; anything else ends the attempt
//! loop at once. A response that arrives but does not parse is never retried.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use cerebro_core::{
    defaults, ClassificationError, ClassificationResult, Classifier, Error, GenerationBackend,
    GenerationOptions,
};

use crate::parse::parse_classification;
use crate::prompt::{CLASSIFICATION_PROMPT, CLASSIFICATION_PROMPT_VERSION};

/// Retry and timeout settings for classification calls.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first failed attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubles for each later one.
    pub initial_backoff: Duration,
    /// Cap on a single provider call.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: defaults::CLASSIFY_MAX_RETRIES,
            initial_backoff: Duration::from_millis(defaults::CLASSIFY_BACKOFF_MS),
            attempt_timeout: Duration::from_secs(defaults::CLASSIFY_TIMEOUT_SECS),
        }
    }
}

impl RetryPolicy {
    /// Read `CLASSIFY_MAX_RETRIES`, `CLASSIFY_BACKOFF_MS` and `LLM_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        let env_parse = |key: &str| std::env::var(key).ok().and_then(|v| v.parse::<u64>().ok());
        Self {
            max_retries: std::env::var("CLASSIFY_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults::CLASSIFY_MAX_RETRIES),
            initial_backoff: Duration::from_millis(
                env_parse("CLASSIFY_BACKOFF_MS").unwrap_or(defaults::CLASSIFY_BACKOFF_MS),
            ),
            attempt_timeout: Duration::from_secs(
                env_parse("LLM_TIMEOUT_SECS").unwrap_or(defaults::CLASSIFY_TIMEOUT_SECS),
            ),
        }
    }

    /// Delay before retry number `retry` (0-based).
    pub fn backoff_for(&self, retry: u32) -> Duration {
        self.initial_backoff
            .saturating_mul(2u32.saturating_pow(retry))
    }

    /// Total attempts including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Whether a backend error is worth another attempt.
fn is_transient(err: &Error) -> bool {
    matches!(err, Error::ProviderUnavailable(_) | Error::Timeout(_))
}

/// Classifies capture text through a [`GenerationBackend`].
pub struct LlmClassifier {
    backend: Arc<dyn GenerationBackend>,
    policy: RetryPolicy,
    options: GenerationOptions,
}

impl LlmClassifier {
    pub fn new(backend: Arc<dyn GenerationBackend>) -> Self {
        Self::with_policy(backend, RetryPolicy::default())
    }

    pub fn with_policy(backend: Arc<dyn GenerationBackend>, policy: RetryPolicy) -> Self {
        Self {
            backend,
            policy,
            options: GenerationOptions::default(),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn model_name(&self) -> &str {
        self.backend.model_name()
    }

    /// One provider call bounded by the attempt timeout.
    async fn attempt(&self, raw_text: &str) -> cerebro_core::Result<String> {
        let call = self
            .backend
            .generate_with_system(CLASSIFICATION_PROMPT, raw_text, &self.options);
        match tokio::time::timeout(self.policy.attempt_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(format!(
                "classification call exceeded {}s",
                self.policy.attempt_timeout.as_secs_f64()
            ))),
        }
    }
}

#[async_trait]
impl Classifier for LlmClassifier {
    async fn classify(
        &self,
        raw_text: &str,
    ) -> Result<ClassificationResult, ClassificationError> {
        let model = self.backend.model_name().to_string();
        let start = Instant::now();
        let max_attempts = self.policy.max_attempts();

        debug!(
            subsystem = "inference",
            component = "classifier",
            op = "classify",
            model = %model,
            prompt_version = CLASSIFICATION_PROMPT_VERSION,
            text_len = raw_text.len(),
            "Classifying capture"
        );

        let mut attempt = 1;
        let content = loop {
            match self.attempt(raw_text).await {
                Ok(content) => break content,
                Err(e) if is_transient(&e) && attempt < max_attempts => {
                    let backoff = self.policy.backoff_for(attempt - 1);
                    warn!(
                        subsystem = "inference",
                        component = "classifier",
                        op = "classify",
                        attempt,
                        max_attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Provider call failed; retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(
                        subsystem = "inference",
                        component = "classifier",
                        op = "classify",
                        attempt,
                        duration_ms = start.elapsed().as_millis() as u64,
                        error = %e,
                        "Provider call failed; giving up"
                    );
                    return Err(ClassificationError::provider_failure(format!(
                        "{} (after {} attempt{})",
                        e,
                        attempt,
                        if attempt == 1 { "" } else { "s" }
                    ))
                    .with_model(model));
                }
            }
        };

        match parse_classification(&content, Some(&model)) {
            Ok(result) => {
                info!(
                    subsystem = "inference",
                    component = "classifier",
                    op = "classify",
                    category = result.category().as_str(),
                    confidence = result.confidence,
                    attempts = attempt,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Classification parsed"
                );
                Ok(result)
            }
            Err(err) => {
                warn!(
                    subsystem = "inference",
                    component = "classifier",
                    op = "classify",
                    kind = %err.kind,
                    error = %err.message,
                    response_len = content.len(),
                    "Classification response rejected"
                );
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockGenerationBackend, MockReply};
    use cerebro_core::{Category, ClassificationErrorKind};
    use serde_json::json;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 2,
            initial_backoff: Duration::from_millis(1000),
            attempt_timeout: Duration::from_secs(30),
        }
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 2);
        assert_eq!(policy.initial_backoff, Duration::from_secs(1));
        assert_eq!(policy.attempt_timeout, Duration::from_secs(30));
        assert_eq!(policy.max_attempts(), 3);
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_for(0), Duration::from_secs(1));
        assert_eq!(policy.backoff_for(1), Duration::from_secs(2));
        assert_eq!(policy.backoff_for(2), Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_classify_success_sends_prompt() {
        let backend = MockGenerationBackend::new().then_classification(
            "task",
            0.95,
            json!({"name": "Buy milk", "due_date": null, "notes": ""}),
        );
        let classifier = LlmClassifier::with_policy(Arc::new(backend.clone()), fast_policy());

        let result = classifier.classify("Buy milk").await.unwrap();
        assert_eq!(result.category(), Category::Task);
        assert_eq!(result.model.as_deref(), Some("mock-model"));

        let calls = backend.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].system, CLASSIFICATION_PROMPT);
        assert_eq!(calls[0].prompt, "Buy milk");
        assert_eq!(calls[0].options.temperature, 0.0);
        assert!(calls[0].options.json_response);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried_with_backoff() {
        let backend = MockGenerationBackend::new()
            .then(MockReply::Unavailable("HTTP 503".into()))
            .then(MockReply::Unavailable("HTTP 429".into()))
            .then_classification("idea", 0.7, json!({"title": "AI summaries"}));
        let classifier = LlmClassifier::with_policy(Arc::new(backend.clone()), fast_policy());

        let start = tokio::time::Instant::now();
        let result = classifier.classify("What if...").await.unwrap();

        assert_eq!(result.category(), Category::Idea);
        assert_eq!(backend.call_count(), 3);
        // 1s + 2s of backoff under the paused clock
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_exhaust_into_provider_failure() {
        let backend = MockGenerationBackend::new()
            .with_fallback(MockReply::Unavailable("HTTP 502".into()));
        let classifier = LlmClassifier::with_policy(Arc::new(backend.clone()), fast_policy());

        let err = classifier.classify("Buy milk").await.unwrap_err();
        assert_eq!(err.kind, ClassificationErrorKind::ProviderFailure);
        assert!(err.message.contains("3 attempts"));
        assert_eq!(err.model.as_deref(), Some("mock-model"));
        assert_eq!(backend.call_count(), 3);
    }

    #[tokio::test]
    async fn test_permanent_failure_not_retried() {
        let backend = MockGenerationBackend::new().then(MockReply::Fail("HTTP 400".into()));
        let classifier = LlmClassifier::with_policy(Arc::new(backend.clone()), fast_policy());

        let err = classifier.classify("Buy milk").await.unwrap_err();
        assert_eq!(err.kind, ClassificationErrorKind::ProviderFailure);
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_provider_times_out_per_attempt() {
        let backend = MockGenerationBackend::new()
            .then(MockReply::Hang)
            .then_classification("task", 0.9, json!({"name": "Buy milk"}));
        let classifier = LlmClassifier::with_policy(Arc::new(backend.clone()), fast_policy());

        let result = classifier.classify("Buy milk").await.unwrap();
        assert_eq!(result.category(), Category::Task);
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test]
    async fn test_parse_failure_not_retried() {
        let backend = MockGenerationBackend::new()
            .then(MockReply::Content("Sorry, I cannot classify this.".into()));
        let classifier = LlmClassifier::with_policy(Arc::new(backend.clone()), fast_policy());

        let err = classifier.classify("???").await.unwrap_err();
        assert_eq!(err.kind, ClassificationErrorKind::ParseFailure);
        assert_eq!(
            err.raw_response.as_deref(),
            Some("Sorry, I cannot classify this.")
        );
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_zero_retries_single_attempt() {
        let backend = MockGenerationBackend::new()
            .with_fallback(MockReply::Unavailable("HTTP 503".into()));
        let policy = RetryPolicy {
            max_retries: 0,
            ..fast_policy()
        };
        let classifier = LlmClassifier::with_policy(Arc::new(backend.clone()), policy);

        let err = classifier.classify("Buy milk").await.unwrap_err();
        assert_eq!(err.kind, ClassificationErrorKind::ProviderFailure);
        assert!(err.message.contains("1 attempt)"));
        assert_eq!(backend.call_count(), 1);
    }
}
