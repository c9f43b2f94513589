//! Filing Engine: turns a classification outcome into one atomic filing.
//!
//! [`FilingEngine::plan`] is pure. It applies the confidence gate and the
//! error fallback and builds the [`NewFiling`]. [`FilingEngine::file`] hands
//! it to the [`FilingStore`], whose single transaction claims the capture,
//! writes the destination (if any) and appends the ledger entry.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{debug, error, warn};

use cerebro_core::{
    defaults, Capture, Category, ClassificationError, ClassificationResult,
    ClassificationStatus, ConfidenceGate, Decision, DestinationRecord, FilingReceipt,
    FilingStore, NewFiling, Result,
};

use crate::bounded;

/// Category recorded when classification failed; tasks need the fewest fields.
pub const FALLBACK_CATEGORY: Category = Category::Task;

/// Writes filings through a [`FilingStore`] with bounded retries.
pub struct FilingEngine {
    store: Arc<dyn FilingStore>,
    commit_attempts: u32,
    commit_backoff: Duration,
    storage_timeout: Duration,
}

impl FilingEngine {
    pub fn new(store: Arc<dyn FilingStore>) -> Self {
        Self {
            store,
            commit_attempts: defaults::FILING_COMMIT_ATTEMPTS,
            commit_backoff: Duration::from_millis(defaults::FILING_COMMIT_BACKOFF_MS),
            storage_timeout: Duration::from_secs(defaults::STORAGE_TIMEOUT_SECS),
        }
    }

    /// Attempts per commit (at least one) and the pause between them.
    pub fn with_commit_retries(mut self, attempts: u32, backoff: Duration) -> Self {
        self.commit_attempts = attempts.max(1);
        self.commit_backoff = backoff;
        self
    }

    /// Cap on each commit call.
    pub fn with_storage_timeout(mut self, timeout: Duration) -> Self {
        self.storage_timeout = timeout;
        self
    }

    /// Build the filing for `capture` from a classification outcome.
    ///
    /// - accepted by the gate: `auto_filed` with a new destination record
    /// - rejected by the gate: `needs_review`, no destination
    /// - classification error: `needs_review` as a zero-confidence task with
    ///   the raw response kept and the error summary set on the capture
    pub fn plan(
        capture: &Capture,
        outcome: &std::result::Result<ClassificationResult, ClassificationError>,
        gate: &ConfidenceGate,
        now: DateTime<Utc>,
    ) -> NewFiling {
        match outcome {
            Ok(result) => {
                let decision = gate.evaluate(result.confidence);
                debug!(
                    subsystem = "jobs",
                    component = "filing_engine",
                    op = "plan",
                    capture_id = %capture.id,
                    category = result.category().as_str(),
                    confidence = result.confidence,
                    threshold = gate.threshold(),
                    ?decision,
                    "Gate decision"
                );
                let (status, destination) = match decision {
                    Decision::AutoFile => (
                        ClassificationStatus::AutoFiled,
                        Some(DestinationRecord::from_fields(
                            capture.owner_id,
                            &result.extracted,
                            now,
                        )),
                    ),
                    Decision::NeedsReview => (ClassificationStatus::NeedsReview, None),
                };
                NewFiling {
                    capture_id: capture.id,
                    owner_id: capture.owner_id,
                    category: result.category(),
                    confidence: result.confidence,
                    extracted_fields: result.extracted.to_value(),
                    raw_llm_response: Some(result.raw_response.clone()),
                    model: result.model.clone(),
                    status,
                    destination,
                    processing_error: None,
                }
            }
            Err(err) => NewFiling {
                capture_id: capture.id,
                owner_id: capture.owner_id,
                category: FALLBACK_CATEGORY,
                confidence: 0.0,
                extracted_fields: json!({}),
                raw_llm_response: err.raw_response.clone(),
                model: err.model.clone(),
                status: ClassificationStatus::NeedsReview,
                destination: None,
                processing_error: Some(err.summary()),
            },
        }
    }

    /// Commit `filing`, retrying storage failures.
    ///
    /// Returns `Ok(None)` when the capture had already been processed. A
    /// retry after a commit whose acknowledgement was lost lands there too,
    /// since the store's claim is a compare-and-swap.
    pub async fn file(&self, filing: NewFiling) -> Result<Option<FilingReceipt>> {
        let capture_id = filing.capture_id;
        let mut attempt = 1;
        loop {
            let result = bounded(
                self.storage_timeout,
                "commit_filing",
                self.store.commit_filing(filing.clone()),
            )
            .await;

            match result {
                Ok(receipt) => return Ok(receipt),
                Err(e) if e.is_storage_failure() && attempt < self.commit_attempts => {
                    warn!(
                        subsystem = "jobs",
                        component = "filing_engine",
                        op = "file",
                        capture_id = %capture_id,
                        attempt,
                        max_attempts = self.commit_attempts,
                        error = %e,
                        "Filing commit failed; retrying"
                    );
                    tokio::time::sleep(self.commit_backoff).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(
                        subsystem = "jobs",
                        component = "filing_engine",
                        op = "file",
                        capture_id = %capture_id,
                        attempt,
                        error = %e,
                        "Filing commit failed"
                    );
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cerebro_core::{CaptureSource, ExtractedFields, ProjectStatus};
    use cerebro_db::MemoryStore;
    use uuid::Uuid;

    fn capture(raw_text: &str) -> Capture {
        Capture {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            raw_text: raw_text.to_string(),
            source: CaptureSource::Text,
            audio_url: None,
            processed: false,
            processing_error: None,
            created_at: Utc::now(),
        }
    }

    fn result(category: Category, confidence: f64, raw_text: &str) -> ClassificationResult {
        ClassificationResult {
            confidence,
            extracted: ExtractedFields::seed(category, raw_text),
            raw_response: "{\"raw\": true}".to_string(),
            model: Some("mock-model".to_string()),
        }
    }

    #[test]
    fn test_plan_auto_file_builds_destination() {
        let capture = capture("Buy milk");
        let outcome = Ok(result(Category::Task, 0.95, "Buy milk"));
        let filing =
            FilingEngine::plan(&capture, &outcome, &ConfidenceGate::default(), Utc::now());

        assert_eq!(filing.status, ClassificationStatus::AutoFiled);
        assert_eq!(filing.category, Category::Task);
        let destination = filing.destination.expect("destination planned");
        assert_eq!(destination.category(), Category::Task);
        assert_eq!(destination.owner_id(), capture.owner_id);
        assert!(filing.processing_error.is_none());
        assert_eq!(filing.raw_llm_response.as_deref(), Some("{\"raw\": true}"));
    }

    #[test]
    fn test_plan_project_defaults_to_active() {
        let capture = capture("Website redesign");
        let outcome = Ok(result(Category::Project, 0.9, "Website redesign"));
        let filing =
            FilingEngine::plan(&capture, &outcome, &ConfidenceGate::default(), Utc::now());

        match filing.destination {
            Some(DestinationRecord::Project(p)) => assert_eq!(p.status, ProjectStatus::Active),
            other => panic!("Expected project destination, got {:?}", other),
        }
    }

    #[test]
    fn test_plan_below_threshold_needs_review() {
        let capture = capture("Buy milk");
        let outcome = Ok(result(Category::Task, 0.4, "Buy milk"));
        let filing = FilingEngine::plan(
            &capture,
            &outcome,
            &ConfidenceGate::for_profile(Some(0.6)),
            Utc::now(),
        );

        assert_eq!(filing.status, ClassificationStatus::NeedsReview);
        assert!(filing.destination.is_none());
        assert_eq!(filing.confidence, 0.4);
    }

    #[test]
    fn test_plan_tie_auto_files() {
        let capture = capture("Buy milk");
        let outcome = Ok(result(Category::Task, 0.6, "Buy milk"));
        let filing = FilingEngine::plan(
            &capture,
            &outcome,
            &ConfidenceGate::for_profile(Some(0.6)),
            Utc::now(),
        );
        assert_eq!(filing.status, ClassificationStatus::AutoFiled);
    }

    #[test]
    fn test_plan_error_falls_back_to_reviewable_task() {
        let capture = capture("???");
        let outcome = Err(
            ClassificationError::parse_failure("response is not valid JSON", "Sorry")
                .with_model("mock-model"),
        );
        let filing =
            FilingEngine::plan(&capture, &outcome, &ConfidenceGate::default(), Utc::now());

        assert_eq!(filing.status, ClassificationStatus::NeedsReview);
        assert_eq!(filing.category, Category::Task);
        assert_eq!(filing.confidence, 0.0);
        assert!(filing.destination.is_none());
        assert_eq!(filing.raw_llm_response.as_deref(), Some("Sorry"));
        assert_eq!(filing.model.as_deref(), Some("mock-model"));
        assert!(filing
            .processing_error
            .as_deref()
            .is_some_and(|e| e.starts_with("Failed to parse classification")));
    }

    #[test]
    fn test_plan_provider_failure_has_no_raw_response() {
        let capture = capture("Buy milk");
        let outcome = Err(ClassificationError::provider_failure("HTTP 503"));
        let filing =
            FilingEngine::plan(&capture, &outcome, &ConfidenceGate::default(), Utc::now());

        assert!(filing.raw_llm_response.is_none());
        assert!(filing
            .processing_error
            .as_deref()
            .is_some_and(|e| e.contains("HTTP 503")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_file_retries_storage_failure() {
        let store = MemoryStore::new();
        let scheduled = cerebro_core::CaptureRepository::insert(
            &store,
            cerebro_db::test_fixtures::capture_request(Uuid::new_v4(), "Buy milk"),
        )
        .await
        .unwrap();
        store.fail_next_commits(2).unwrap();

        let engine = FilingEngine::new(Arc::new(store.clone()));
        let filing = FilingEngine::plan(
            &scheduled,
            &Ok(result(Category::Task, 0.9, "Buy milk")),
            &ConfidenceGate::default(),
            Utc::now(),
        );

        let receipt = engine.file(filing).await.unwrap();
        assert!(receipt.is_some());
        assert_eq!(store.destination_count().unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_file_gives_up_after_attempts() {
        let store = MemoryStore::new();
        let capture = cerebro_core::CaptureRepository::insert(
            &store,
            cerebro_db::test_fixtures::capture_request(Uuid::new_v4(), "Buy milk"),
        )
        .await
        .unwrap();
        store.fail_next_commits(5).unwrap();

        let engine = FilingEngine::new(Arc::new(store.clone()));
        let filing = FilingEngine::plan(
            &capture,
            &Ok(result(Category::Task, 0.9, "Buy milk")),
            &ConfidenceGate::default(),
            Utc::now(),
        );

        let err = engine.file(filing).await.unwrap_err();
        assert!(err.is_storage_failure());
        assert_eq!(store.destination_count().unwrap(), 0);
        assert!(store.classifications().unwrap().is_empty());
        assert!(!store.capture(capture.id).unwrap().unwrap().processed);
    }
}
