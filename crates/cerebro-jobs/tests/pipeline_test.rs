//! Integration tests for the classification pipeline and reviewer resolution.
//!
//! This test suite validates:
//! - The classify → gate → file sequence for accepted, rejected and failed
//!   classifications
//! - Idempotency and the concurrent filing race
//! - Storage fault handling (commit retry, propagation, timeouts)
//! - Confirm and override resolutions, including category migration
//! - Referential integrity between ledger entries and destination records
//!
//! Every test runs against the in-memory store and a scripted model backend.

use std::sync::Arc;
use std::time::Duration;

use cerebro_core::{
    CaptureRepository, Category, Classification, ClassificationRepository, ClassificationStatus,
    DestinationRecord, Error, ResolutionMode,
};
use cerebro_db::test_fixtures::{capture_request, test_owner};
use cerebro_db::MemoryStore;
use cerebro_inference::mock::classification_json;
use cerebro_inference::{LlmClassifier, MockGenerationBackend, MockReply, RetryPolicy};
use cerebro_jobs::{
    ClassificationPipeline, PipelineConfig, ReclassificationHandler, ResolveRequest, Stores,
};
use serde_json::json;
use uuid::Uuid;

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

struct Harness {
    store: MemoryStore,
    backend: MockGenerationBackend,
    pipeline: ClassificationPipeline,
    resolver: ReclassificationHandler,
}

fn harness(backend: MockGenerationBackend) -> Harness {
    harness_with_config(backend, PipelineConfig::default())
}

fn harness_with_config(backend: MockGenerationBackend, config: PipelineConfig) -> Harness {
    let store = MemoryStore::new();
    let stores = Stores::shared(Arc::new(store.clone()));
    let classifier = LlmClassifier::with_policy(Arc::new(backend.clone()), RetryPolicy::default());
    Harness {
        resolver: ReclassificationHandler::new(&stores),
        pipeline: ClassificationPipeline::new(stores, Arc::new(classifier), config),
        store,
        backend,
    }
}

async fn new_capture(store: &MemoryStore, owner: Uuid, text: &str) -> Uuid {
    CaptureRepository::insert(store, capture_request(owner, text))
        .await
        .expect("Failed to insert capture")
        .id
}

fn buy_milk() -> serde_json::Value {
    json!({"name": "Buy milk", "due_date": null, "notes": ""})
}

/// Every ledger entry with a destination points at an existing record of
/// its own category.
fn assert_referential_integrity(store: &MemoryStore) {
    for entry in store.classifications().unwrap() {
        if let Some(destination_id) = entry.destination_id {
            let found = store
                .destinations(entry.category)
                .unwrap()
                .iter()
                .any(|d| d.id() == destination_id);
            assert!(
                found,
                "entry {} points at missing {} {}",
                entry.id, entry.category, destination_id
            );
        }
        assert_eq!(
            entry.status.requires_destination(),
            entry.destination_id.is_some(),
            "status {} inconsistent with destination",
            entry.status
        );
    }
}

fn task_name(record: &DestinationRecord) -> &str {
    match record {
        DestinationRecord::Task(t) => &t.name,
        other => panic!("Expected task, got {:?}", other),
    }
}

async fn entry(h: &Harness, owner: Uuid, capture_id: Uuid) -> Classification {
    ClassificationRepository::get_by_capture(&h.store, owner, capture_id)
        .await
        .unwrap()
        .expect("ledger entry written")
}

// ============================================================================
// CLASSIFY → GATE → FILE
// ============================================================================

#[tokio::test]
async fn test_confident_task_is_auto_filed() {
    let h = harness(MockGenerationBackend::new().then_classification("task", 0.95, buy_milk()));
    let owner = test_owner();
    let capture_id = new_capture(&h.store, owner, "Buy milk").await;

    let outcome = h.pipeline.process_capture(owner, capture_id).await.unwrap();

    assert!(outcome.newly_filed);
    let entry = outcome.classification.unwrap();
    assert_eq!(entry.status, ClassificationStatus::AutoFiled);
    assert_eq!(entry.category, Category::Task);
    assert_eq!(entry.model.as_deref(), Some("mock-model"));

    let tasks = h.store.destinations(Category::Task).unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(task_name(&tasks[0]), "Buy milk");
    assert_eq!(entry.destination_id, Some(tasks[0].id()));

    let capture = h.store.capture(capture_id).unwrap().unwrap();
    assert!(capture.processed);
    assert!(capture.processing_error.is_none());
    assert_referential_integrity(&h.store);
}

#[tokio::test]
async fn test_low_confidence_needs_review() {
    let h = harness(MockGenerationBackend::new().then_classification("task", 0.4, buy_milk()));
    let owner = test_owner();
    let capture_id = new_capture(&h.store, owner, "Buy milk").await;

    let outcome = h.pipeline.process_capture(owner, capture_id).await.unwrap();

    let entry = outcome.classification.unwrap();
    assert_eq!(entry.status, ClassificationStatus::NeedsReview);
    assert!(entry.destination_id.is_none());
    assert!(outcome.destination.is_none());
    assert_eq!(h.store.destination_count().unwrap(), 0);
    assert!(h.store.capture(capture_id).unwrap().unwrap().processed);
}

#[tokio::test]
async fn test_non_json_reply_is_contained_as_review() {
    let h = harness(
        MockGenerationBackend::new()
            .then(MockReply::Content("Sorry, I cannot classify this.".into())),
    );
    let owner = test_owner();
    let capture_id = new_capture(&h.store, owner, "Buy milk").await;

    let outcome = h.pipeline.process_capture(owner, capture_id).await;

    let entry = outcome.expect("parse failure must not escape").classification.unwrap();
    assert_eq!(entry.status, ClassificationStatus::NeedsReview);
    assert_eq!(
        entry.raw_llm_response.as_deref(),
        Some("Sorry, I cannot classify this.")
    );
    assert_eq!(entry.confidence, 0.0);
    assert_eq!(h.store.destination_count().unwrap(), 0);

    let capture = h.store.capture(capture_id).unwrap().unwrap();
    assert!(capture.processed);
    assert!(capture.processing_error.is_some());
    // Parse failures are not retried.
    assert_eq!(h.backend.call_count(), 1);
}

#[tokio::test]
async fn test_schema_violation_is_contained_as_review() {
    let h = harness(MockGenerationBackend::new().then_classification(
        "person",
        0.9,
        json!({"name": "", "context": "met at conference"}),
    ));
    let owner = test_owner();
    let capture_id = new_capture(&h.store, owner, "Met someone at the conference").await;

    let entry = h
        .pipeline
        .process_capture(owner, capture_id)
        .await
        .unwrap()
        .classification
        .unwrap();

    assert_eq!(entry.status, ClassificationStatus::NeedsReview);
    assert_eq!(h.store.destination_count().unwrap(), 0);
    let error = h.store.capture(capture_id).unwrap().unwrap().processing_error;
    assert!(error.is_some_and(|e| e.contains("person.name")));
}

#[tokio::test]
async fn test_confidence_is_clamped_before_gating() {
    let h = harness(
        MockGenerationBackend::new()
            .then_classification("task", 1.7, buy_milk())
            .then_classification("task", -0.2, buy_milk()),
    );
    let owner = test_owner();
    let high = new_capture(&h.store, owner, "Buy milk").await;
    let low = new_capture(&h.store, owner, "Buy milk again").await;

    let high = h.pipeline.process_capture(owner, high).await.unwrap();
    let low = h.pipeline.process_capture(owner, low).await.unwrap();

    let high = high.classification.unwrap();
    assert_eq!(high.confidence, 1.0);
    assert_eq!(high.status, ClassificationStatus::AutoFiled);

    let low = low.classification.unwrap();
    assert_eq!(low.confidence, 0.0);
    assert_eq!(low.status, ClassificationStatus::NeedsReview);
}

#[tokio::test]
async fn test_owner_threshold_is_honoured() {
    let h = harness(
        MockGenerationBackend::new()
            .then_classification("task", 0.8, buy_milk())
            .then_classification("task", 0.8, buy_milk()),
    );
    let strict = test_owner();
    let lenient = test_owner();
    h.store.set_threshold(strict, 0.9).unwrap();

    let strict_capture = new_capture(&h.store, strict, "Buy milk").await;
    let lenient_capture = new_capture(&h.store, lenient, "Buy milk").await;

    let strict_entry = h
        .pipeline
        .process_capture(strict, strict_capture)
        .await
        .unwrap()
        .classification
        .unwrap();
    let lenient_entry = h
        .pipeline
        .process_capture(lenient, lenient_capture)
        .await
        .unwrap()
        .classification
        .unwrap();

    assert_eq!(strict_entry.status, ClassificationStatus::NeedsReview);
    assert_eq!(lenient_entry.status, ClassificationStatus::AutoFiled);
}

#[tokio::test(start_paused = true)]
async fn test_provider_outage_ends_in_review_after_retries() {
    let h = harness(
        MockGenerationBackend::new().with_fallback(MockReply::Unavailable("HTTP 503".into())),
    );
    let owner = test_owner();
    let capture_id = new_capture(&h.store, owner, "Buy milk").await;

    let entry = h
        .pipeline
        .process_capture(owner, capture_id)
        .await
        .unwrap()
        .classification
        .unwrap();

    assert_eq!(h.backend.call_count(), 3);
    assert_eq!(entry.status, ClassificationStatus::NeedsReview);
    assert!(entry.raw_llm_response.is_none());
    let error = h.store.capture(capture_id).unwrap().unwrap().processing_error;
    assert!(error.is_some_and(|e| e.contains("HTTP 503")));
}

#[tokio::test]
async fn test_foreign_capture_is_not_found() {
    let h = harness(MockGenerationBackend::new());
    let capture_id = new_capture(&h.store, test_owner(), "Buy milk").await;

    let err = h
        .pipeline
        .process_capture(test_owner(), capture_id)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::CaptureNotFound(id) if id == capture_id));
    assert_eq!(h.backend.call_count(), 0);
}

// ============================================================================
// IDEMPOTENCY AND RACES
// ============================================================================

#[tokio::test]
async fn test_second_run_is_a_noop() {
    let h = harness(MockGenerationBackend::new().then_classification("task", 0.95, buy_milk()));
    let owner = test_owner();
    let capture_id = new_capture(&h.store, owner, "Buy milk").await;

    let first = h.pipeline.process_capture(owner, capture_id).await.unwrap();
    let second = h.pipeline.process_capture(owner, capture_id).await.unwrap();

    assert!(first.newly_filed);
    assert!(!second.newly_filed);
    assert_eq!(
        first.classification.unwrap().id,
        second.classification.unwrap().id
    );
    assert_eq!(
        second.destination.map(|d| d.id()),
        first.destination.map(|d| d.id())
    );
    assert_eq!(h.backend.call_count(), 1);
    assert_eq!(h.store.destination_count().unwrap(), 1);
    assert_eq!(h.store.classifications().unwrap().len(), 1);
}

#[tokio::test]
async fn test_concurrent_runs_file_once() {
    let h = harness(MockGenerationBackend::new().with_fallback(MockReply::Content(
        classification_json("task", 0.95, buy_milk()),
    )));
    let owner = test_owner();
    let capture_id = new_capture(&h.store, owner, "Buy milk").await;

    let (a, b) = futures::join!(
        h.pipeline.process_capture(owner, capture_id),
        h.pipeline.process_capture(owner, capture_id)
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(
        [a.newly_filed, b.newly_filed].iter().filter(|f| **f).count(),
        1
    );
    assert_eq!(h.store.destinations(Category::Task).unwrap().len(), 1);
    assert_eq!(h.store.classifications().unwrap().len(), 1);
    assert_eq!(
        a.classification.map(|c| c.id),
        b.classification.map(|c| c.id)
    );
    assert_referential_integrity(&h.store);
}

// ============================================================================
// STORAGE FAULTS
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_transient_commit_failure_is_retried() {
    let h = harness(MockGenerationBackend::new().then_classification("task", 0.95, buy_milk()));
    let owner = test_owner();
    let capture_id = new_capture(&h.store, owner, "Buy milk").await;
    h.store.fail_next_commits(2).unwrap();

    let outcome = h.pipeline.process_capture(owner, capture_id).await.unwrap();

    assert!(outcome.newly_filed);
    assert_eq!(h.store.destination_count().unwrap(), 1);
    assert_eq!(h.store.classifications().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_persistent_commit_failure_propagates_and_recovers() {
    let h = harness(
        MockGenerationBackend::new().with_fallback(MockReply::Content(classification_json(
            "task",
            0.95,
            buy_milk(),
        ))),
    );
    let owner = test_owner();
    let capture_id = new_capture(&h.store, owner, "Buy milk").await;
    h.store.fail_next_commits(3).unwrap();

    let err = h.pipeline.process_capture(owner, capture_id).await.unwrap_err();
    assert!(err.is_storage_failure());
    assert_eq!(h.store.destination_count().unwrap(), 0);
    assert!(h.store.classifications().unwrap().is_empty());
    assert!(!h.store.capture(capture_id).unwrap().unwrap().processed);

    // A later run (job retry or sweep) finishes the capture.
    let outcome = h.pipeline.process_capture(owner, capture_id).await.unwrap();
    assert!(outcome.newly_filed);
    assert_eq!(h.store.destination_count().unwrap(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_slow_storage_times_out() {
    let config = PipelineConfig {
        storage_timeout: Duration::from_secs(2),
        commit_attempts: 2,
        commit_backoff: Duration::from_millis(10),
    };
    let h = harness_with_config(
        MockGenerationBackend::new().then_classification("task", 0.95, buy_milk()),
        config,
    );
    let owner = test_owner();
    let capture_id = new_capture(&h.store, owner, "Buy milk").await;
    h.store
        .set_commit_delay(Some(Duration::from_secs(60)))
        .unwrap();

    let err = h.pipeline.process_capture(owner, capture_id).await.unwrap_err();

    assert!(matches!(err, Error::Timeout(_)), "got {:?}", err);
    assert!(!h.store.capture(capture_id).unwrap().unwrap().processed);
    assert_eq!(h.store.destination_count().unwrap(), 0);
}

// ============================================================================
// RESOLUTION
// ============================================================================

fn confirm() -> ResolveRequest {
    ResolveRequest {
        mode: ResolutionMode::Confirm,
        category: None,
        fields: None,
    }
}

#[tokio::test]
async fn test_confirm_review_entry_files_manually() {
    let h = harness(MockGenerationBackend::new().then_classification("task", 0.4, buy_milk()));
    let owner = test_owner();
    let capture_id = new_capture(&h.store, owner, "Buy milk").await;
    let reviewed = h.pipeline.process_capture(owner, capture_id).await.unwrap();
    let entry_id = reviewed.classification.unwrap().id;

    let receipt = h.resolver.resolve(owner, entry_id, confirm()).await.unwrap();

    assert_eq!(receipt.classification.status, ClassificationStatus::ManuallyFiled);
    assert_eq!(
        receipt.classification.destination_id,
        Some(receipt.destination.id())
    );
    assert!(receipt.classification.resolved_at.is_some());
    let tasks = h.store.destinations(Category::Task).unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(task_name(&tasks[0]), "Buy milk");

    assert_eq!(receipt.correction.mode, ResolutionMode::Confirm);
    assert_eq!(receipt.correction.previous_destination_id, None);
    assert_referential_integrity(&h.store);
}

#[tokio::test]
async fn test_override_migrates_category_and_keeps_old_record() {
    let h = harness(MockGenerationBackend::new().then_classification(
        "idea",
        0.9,
        json!({"title": "AI meeting summaries", "one_liner": "", "notes": "after every call"}),
    ));
    let owner = test_owner();
    let capture_id = new_capture(&h.store, owner, "AI meeting summaries").await;
    let filed = h.pipeline.process_capture(owner, capture_id).await.unwrap();
    let original = filed.classification.unwrap();
    let idea_id = original.destination_id.expect("idea filed");

    let receipt = h
        .resolver
        .resolve(
            owner,
            original.id,
            ResolveRequest {
                mode: ResolutionMode::Override,
                category: Some(Category::Task),
                fields: None,
            },
        )
        .await
        .unwrap();

    let entry = receipt.classification;
    assert_eq!(entry.status, ClassificationStatus::ManuallyCorrected);
    assert_eq!(entry.category, Category::Task);
    assert_ne!(entry.destination_id, Some(idea_id));

    let tasks = h.store.destinations(Category::Task).unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(entry.destination_id, Some(tasks[0].id()));
    assert_eq!(task_name(&tasks[0]), "AI meeting summaries");
    match &tasks[0] {
        DestinationRecord::Task(t) => assert_eq!(t.notes.as_deref(), Some("after every call")),
        _ => unreachable!(),
    }

    // The idea record is untouched.
    let ideas = h.store.destinations(Category::Idea).unwrap();
    assert_eq!(ideas.len(), 1);
    assert_eq!(ideas[0].id(), idea_id);
    assert_eq!(filed.destination.as_ref().map(|d| d.id()), Some(idea_id));

    let corrections = ClassificationRepository::list_corrections(&h.store, owner, entry.id)
        .await
        .unwrap();
    assert_eq!(corrections.len(), 1);
    assert_eq!(corrections[0].previous_category, Category::Idea);
    assert_eq!(corrections[0].new_category, Category::Task);
    assert_eq!(corrections[0].previous_destination_id, Some(idea_id));
    assert_referential_integrity(&h.store);
}

#[tokio::test]
async fn test_override_same_category_updates_in_place() {
    let h = harness(MockGenerationBackend::new().then_classification("task", 0.95, buy_milk()));
    let owner = test_owner();
    let capture_id = new_capture(&h.store, owner, "Buy milk").await;
    let filed = h.pipeline.process_capture(owner, capture_id).await.unwrap();
    let original = filed.classification.unwrap();

    let receipt = h
        .resolver
        .resolve(
            owner,
            original.id,
            ResolveRequest {
                mode: ResolutionMode::Override,
                category: None,
                fields: Some(json!({"name": "Buy oat milk", "due_date": "2026-11-01", "notes": ""})),
            },
        )
        .await
        .unwrap();

    assert_eq!(receipt.classification.status, ClassificationStatus::ManuallyCorrected);
    assert_eq!(receipt.classification.destination_id, original.destination_id);
    let tasks = h.store.destinations(Category::Task).unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(task_name(&tasks[0]), "Buy oat milk");
}

#[tokio::test]
async fn test_confirm_after_parse_failure_seeds_from_raw_text() {
    let h = harness(MockGenerationBackend::new());
    let owner = test_owner();
    let capture_id = new_capture(&h.store, owner, "Call the dentist tomorrow").await;
    h.pipeline.process_capture(owner, capture_id).await.unwrap();
    let failed = entry(&h, owner, capture_id).await;
    assert_eq!(failed.extracted_fields, json!({}));

    let receipt = h.resolver.resolve(owner, failed.id, confirm()).await.unwrap();

    assert_eq!(receipt.classification.status, ClassificationStatus::ManuallyFiled);
    assert_eq!(task_name(&receipt.destination), "Call the dentist tomorrow");
}

#[tokio::test]
async fn test_confirm_cannot_change_category() {
    let h = harness(MockGenerationBackend::new().then_classification("task", 0.4, buy_milk()));
    let owner = test_owner();
    let capture_id = new_capture(&h.store, owner, "Buy milk").await;
    h.pipeline.process_capture(owner, capture_id).await.unwrap();
    let entry = entry(&h, owner, capture_id).await;

    let err = h
        .resolver
        .resolve(
            owner,
            entry.id,
            ResolveRequest {
                mode: ResolutionMode::Confirm,
                category: Some(Category::Idea),
                fields: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
    assert_eq!(h.store.destination_count().unwrap(), 0);
}

#[tokio::test]
async fn test_resolution_rejects_invalid_fields() {
    let h = harness(MockGenerationBackend::new().then_classification("task", 0.4, buy_milk()));
    let owner = test_owner();
    let capture_id = new_capture(&h.store, owner, "Buy milk").await;
    h.pipeline.process_capture(owner, capture_id).await.unwrap();
    let entry = entry(&h, owner, capture_id).await;

    let err = h
        .resolver
        .resolve(
            owner,
            entry.id,
            ResolveRequest {
                mode: ResolutionMode::Override,
                category: Some(Category::Person),
                fields: Some(json!({"name": "  "})),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));

    let unchanged = ClassificationRepository::get(&h.store, owner, entry.id)
        .await
        .unwrap();
    assert_eq!(unchanged.status, ClassificationStatus::NeedsReview);
}

#[tokio::test]
async fn test_resolution_is_owner_scoped() {
    let h = harness(MockGenerationBackend::new().then_classification("task", 0.4, buy_milk()));
    let owner = test_owner();
    let capture_id = new_capture(&h.store, owner, "Buy milk").await;
    h.pipeline.process_capture(owner, capture_id).await.unwrap();
    let entry = entry(&h, owner, capture_id).await;

    let err = h
        .resolver
        .resolve(test_owner(), entry.id, confirm())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ClassificationNotFound(_)));
}

#[tokio::test]
async fn test_integrity_holds_across_mixed_operations() {
    let h = harness(
        MockGenerationBackend::new()
            .then_classification("task", 0.95, buy_milk())
            .then_classification("idea", 0.3, json!({"title": "Podcast"}))
            .then_classification(
                "project",
                0.9,
                json!({"name": "Website redesign", "status": "active", "next_action": "Draft sitemap"}),
            ),
    );
    let owner = test_owner();
    let mut ids = Vec::new();
    for text in ["Buy milk", "Podcast", "Website redesign"] {
        let capture_id = new_capture(&h.store, owner, text).await;
        h.pipeline.process_capture(owner, capture_id).await.unwrap();
        ids.push(entry(&h, owner, capture_id).await.id);
    }

    h.resolver.resolve(owner, ids[1], confirm()).await.unwrap();
    h.resolver
        .resolve(
            owner,
            ids[2],
            ResolveRequest {
                mode: ResolutionMode::Override,
                category: Some(Category::Person),
                fields: Some(json!({"name": "Sam", "context": "owns the redesign"})),
            },
        )
        .await
        .unwrap();
    h.resolver
        .resolve(
            owner,
            ids[0],
            ResolveRequest {
                mode: ResolutionMode::Override,
                category: Some(Category::Project),
                fields: None,
            },
        )
        .await
        .unwrap();

    assert_referential_integrity(&h.store);
    // task, idea, project, person, project
    assert_eq!(h.store.destination_count().unwrap(), 5);
}
