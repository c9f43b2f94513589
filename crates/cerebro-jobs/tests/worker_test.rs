//! Integration tests for background processing.
//!
//! This test suite validates:
//! - A scheduled capture is classified and filed by the job worker
//! - Storage failures surface as job retries, not lost captures
//! - The stale-capture sweeper re-queues lost captures without duplicating
//!   active jobs
//! - Jobs left `running` by a dead worker are reclaimed and finished

use std::sync::Arc;
use std::time::Duration;

use cerebro_core::{
    CaptureRepository, Category, ClassificationStatus, JobRepository, JobStatus, JobType,
};
use cerebro_db::test_fixtures::{capture_request, test_owner};
use cerebro_db::MemoryStore;
use cerebro_inference::mock::classification_json;
use cerebro_inference::{LlmClassifier, MockGenerationBackend, MockReply, RetryPolicy};
use cerebro_jobs::{
    ClassificationPipeline, ClassifyCaptureHandler, PipelineConfig, StaleCaptureSweeper, Stores,
    SweepConfig, WorkerBuilder, WorkerConfig, WorkerEvent,
};
use chrono::Utc;
use serde_json::json;
use tokio::sync::broadcast;
use uuid::Uuid;

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn stores(store: &MemoryStore) -> Stores {
    Stores::shared(Arc::new(store.clone())).with_job_notify(store.job_notify())
}

fn pipeline(stores: &Stores, backend: MockGenerationBackend) -> Arc<ClassificationPipeline> {
    let policy = RetryPolicy {
        max_retries: 0,
        initial_backoff: Duration::from_millis(1),
        attempt_timeout: Duration::from_secs(5),
    };
    let classifier = LlmClassifier::with_policy(Arc::new(backend), policy);
    let config = PipelineConfig {
        commit_attempts: 1,
        ..PipelineConfig::default()
    };
    Arc::new(ClassificationPipeline::new(
        stores.clone(),
        Arc::new(classifier),
        config,
    ))
}

/// Wait for the next completed or failed job event for `job_id`.
async fn wait_for_job(rx: &mut broadcast::Receiver<WorkerEvent>, job_id: Uuid) -> WorkerEvent {
    let wait = async {
        loop {
            let event = rx.recv().await.expect("event channel closed");
            let id = match &event {
                WorkerEvent::JobCompleted { job_id, .. } | WorkerEvent::JobFailed { job_id, .. } => {
                    *job_id
                }
                _ => continue,
            };
            if id == job_id {
                return event;
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), wait)
        .await
        .expect("Timed out waiting for job event")
}

// ============================================================================
// WORKER
// ============================================================================

#[tokio::test]
async fn test_worker_files_scheduled_capture() {
    let store = MemoryStore::new();
    let stores = stores(&store);
    let backend = MockGenerationBackend::new().then_classification(
        "task",
        0.95,
        json!({"name": "Buy milk", "due_date": null, "notes": ""}),
    );

    let worker = WorkerBuilder::from_stores(&stores)
        .with_config(WorkerConfig::default().with_poll_interval(20))
        .with_handler(ClassifyCaptureHandler::new(pipeline(&stores, backend)))
        .build()
        .await;
    let handle = worker.start();
    let mut events = handle.events();

    let owner = test_owner();
    let scheduled = CaptureRepository::insert_and_schedule(&store, capture_request(owner, "Buy milk"))
        .await
        .unwrap();

    let event = wait_for_job(&mut events, scheduled.job_id).await;
    assert!(matches!(event, WorkerEvent::JobCompleted { .. }), "got {:?}", event);

    let job = JobRepository::get(&store, scheduled.job_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    let result = job.result.expect("job result recorded");
    assert_eq!(result["status"], "auto_filed");
    assert_eq!(result["newly_filed"], true);

    assert!(store.capture(scheduled.capture.id).unwrap().unwrap().processed);
    assert_eq!(store.destinations(Category::Task).unwrap().len(), 1);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_worker_retries_job_after_storage_failure() {
    let store = MemoryStore::new();
    let stores = stores(&store);
    let backend = MockGenerationBackend::new().with_fallback(MockReply::Content(
        classification_json("idea", 0.9, json!({"title": "Podcast about tools"})),
    ));

    let owner = test_owner();
    let scheduled = CaptureRepository::insert_and_schedule(
        &store,
        capture_request(owner, "Podcast about tools"),
    )
    .await
    .unwrap();
    store.fail_next_commits(1).unwrap();

    let worker = WorkerBuilder::from_stores(&stores)
        .with_config(WorkerConfig::default().with_poll_interval(20))
        .with_handler(ClassifyCaptureHandler::new(pipeline(&stores, backend)))
        .build()
        .await;
    let handle = worker.start();
    let mut events = handle.events();

    // First run fails in storage and the job goes back to pending.
    let first = wait_for_job(&mut events, scheduled.job_id).await;
    assert!(matches!(first, WorkerEvent::JobFailed { .. }), "got {:?}", first);

    let second = wait_for_job(&mut events, scheduled.job_id).await;
    assert!(matches!(second, WorkerEvent::JobCompleted { .. }), "got {:?}", second);

    let job = JobRepository::get(&store, scheduled.job_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(job.retry_count, 1);
    assert_eq!(store.destinations(Category::Idea).unwrap().len(), 1);
    let entries = store.classifications().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].status, ClassificationStatus::AutoFiled);

    handle.shutdown().await.unwrap();
}

// ============================================================================
// SWEEPER
// ============================================================================

fn sweep_config() -> SweepConfig {
    SweepConfig {
        enabled: true,
        interval: Duration::from_millis(20),
        grace: Duration::from_secs(300),
        batch: 10,
        abandon_after: Duration::from_secs(360),
    }
}

#[tokio::test]
async fn test_sweep_requeues_only_stale_captures() {
    let store = MemoryStore::new();
    let sweeper = StaleCaptureSweeper::new(&stores(&store), sweep_config());
    let owner = test_owner();

    // Lost: inserted without a job, ten minutes ago.
    let lost = CaptureRepository::insert(&store, capture_request(owner, "Call mom"))
        .await
        .unwrap();
    store
        .backdate_capture(lost.id, Utc::now() - chrono::Duration::minutes(10))
        .unwrap();
    // Fresh: still inside the grace period.
    CaptureRepository::insert(&store, capture_request(owner, "Buy milk"))
        .await
        .unwrap();

    let report = sweeper.sweep_once().await.unwrap();
    assert_eq!(report.scanned, 1);
    assert_eq!(report.requeued, 1);

    let jobs = store.jobs().unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].capture_id, Some(lost.id));
    assert_eq!(jobs[0].owner_id, Some(owner));
    assert_eq!(jobs[0].job_type, JobType::ClassifyCapture);

    // The pending job deduplicates the next sweep.
    let again = sweeper.sweep_once().await.unwrap();
    assert_eq!(again.scanned, 1);
    assert_eq!(again.requeued, 0);
    assert_eq!(store.jobs().unwrap().len(), 1);
}

#[tokio::test]
async fn test_sweep_ignores_processed_captures() {
    let store = MemoryStore::new();
    let stores = stores(&store);
    let owner = test_owner();
    let capture = CaptureRepository::insert(&store, capture_request(owner, "Buy milk"))
        .await
        .unwrap();
    pipeline(&stores, MockGenerationBackend::new())
        .process_capture(owner, capture.id)
        .await
        .unwrap();
    store
        .backdate_capture(capture.id, Utc::now() - chrono::Duration::hours(1))
        .unwrap();

    let report = StaleCaptureSweeper::new(&stores, sweep_config())
        .sweep_once()
        .await
        .unwrap();
    assert_eq!(report.scanned, 0);
    assert!(store.jobs().unwrap().is_empty());
}

#[tokio::test]
async fn test_sweep_reclaims_job_abandoned_in_running_state() {
    let store = MemoryStore::new();
    let stores = stores(&store);
    let owner = test_owner();
    let scheduled = CaptureRepository::insert_and_schedule(&store, capture_request(owner, "Buy milk"))
        .await
        .unwrap();

    // A worker claims the job and dies without completing or failing it.
    let claimed = store
        .claim_next_for_types(&[JobType::ClassifyCapture])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(claimed.id, scheduled.job_id);
    store
        .backdate_capture(scheduled.capture.id, Utc::now() - chrono::Duration::hours(6))
        .unwrap();

    // Recently started: could still be a slow live worker, so hands off.
    let sweeper = StaleCaptureSweeper::new(&stores, sweep_config());
    let report = sweeper.sweep_once().await.unwrap();
    assert_eq!(report.reclaimed, 0);
    assert_eq!(report.requeued, 0);
    let job = JobRepository::get(&store, scheduled.job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Running);

    // Running far past the job timeout: the worker is gone.
    store
        .backdate_job_start(scheduled.job_id, Utc::now() - chrono::Duration::hours(1))
        .unwrap();
    let report = sweeper.sweep_once().await.unwrap();
    assert_eq!(report.reclaimed, 1);
    assert_eq!(report.scanned, 1);
    // The reclaimed job is the live one again; no duplicate is queued.
    assert_eq!(report.requeued, 0);
    let job = JobRepository::get(&store, scheduled.job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.retry_count, 1);
    assert_eq!(store.jobs().unwrap().len(), 1);

    let backend = MockGenerationBackend::new().then_classification(
        "task",
        0.95,
        json!({"name": "Buy milk"}),
    );
    let worker = WorkerBuilder::from_stores(&stores)
        .with_config(WorkerConfig::default().with_poll_interval(20))
        .with_handler(ClassifyCaptureHandler::new(pipeline(&stores, backend)))
        .build()
        .await;
    let worker = worker.start();

    let processed = async {
        loop {
            if store.capture(scheduled.capture.id).unwrap().unwrap().processed {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(5), processed)
        .await
        .expect("abandoned capture was never filed");

    assert_eq!(store.destinations(Category::Task).unwrap().len(), 1);
    worker.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_started_sweeper_recovers_lost_capture_end_to_end() {
    let store = MemoryStore::new();
    let stores = stores(&store);
    let owner = test_owner();
    let lost = CaptureRepository::insert(&store, capture_request(owner, "Buy milk"))
        .await
        .unwrap();
    store
        .backdate_capture(lost.id, Utc::now() - chrono::Duration::minutes(30))
        .unwrap();

    let backend = MockGenerationBackend::new().then_classification(
        "task",
        0.95,
        json!({"name": "Buy milk"}),
    );
    let worker = WorkerBuilder::from_stores(&stores)
        .with_config(WorkerConfig::default().with_poll_interval(20))
        .with_handler(ClassifyCaptureHandler::new(pipeline(&stores, backend)))
        .build()
        .await;
    let worker = worker.start();
    let sweeper = StaleCaptureSweeper::new(&stores, sweep_config()).start();

    let processed = async {
        loop {
            if store.capture(lost.id).unwrap().unwrap().processed {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(5), processed)
        .await
        .expect("sweeper and worker did not recover the capture");

    assert_eq!(store.destinations(Category::Task).unwrap().len(), 1);
    sweeper.shutdown().await.unwrap();
    worker.shutdown().await.unwrap();
}
