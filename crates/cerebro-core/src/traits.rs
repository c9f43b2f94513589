//! Core traits for cerebro abstractions.
//!
//! These traits define the interfaces that concrete implementations
//! must satisfy, enabling a PostgreSQL backend in production and an
//! in-memory backend in tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// CAPTURE STORE
// =============================================================================

/// Durable record of raw captures and their processing state.
#[async_trait]
pub trait CaptureRepository: Send + Sync {
    /// Insert a capture without scheduling classification.
    async fn insert(&self, req: CreateCaptureRequest) -> Result<Capture>;

    /// Insert a capture and its `classify_capture` job in one transaction.
    ///
    /// Returns only after both rows are durable.
    async fn insert_and_schedule(&self, req: CreateCaptureRequest) -> Result<ScheduledCapture>;

    /// Fetch a capture owned by `owner_id`.
    ///
    /// Returns `Error::CaptureNotFound` when it does not exist for that owner.
    async fn fetch(&self, owner_id: Uuid, id: Uuid) -> Result<Capture>;

    /// Unprocessed captures created before `older_than`, oldest first.
    async fn list_stale_unprocessed(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Capture>>;
}

// =============================================================================
// CLASSIFICATION LEDGER
// =============================================================================

/// Read side of the classification ledger.
///
/// Writes happen only through [`FilingStore`].
#[async_trait]
pub trait ClassificationRepository: Send + Sync {
    /// Returns `Error::ClassificationNotFound` for unknown or foreign ids.
    async fn get(&self, owner_id: Uuid, id: Uuid) -> Result<Classification>;

    /// The ledger entry for a capture, if one has been written.
    async fn get_by_capture(
        &self,
        owner_id: Uuid,
        capture_id: Uuid,
    ) -> Result<Option<Classification>>;

    /// Entries newest first, optionally restricted to one status.
    async fn list(
        &self,
        owner_id: Uuid,
        status: Option<ClassificationStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Classification>>;

    /// `needs_review` entries joined with their capture, newest first.
    async fn review_queue(
        &self,
        owner_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ReviewQueueItem>>;

    /// Audit rows for an entry, oldest first.
    async fn list_corrections(
        &self,
        owner_id: Uuid,
        classification_id: Uuid,
    ) -> Result<Vec<CorrectionRecord>>;
}

// =============================================================================
// DESTINATIONS AND PROFILES
// =============================================================================

#[async_trait]
pub trait DestinationRepository: Send + Sync {
    async fn fetch(
        &self,
        owner_id: Uuid,
        category: Category,
        id: Uuid,
    ) -> Result<Option<DestinationRecord>>;
}

/// Read accessor for per-owner settings.
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    /// Stored confidence threshold, `None` when the owner has no profile or
    /// never set one.
    async fn confidence_threshold(&self, owner_id: Uuid) -> Result<Option<f64>>;
}

// =============================================================================
// FILING STORE
// =============================================================================

/// Atomic multi-table writes for filing and resolution.
#[async_trait]
pub trait FilingStore: Send + Sync {
    /// Claim the capture and write the filing as one unit.
    ///
    /// The claim is a compare-and-swap on `processed`: if the capture was
    /// already processed nothing is written and `Ok(None)` is returned.
    /// Otherwise the destination (if any), the ledger entry and the capture
    /// update all commit together or not at all.
    async fn commit_filing(&self, filing: NewFiling) -> Result<Option<FilingReceipt>>;

    /// Apply a reviewer resolution and append its audit row as one unit.
    ///
    /// Fails with `Error::Conflict` when the entry's destination no longer
    /// matches `plan.expected_destination_id`.
    async fn commit_resolution(&self, plan: ResolutionPlan) -> Result<ResolutionReceipt>;
}

// =============================================================================
// JOB QUEUE
// =============================================================================

#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Queue a new job.
    async fn queue(
        &self,
        capture_id: Option<Uuid>,
        owner_id: Option<Uuid>,
        job_type: JobType,
        priority: i32,
        payload: Option<JsonValue>,
    ) -> Result<Uuid>;

    /// Queue a job unless one of the same type is already pending or running
    /// for the capture. Returns `None` when deduplicated.
    async fn queue_deduplicated(
        &self,
        capture_id: Uuid,
        owner_id: Uuid,
        job_type: JobType,
        priority: i32,
    ) -> Result<Option<Uuid>>;

    /// Claim the highest-priority pending job of one of the given types.
    async fn claim_next_for_types(&self, job_types: &[JobType]) -> Result<Option<Job>>;

    async fn complete(&self, job_id: Uuid, result: Option<JsonValue>) -> Result<()>;

    /// Record a failure; the job returns to `pending` until it runs out of retries.
    async fn fail(&self, job_id: Uuid, error: &str) -> Result<()>;

    /// Reset `running` jobs that started before `started_before`.
    ///
    /// Each one is treated as a failed attempt: it goes back to `pending`
    /// with its retry count bumped, or to `failed` once retries run out.
    /// Returns how many jobs were reset.
    async fn requeue_abandoned(&self, started_before: DateTime<Utc>) -> Result<u64>;

    async fn get(&self, job_id: Uuid) -> Result<Option<Job>>;

    async fn pending_count(&self) -> Result<i64>;
}

// =============================================================================
// INFERENCE
// =============================================================================

/// Sampling parameters for one generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    /// Constrain the response to a single JSON object.
    pub json_response: bool,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            max_tokens: Some(crate::defaults::LLM_MAX_TOKENS),
            json_response: true,
        }
    }
}

/// Backend for chat-style text generation.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Generate a response from a system message and a user message.
    ///
    /// Transient provider failures surface as `Error::ProviderUnavailable`.
    async fn generate_with_system(
        &self,
        system: &str,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String>;

    /// Model identifier sent with each request.
    fn model_name(&self) -> &str;
}

/// Turns capture text into a classification.
///
/// Failures are values, not errors: every outcome can be recorded.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(
        &self,
        raw_text: &str,
    ) -> std::result::Result<ClassificationResult, ClassificationError>;
}
