//! Job handlers for each job type.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use tracing::{instrument, warn};
use uuid::Uuid;

use cerebro_core::{Error, Job, JobType};

use crate::pipeline::ClassificationPipeline;

/// Context provided to job handlers.
pub struct JobContext {
    /// The job being processed.
    pub job: Job,
}

impl JobContext {
    pub fn new(job: Job) -> Self {
        Self { job }
    }

    pub fn capture_id(&self) -> Option<Uuid> {
        self.job.capture_id
    }

    pub fn owner_id(&self) -> Option<Uuid> {
        self.job.owner_id
    }

    pub fn payload(&self) -> Option<&JsonValue> {
        self.job.payload.as_ref()
    }
}

/// Result of job execution.
#[derive(Debug)]
pub enum JobResult {
    /// Job completed successfully with optional result data.
    Success(Option<JsonValue>),
    /// Job failed and retrying will not help.
    Failed(String),
    /// Job hit a transient failure and should run again.
    Retry(String),
}

/// Trait for job handlers.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// The job type this handler processes.
    fn job_type(&self) -> JobType;

    /// Execute the job.
    async fn execute(&self, ctx: JobContext) -> JobResult;

    /// Check if this handler can process the given job type.
    fn can_handle(&self, job_type: JobType) -> bool {
        self.job_type() == job_type
    }
}

/// Runs the classification pipeline for the job's capture.
pub struct ClassifyCaptureHandler {
    pipeline: Arc<ClassificationPipeline>,
}

impl ClassifyCaptureHandler {
    pub fn new(pipeline: Arc<ClassificationPipeline>) -> Self {
        Self { pipeline }
    }
}

#[async_trait]
impl JobHandler for ClassifyCaptureHandler {
    fn job_type(&self) -> JobType {
        JobType::ClassifyCapture
    }

    #[instrument(
        skip(self, ctx),
        fields(
            subsystem = "jobs",
            component = "classify_handler",
            op = "execute",
            job_id = %ctx.job.id
        )
    )]
    async fn execute(&self, ctx: JobContext) -> JobResult {
        let (Some(owner_id), Some(capture_id)) = (ctx.owner_id(), ctx.capture_id()) else {
            return JobResult::Failed("classify_capture job is missing capture_id or owner_id".into());
        };

        match self.pipeline.process_capture(owner_id, capture_id).await {
            Ok(outcome) => {
                let entry = outcome.classification.as_ref();
                JobResult::Success(Some(json!({
                    "capture_id": capture_id,
                    "classification_id": entry.map(|c| c.id),
                    "category": entry.map(|c| c.category.as_str()),
                    "status": entry.map(|c| c.status.as_str()),
                    "destination_id": entry.and_then(|c| c.destination_id),
                    "newly_filed": outcome.newly_filed,
                })))
            }
            Err(e @ Error::CaptureNotFound(_)) => JobResult::Failed(e.to_string()),
            Err(e) => {
                warn!(
                    capture_id = %capture_id,
                    error = %e,
                    storage_failure = e.is_storage_failure(),
                    "Pipeline run failed; job will retry"
                );
                JobResult::Retry(e.to_string())
            }
        }
    }
}

/// No-op handler for testing.
pub struct NoOpHandler {
    job_type: JobType,
}

impl NoOpHandler {
    pub fn new(job_type: JobType) -> Self {
        Self { job_type }
    }
}

#[async_trait]
impl JobHandler for NoOpHandler {
    fn job_type(&self) -> JobType {
        self.job_type
    }

    async fn execute(&self, _ctx: JobContext) -> JobResult {
        JobResult::Success(None)
    }
}
