//! In-memory implementation of every repository trait.
//!
//! `MemoryStore` mirrors the PostgreSQL semantics that the pipeline relies
//! on: the capture claim is a compare-and-swap under one lock, and a commit
//! either applies all of its writes or none of them. It also exposes fault
//! injection so tests can exercise storage failures.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::jobs::ABANDONED_MESSAGE;

use cerebro_core::{
    defaults, new_v7, Capture, CaptureRepository, Category, Classification,
    ClassificationRepository, ClassificationStatus, CorrectionRecord, CreateCaptureRequest,
    DestinationRecord, DestinationRepository, Error, FilingReceipt, FilingStore, Job,
    JobRepository, JobStatus, JobType, NewFiling, ProfileRepository, ResolutionAction,
    ResolutionPlan, ResolutionReceipt, Result, ReviewQueueItem, ScheduledCapture,
};

#[derive(Default)]
struct MemoryState {
    captures: HashMap<Uuid, Capture>,
    classifications: HashMap<Uuid, Classification>,
    destinations: HashMap<Uuid, DestinationRecord>,
    corrections: Vec<CorrectionRecord>,
    jobs: HashMap<Uuid, Job>,
    thresholds: HashMap<Uuid, f64>,
    failing_commits: u32,
    commit_delay: Option<Duration>,
}

impl MemoryState {
    fn new_capture(&mut self, req: &CreateCaptureRequest) -> Capture {
        let capture = Capture {
            id: new_v7(),
            owner_id: req.owner_id,
            raw_text: req.raw_text.clone(),
            source: req.source,
            audio_url: req.audio_url.clone(),
            processed: false,
            processing_error: None,
            created_at: Utc::now(),
        };
        self.captures.insert(capture.id, capture.clone());
        capture
    }

    fn new_job(
        &mut self,
        capture_id: Option<Uuid>,
        owner_id: Option<Uuid>,
        job_type: JobType,
        priority: i32,
        payload: Option<JsonValue>,
    ) -> Uuid {
        let job = Job {
            id: new_v7(),
            capture_id,
            owner_id,
            job_type,
            status: JobStatus::Pending,
            priority,
            payload,
            result: None,
            error_message: None,
            retry_count: 0,
            max_retries: defaults::JOB_MAX_RETRIES,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        };
        let id = job.id;
        self.jobs.insert(id, job);
        id
    }

    /// Consume one injected failure, if any are armed.
    fn take_fault(&mut self, op: &str) -> Result<()> {
        if self.failing_commits > 0 {
            self.failing_commits -= 1;
            return Err(Error::Database(sqlx::Error::Protocol(format!(
                "injected failure during {}",
                op
            ))));
        }
        Ok(())
    }
}

/// In-memory store shared by cloning.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    notify: Arc<Notify>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| Error::Internal("memory store lock poisoned".into()))
    }

    /// Handle woken whenever a job is queued.
    pub fn job_notify(&self) -> Arc<Notify> {
        self.notify.clone()
    }

    // -------------------------------------------------------------------------
    // Test controls
    // -------------------------------------------------------------------------

    /// Store a confidence threshold for `owner_id`.
    pub fn set_threshold(&self, owner_id: Uuid, threshold: f64) -> Result<()> {
        self.lock()?.thresholds.insert(owner_id, threshold);
        Ok(())
    }

    /// Make the next `n` filing or resolution commits fail after their
    /// writes were staged, so that nothing from them is applied.
    pub fn fail_next_commits(&self, n: u32) -> Result<()> {
        self.lock()?.failing_commits = n;
        Ok(())
    }

    /// Delay every commit by `delay` before it takes the lock.
    pub fn set_commit_delay(&self, delay: Option<Duration>) -> Result<()> {
        self.lock()?.commit_delay = delay;
        Ok(())
    }

    /// Move a capture's creation time, e.g. to make it stale for the sweeper.
    pub fn backdate_capture(&self, capture_id: Uuid, created_at: DateTime<Utc>) -> Result<()> {
        let mut state = self.lock()?;
        let capture = state
            .captures
            .get_mut(&capture_id)
            .ok_or(Error::CaptureNotFound(capture_id))?;
        capture.created_at = created_at;
        Ok(())
    }

    /// Pretend a running job was claimed at `started_at`.
    pub fn backdate_job_start(&self, job_id: Uuid, started_at: DateTime<Utc>) -> Result<()> {
        let mut state = self.lock()?;
        let job = state
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| Error::NotFound(format!("job {}", job_id)))?;
        job.started_at = Some(started_at);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Inspection
    // -------------------------------------------------------------------------

    pub fn capture(&self, capture_id: Uuid) -> Result<Option<Capture>> {
        Ok(self.lock()?.captures.get(&capture_id).cloned())
    }

    /// Every destination record of `category`, any owner.
    pub fn destinations(&self, category: Category) -> Result<Vec<DestinationRecord>> {
        let state = self.lock()?;
        let mut records: Vec<_> = state
            .destinations
            .values()
            .filter(|d| d.category() == category)
            .cloned()
            .collect();
        records.sort_by_key(|d| d.id());
        Ok(records)
    }

    pub fn destination_count(&self) -> Result<usize> {
        Ok(self.lock()?.destinations.len())
    }

    /// Every ledger entry, any owner, oldest first.
    pub fn classifications(&self) -> Result<Vec<Classification>> {
        let state = self.lock()?;
        let mut entries: Vec<_> = state.classifications.values().cloned().collect();
        entries.sort_by_key(|c| (c.created_at, c.id));
        Ok(entries)
    }

    pub fn jobs(&self) -> Result<Vec<Job>> {
        let state = self.lock()?;
        let mut jobs: Vec<_> = state.jobs.values().cloned().collect();
        jobs.sort_by_key(|j| (j.created_at, j.id));
        Ok(jobs)
    }

    async fn commit_pause(&self) -> Result<()> {
        let delay = self.lock()?.commit_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }
}

#[async_trait]
impl CaptureRepository for MemoryStore {
    async fn insert(&self, req: CreateCaptureRequest) -> Result<Capture> {
        req.validate()?;
        Ok(self.lock()?.new_capture(&req))
    }

    async fn insert_and_schedule(&self, req: CreateCaptureRequest) -> Result<ScheduledCapture> {
        req.validate()?;
        let scheduled = {
            let mut state = self.lock()?;
            let capture = state.new_capture(&req);
            let job_type = JobType::ClassifyCapture;
            let job_id = state.new_job(
                Some(capture.id),
                Some(capture.owner_id),
                job_type,
                job_type.default_priority(),
                None,
            );
            ScheduledCapture { capture, job_id }
        };
        self.notify.notify_waiters();
        Ok(scheduled)
    }

    async fn fetch(&self, owner_id: Uuid, id: Uuid) -> Result<Capture> {
        self.lock()?
            .captures
            .get(&id)
            .filter(|c| c.owner_id == owner_id)
            .cloned()
            .ok_or(Error::CaptureNotFound(id))
    }

    async fn list_stale_unprocessed(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Capture>> {
        let state = self.lock()?;
        let mut stale: Vec<_> = state
            .captures
            .values()
            .filter(|c| !c.processed && c.created_at < older_than)
            .cloned()
            .collect();
        stale.sort_by_key(|c| (c.created_at, c.id));
        stale.truncate(limit.max(0) as usize);
        Ok(stale)
    }
}

fn page<T>(items: Vec<T>, limit: i64, offset: i64) -> Vec<T> {
    items
        .into_iter()
        .skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .collect()
}

#[async_trait]
impl ClassificationRepository for MemoryStore {
    async fn get(&self, owner_id: Uuid, id: Uuid) -> Result<Classification> {
        self.lock()?
            .classifications
            .get(&id)
            .filter(|c| c.owner_id == owner_id)
            .cloned()
            .ok_or(Error::ClassificationNotFound(id))
    }

    async fn get_by_capture(
        &self,
        owner_id: Uuid,
        capture_id: Uuid,
    ) -> Result<Option<Classification>> {
        Ok(self
            .lock()?
            .classifications
            .values()
            .find(|c| c.capture_id == capture_id && c.owner_id == owner_id)
            .cloned())
    }

    async fn list(
        &self,
        owner_id: Uuid,
        status: Option<ClassificationStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Classification>> {
        let state = self.lock()?;
        let mut entries: Vec<_> = state
            .classifications
            .values()
            .filter(|c| c.owner_id == owner_id && status.map_or(true, |s| c.status == s))
            .cloned()
            .collect();
        entries.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(page(entries, limit, offset))
    }

    async fn review_queue(
        &self,
        owner_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ReviewQueueItem>> {
        let state = self.lock()?;
        let mut items: Vec<_> = state
            .classifications
            .values()
            .filter(|c| c.owner_id == owner_id && c.status == ClassificationStatus::NeedsReview)
            .filter_map(|c| {
                state.captures.get(&c.capture_id).map(|capture| ReviewQueueItem {
                    classification: c.clone(),
                    raw_text: capture.raw_text.clone(),
                    source: capture.source,
                    capture_created_at: capture.created_at,
                })
            })
            .collect();
        items.sort_by(|a, b| {
            (b.classification.created_at, b.classification.id)
                .cmp(&(a.classification.created_at, a.classification.id))
        });
        Ok(page(items, limit, offset))
    }

    async fn list_corrections(
        &self,
        owner_id: Uuid,
        classification_id: Uuid,
    ) -> Result<Vec<CorrectionRecord>> {
        Ok(self
            .lock()?
            .corrections
            .iter()
            .filter(|c| c.classification_id == classification_id && c.owner_id == owner_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl DestinationRepository for MemoryStore {
    async fn fetch(
        &self,
        owner_id: Uuid,
        category: Category,
        id: Uuid,
    ) -> Result<Option<DestinationRecord>> {
        Ok(self
            .lock()?
            .destinations
            .get(&id)
            .filter(|d| d.owner_id() == owner_id && d.category() == category)
            .cloned())
    }
}

#[async_trait]
impl ProfileRepository for MemoryStore {
    async fn confidence_threshold(&self, owner_id: Uuid) -> Result<Option<f64>> {
        Ok(self.lock()?.thresholds.get(&owner_id).copied())
    }
}

#[async_trait]
impl FilingStore for MemoryStore {
    async fn commit_filing(&self, filing: NewFiling) -> Result<Option<FilingReceipt>> {
        self.commit_pause().await?;
        let mut state = self.lock()?;

        // Compare-and-swap on `processed`, decided under the same lock that
        // applies the writes.
        let claimable = state
            .captures
            .get(&filing.capture_id)
            .is_some_and(|c| c.owner_id == filing.owner_id && !c.processed);
        if !claimable {
            return Ok(None);
        }

        state.take_fault("commit_filing")?;

        let now = Utc::now();
        let classification = Classification {
            id: new_v7(),
            capture_id: filing.capture_id,
            owner_id: filing.owner_id,
            category: filing.category,
            confidence: filing.confidence,
            extracted_fields: filing.extracted_fields,
            raw_llm_response: filing.raw_llm_response,
            model: filing.model,
            destination_id: filing.destination.as_ref().map(|d| d.id()),
            status: filing.status,
            created_at: now,
            updated_at: now,
            resolved_at: None,
        };

        if let Some(destination) = &filing.destination {
            state.destinations.insert(destination.id(), destination.clone());
        }
        state
            .classifications
            .insert(classification.id, classification.clone());
        if let Some(capture) = state.captures.get_mut(&filing.capture_id) {
            capture.processed = true;
            capture.processing_error = filing.processing_error;
        }

        Ok(Some(FilingReceipt {
            classification,
            destination: filing.destination,
        }))
    }

    async fn commit_resolution(&self, plan: ResolutionPlan) -> Result<ResolutionReceipt> {
        self.commit_pause().await?;
        let mut state = self.lock()?;

        let previous = state
            .classifications
            .get(&plan.classification_id)
            .filter(|c| c.owner_id == plan.owner_id)
            .cloned()
            .ok_or(Error::ClassificationNotFound(plan.classification_id))?;

        if previous.destination_id != plan.expected_destination_id {
            return Err(Error::Conflict(format!(
                "classification {} was resolved concurrently",
                plan.classification_id
            )));
        }

        // Stage every write before touching state.
        let now = Utc::now();
        let destination = match plan.action {
            ResolutionAction::Create(record) => record,
            ResolutionAction::Update {
                destination_id,
                fields,
            } => {
                let mut record = state
                    .destinations
                    .get(&destination_id)
                    .filter(|d| d.owner_id() == plan.owner_id && d.category() == plan.category)
                    .cloned()
                    .ok_or_else(|| {
                        Error::NotFound(format!("{} {}", plan.category, destination_id))
                    })?;
                record.apply_fields(&fields, now)?;
                record
            }
        };

        let mut classification = previous.clone();
        classification.category = plan.category;
        classification.extracted_fields = plan.extracted_fields;
        classification.destination_id = Some(destination.id());
        classification.status = plan.status;
        classification.updated_at = now;
        classification.resolved_at = Some(now);

        let correction = CorrectionRecord {
            id: new_v7(),
            classification_id: previous.id,
            owner_id: previous.owner_id,
            mode: plan.mode,
            previous_category: previous.category,
            previous_extracted_fields: previous.extracted_fields,
            previous_destination_id: previous.destination_id,
            new_category: classification.category,
            new_extracted_fields: classification.extracted_fields.clone(),
            new_destination_id: destination.id(),
            created_at: now,
        };

        state.take_fault("commit_resolution")?;

        state
            .destinations
            .insert(destination.id(), destination.clone());
        state
            .classifications
            .insert(classification.id, classification.clone());
        state.corrections.push(correction.clone());

        Ok(ResolutionReceipt {
            classification,
            destination,
            correction,
        })
    }
}

#[async_trait]
impl JobRepository for MemoryStore {
    async fn queue(
        &self,
        capture_id: Option<Uuid>,
        owner_id: Option<Uuid>,
        job_type: JobType,
        priority: i32,
        payload: Option<JsonValue>,
    ) -> Result<Uuid> {
        let id = self
            .lock()?
            .new_job(capture_id, owner_id, job_type, priority, payload);
        self.notify.notify_waiters();
        Ok(id)
    }

    async fn queue_deduplicated(
        &self,
        capture_id: Uuid,
        owner_id: Uuid,
        job_type: JobType,
        priority: i32,
    ) -> Result<Option<Uuid>> {
        let queued = {
            let mut state = self.lock()?;
            let active = state.jobs.values().any(|j| {
                j.capture_id == Some(capture_id)
                    && j.job_type == job_type
                    && matches!(j.status, JobStatus::Pending | JobStatus::Running)
            });
            if active {
                None
            } else {
                Some(state.new_job(Some(capture_id), Some(owner_id), job_type, priority, None))
            }
        };
        if queued.is_some() {
            self.notify.notify_waiters();
        }
        Ok(queued)
    }

    async fn claim_next_for_types(&self, job_types: &[JobType]) -> Result<Option<Job>> {
        let mut state = self.lock()?;
        let next = state
            .jobs
            .values()
            .filter(|j| {
                j.status == JobStatus::Pending
                    && (job_types.is_empty() || job_types.contains(&j.job_type))
            })
            .min_by_key(|j| (std::cmp::Reverse(j.priority), j.created_at, j.id))
            .map(|j| j.id);

        Ok(next.and_then(|id| {
            state.jobs.get_mut(&id).map(|job| {
                job.status = JobStatus::Running;
                job.started_at = Some(Utc::now());
                job.clone()
            })
        }))
    }

    async fn complete(&self, job_id: Uuid, result: Option<JsonValue>) -> Result<()> {
        let mut state = self.lock()?;
        let job = state
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| Error::NotFound(format!("job {}", job_id)))?;
        job.status = JobStatus::Completed;
        job.completed_at = Some(Utc::now());
        job.result = result;
        Ok(())
    }

    async fn fail(&self, job_id: Uuid, error: &str) -> Result<()> {
        let mut state = self.lock()?;
        let job = state
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| Error::NotFound(format!("job {}", job_id)))?;
        job.error_message = Some(error.to_string());
        if job.retry_count < job.max_retries {
            job.retry_count += 1;
            job.status = JobStatus::Pending;
            job.started_at = None;
        } else {
            job.status = JobStatus::Failed;
            job.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn requeue_abandoned(&self, started_before: DateTime<Utc>) -> Result<u64> {
        let reset = {
            let mut state = self.lock()?;
            let now = Utc::now();
            let mut reset = 0;
            for job in state.jobs.values_mut().filter(|j| {
                j.status == JobStatus::Running && j.started_at.is_some_and(|t| t < started_before)
            }) {
                job.error_message = Some(ABANDONED_MESSAGE.to_string());
                if job.retry_count < job.max_retries {
                    job.retry_count += 1;
                    job.status = JobStatus::Pending;
                    job.started_at = None;
                } else {
                    job.status = JobStatus::Failed;
                    job.completed_at = Some(now);
                }
                reset += 1;
            }
            reset
        };
        if reset > 0 {
            self.notify.notify_waiters();
        }
        Ok(reset)
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<Job>> {
        Ok(self.lock()?.jobs.get(&job_id).cloned())
    }

    async fn pending_count(&self) -> Result<i64> {
        Ok(self
            .lock()?
            .jobs
            .values()
            .filter(|j| j.status == JobStatus::Pending)
            .count() as i64)
    }
}
