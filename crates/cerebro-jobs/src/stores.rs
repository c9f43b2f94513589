//! Storage handles shared by the pipeline, the handlers and the workers.

use std::sync::Arc;

use tokio::sync::Notify;

use cerebro_core::{
    CaptureRepository, ClassificationRepository, DestinationRepository, FilingStore,
    JobRepository, ProfileRepository,
};
use cerebro_db::Database;

/// Trait-object view of the storage layer.
#[derive(Clone)]
pub struct Stores {
    pub captures: Arc<dyn CaptureRepository>,
    pub classifications: Arc<dyn ClassificationRepository>,
    pub destinations: Arc<dyn DestinationRepository>,
    pub profiles: Arc<dyn ProfileRepository>,
    pub filing: Arc<dyn FilingStore>,
    pub jobs: Arc<dyn JobRepository>,
    /// Woken whenever a job is queued, so idle workers need not wait a poll.
    pub job_notify: Option<Arc<Notify>>,
}

impl Stores {
    /// Handles backed by PostgreSQL.
    pub fn from_database(db: &Database) -> Self {
        Self {
            captures: db.captures.clone(),
            classifications: db.classifications.clone(),
            destinations: db.destinations.clone(),
            profiles: db.profiles.clone(),
            filing: db.filing.clone(),
            jobs: db.jobs.clone(),
            job_notify: Some(db.jobs.job_notify()),
        }
    }

    /// Handles backed by one store implementing every repository.
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: CaptureRepository
            + ClassificationRepository
            + DestinationRepository
            + ProfileRepository
            + FilingStore
            + JobRepository
            + 'static,
    {
        Self {
            captures: store.clone(),
            classifications: store.clone(),
            destinations: store.clone(),
            profiles: store.clone(),
            filing: store.clone(),
            jobs: store,
            job_notify: None,
        }
    }

    pub fn with_job_notify(mut self, notify: Arc<Notify>) -> Self {
        self.job_notify = Some(notify);
        self
    }
}
