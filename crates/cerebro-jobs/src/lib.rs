//! # cerebro-jobs
//!
//! Classification pipeline and background processing for cerebro.
//!
//! This crate provides:
//! - The [`ClassificationPipeline`]: classify, gate and file one capture
//! - The [`FilingEngine`] that turns an outcome into one atomic filing
//! - Reviewer resolution through the [`ReclassificationHandler`]
//! - A priority job worker running [`ClassifyCaptureHandler`]
//! - The [`StaleCaptureSweeper`] that re-queues captures whose job was lost
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use cerebro_db::Database;
//! use cerebro_inference::{LlmClassifier, OpenAIBackend};
//! use cerebro_jobs::{
//!     ClassificationPipeline, ClassifyCaptureHandler, PipelineConfig, Stores, WorkerBuilder,
//!     WorkerConfig,
//! };
//!
//! let db = Database::connect("postgres://...").await?;
//! let stores = Stores::from_database(&db);
//! let classifier = LlmClassifier::new(Arc::new(OpenAIBackend::from_env()?));
//! let pipeline = ClassificationPipeline::new(stores.clone(), Arc::new(classifier), PipelineConfig::from_env());
//!
//! let worker = WorkerBuilder::from_stores(&stores)
//!     .with_config(WorkerConfig::from_env())
//!     .with_handler(ClassifyCaptureHandler::new(Arc::new(pipeline)))
//!     .build()
//!     .await;
//! let handle = worker.start();
//!
//! // Graceful shutdown
//! handle.shutdown().await?;
//! ```

pub mod filing;
pub mod handler;
pub mod pipeline;
pub mod reclassify;
pub mod stores;
pub mod sweep;
pub mod worker;

use std::future::Future;
use std::time::Duration;

// Re-export core types
pub use cerebro_core::*;

pub use filing::{FilingEngine, FALLBACK_CATEGORY};
pub use handler::{ClassifyCaptureHandler, JobContext, JobHandler, JobResult, NoOpHandler};
pub use pipeline::{ClassificationPipeline, PipelineConfig, PipelineOutcome};
pub use reclassify::{ReclassificationHandler, ResolveRequest};
pub use stores::Stores;
pub use sweep::{StaleCaptureSweeper, SweepConfig, SweepReport, SweeperHandle};
pub use worker::{JobWorker, WorkerBuilder, WorkerConfig, WorkerEvent, WorkerHandle};

/// Default maximum retries for failed jobs.
pub const DEFAULT_MAX_RETRIES: i32 = cerebro_core::defaults::JOB_MAX_RETRIES;

/// Default polling interval for job processing (milliseconds).
pub const DEFAULT_POLL_INTERVAL_MS: u64 = cerebro_core::defaults::JOB_POLL_INTERVAL_MS;

/// Run a storage call under `timeout`; expiry becomes `Error::Timeout`.
pub(crate) async fn bounded<T>(
    timeout: Duration,
    op: &str,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout(format!(
            "{} exceeded {}s",
            op,
            timeout.as_secs_f64()
        ))),
    }
}
