//! Stale capture sweeper.
//!
//! A capture whose job was lost stays `processed = false` forever unless
//! something schedules it again. Each sweep does two things:
//!
//! 1. Jobs stuck in `running` well past the job timeout belong to a worker
//!    that died mid-run. They go back to `pending` (or `failed` once out of
//!    retries), which also releases the capture's live-job slot.
//! 2. Captures still unprocessed after the grace period get a new job.
//!    Queuing is deduplicated, so a capture whose job is merely queued or
//!    slow is left alone.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

use cerebro_core::{defaults, CaptureRepository, Error, JobRepository, JobType, Result};

use crate::stores::Stores;

/// Sweeper settings.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepConfig {
    pub enabled: bool,
    /// Time between sweeps.
    pub interval: Duration,
    /// Minimum age of an unprocessed capture before it is re-queued.
    pub grace: Duration,
    /// Captures examined per sweep.
    pub batch: i64,
    /// How long a job may stay `running` before it is treated as abandoned.
    /// Keep this above the worker's job timeout.
    pub abandon_after: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(defaults::SWEEP_INTERVAL_SECS),
            grace: Duration::from_secs(defaults::SWEEP_GRACE_SECS),
            batch: defaults::SWEEP_BATCH,
            abandon_after: Duration::from_secs(defaults::SWEEP_ABANDON_SECS),
        }
    }
}

impl SweepConfig {
    /// | Variable | Default |
    /// |----------|---------|
    /// | `SWEEP_ENABLED` | `true` |
    /// | `SWEEP_INTERVAL_SECS` | `60` |
    /// | `SWEEP_GRACE_SECS` | `300` |
    /// | `SWEEP_BATCH` | `100` |
    /// | `SWEEP_ABANDON_SECS` | `360` |
    pub fn from_env() -> Self {
        fn var<T: std::str::FromStr>(name: &str) -> Option<T> {
            std::env::var(name).ok().and_then(|v| v.parse().ok())
        }

        let enabled = std::env::var("SWEEP_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        Self {
            enabled,
            interval: Duration::from_secs(
                var("SWEEP_INTERVAL_SECS").unwrap_or(defaults::SWEEP_INTERVAL_SECS).max(1),
            ),
            grace: Duration::from_secs(var("SWEEP_GRACE_SECS").unwrap_or(defaults::SWEEP_GRACE_SECS)),
            batch: var("SWEEP_BATCH").unwrap_or(defaults::SWEEP_BATCH).max(1),
            abandon_after: Duration::from_secs(
                var("SWEEP_ABANDON_SECS").unwrap_or(defaults::SWEEP_ABANDON_SECS),
            ),
        }
    }
}

/// What one sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Abandoned `running` jobs returned to the queue or failed.
    pub reclaimed: u64,
    /// Stale unprocessed captures found.
    pub scanned: usize,
    /// Of those, captures that got a new job.
    pub requeued: usize,
}

/// Re-queues captures left unprocessed past the grace period.
pub struct StaleCaptureSweeper {
    captures: Arc<dyn CaptureRepository>,
    jobs: Arc<dyn JobRepository>,
    config: SweepConfig,
}

impl StaleCaptureSweeper {
    pub fn new(stores: &Stores, config: SweepConfig) -> Self {
        Self {
            captures: stores.captures.clone(),
            jobs: stores.jobs.clone(),
            config,
        }
    }

    pub fn config(&self) -> &SweepConfig {
        &self.config
    }

    #[instrument(skip(self), fields(subsystem = "jobs", component = "sweeper", op = "sweep"))]
    pub async fn sweep_once(&self) -> Result<SweepReport> {
        let grace = chrono::Duration::from_std(self.config.grace)
            .map_err(|e| Error::Config(format!("sweep grace out of range: {}", e)))?;
        let abandon_after = chrono::Duration::from_std(self.config.abandon_after)
            .map_err(|e| Error::Config(format!("sweep abandon_after out of range: {}", e)))?;
        let now = Utc::now();

        // Reclaim first so a capture whose worker died is not blocked by
        // its own dead job below.
        let reclaimed = self.jobs.requeue_abandoned(now - abandon_after).await?;
        if reclaimed > 0 {
            warn!(reclaimed, "Reclaimed jobs abandoned in running state");
        }

        let cutoff = now - grace;
        let stale = self
            .captures
            .list_stale_unprocessed(cutoff, self.config.batch)
            .await?;

        let mut report = SweepReport {
            reclaimed,
            scanned: stale.len(),
            requeued: 0,
        };
        let job_type = JobType::ClassifyCapture;
        for capture in &stale {
            let queued = self
                .jobs
                .queue_deduplicated(capture.id, capture.owner_id, job_type, job_type.default_priority())
                .await?;
            if let Some(job_id) = queued {
                report.requeued += 1;
                info!(
                    capture_id = %capture.id,
                    owner_id = %capture.owner_id,
                    job_id = %job_id,
                    created_at = %capture.created_at,
                    "Re-queued stale capture"
                );
            }
        }

        if report.scanned > 0 || report.reclaimed > 0 {
            info!(
                reclaimed = report.reclaimed,
                scanned = report.scanned,
                requeued = report.requeued,
                "Sweep finished"
            );
        } else {
            debug!("Sweep found no stale captures");
        }
        Ok(report)
    }

    /// Run sweeps on the configured interval until shut down.
    pub fn start(self) -> SweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        tokio::spawn(async move {
            if !self.config.enabled {
                info!(subsystem = "jobs", component = "sweeper", "Stale capture sweeper is disabled");
                return;
            }
            info!(
                subsystem = "jobs",
                component = "sweeper",
                interval_secs = self.config.interval.as_secs(),
                grace_secs = self.config.grace.as_secs(),
                abandon_after_secs = self.config.abandon_after.as_secs(),
                batch = self.config.batch,
                "Stale capture sweeper started"
            );

            let mut ticker = tokio::time::interval(self.config.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = self.sweep_once().await {
                            error!(
                                subsystem = "jobs",
                                component = "sweeper",
                                error = %e,
                                "Sweep failed"
                            );
                        }
                    }
                }
            }
            info!(subsystem = "jobs", component = "sweeper", "Stale capture sweeper stopped");
        });

        SweeperHandle { shutdown_tx }
    }
}

/// Handle for stopping a running sweeper.
pub struct SweeperHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl SweeperHandle {
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| Error::Internal("Failed to send sweeper shutdown signal".into()))
    }
}
