//! The classify → gate → file sequence for one capture.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use cerebro_core::{
    defaults, Classification, Classifier, ConfidenceGate, DestinationRecord, Result,
};

use crate::bounded;
use crate::filing::FilingEngine;
use crate::stores::Stores;

/// Storage settings for the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Cap on each storage call.
    pub storage_timeout: Duration,
    /// Attempts at the filing commit before the error propagates.
    pub commit_attempts: u32,
    /// Pause between filing commit attempts.
    pub commit_backoff: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            storage_timeout: Duration::from_secs(defaults::STORAGE_TIMEOUT_SECS),
            commit_attempts: defaults::FILING_COMMIT_ATTEMPTS,
            commit_backoff: Duration::from_millis(defaults::FILING_COMMIT_BACKOFF_MS),
        }
    }
}

impl PipelineConfig {
    /// Reads `STORAGE_TIMEOUT_SECS`; commit retry settings use their defaults.
    pub fn from_env() -> Self {
        let storage_timeout = std::env::var("STORAGE_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::STORAGE_TIMEOUT_SECS);
        Self {
            storage_timeout: Duration::from_secs(storage_timeout),
            ..Self::default()
        }
    }
}

/// Where a capture ended up after a pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    /// The capture's ledger entry. Absent only for a capture that was marked
    /// processed outside the pipeline.
    pub classification: Option<Classification>,
    pub destination: Option<DestinationRecord>,
    /// `false` when an earlier run had already processed the capture.
    pub newly_filed: bool,
}

/// Runs classification and filing for captures.
pub struct ClassificationPipeline {
    stores: Stores,
    classifier: Arc<dyn Classifier>,
    engine: FilingEngine,
    config: PipelineConfig,
}

impl ClassificationPipeline {
    pub fn new(stores: Stores, classifier: Arc<dyn Classifier>, config: PipelineConfig) -> Self {
        let engine = FilingEngine::new(stores.filing.clone())
            .with_commit_retries(config.commit_attempts, config.commit_backoff)
            .with_storage_timeout(config.storage_timeout);
        Self {
            stores,
            classifier,
            engine,
            config,
        }
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    /// Classify and file one capture.
    ///
    /// Idempotent: a capture that is already processed is not classified
    /// again and its existing ledger entry is returned. Classification
    /// failures end in a `needs_review` entry, never in an error. Storage
    /// failures are returned to the caller, leaving the capture unprocessed
    /// for a later retry.
    #[instrument(
        skip(self),
        fields(subsystem = "jobs", component = "pipeline", op = "process_capture")
    )]
    pub async fn process_capture(&self, owner_id: Uuid, capture_id: Uuid) -> Result<PipelineOutcome> {
        let start = Instant::now();
        let timeout = self.config.storage_timeout;

        let capture = bounded(
            timeout,
            "fetch_capture",
            self.stores.captures.fetch(owner_id, capture_id),
        )
        .await?;
        if capture.processed {
            debug!(capture_id = %capture_id, "Capture already processed; skipping");
            return self.existing_outcome(owner_id, capture_id).await;
        }

        let threshold = bounded(
            timeout,
            "confidence_threshold",
            self.stores.profiles.confidence_threshold(owner_id),
        )
        .await?;
        let gate = ConfidenceGate::for_profile(threshold);

        let outcome = self.classifier.classify(&capture.raw_text).await;
        let filing = FilingEngine::plan(&capture, &outcome, &gate, Utc::now());

        match self.engine.file(filing).await? {
            Some(receipt) => {
                info!(
                    capture_id = %capture_id,
                    owner_id = %owner_id,
                    classification_id = %receipt.classification.id,
                    category = receipt.classification.category.as_str(),
                    confidence = receipt.classification.confidence,
                    threshold = gate.threshold(),
                    status = receipt.classification.status.as_str(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Capture filed"
                );
                Ok(PipelineOutcome {
                    classification: Some(receipt.classification),
                    destination: receipt.destination,
                    newly_filed: true,
                })
            }
            None => {
                // A concurrent run claimed the capture first.
                debug!(capture_id = %capture_id, "Lost filing race; returning existing entry");
                self.existing_outcome(owner_id, capture_id).await
            }
        }
    }

    async fn existing_outcome(&self, owner_id: Uuid, capture_id: Uuid) -> Result<PipelineOutcome> {
        let timeout = self.config.storage_timeout;
        let classification = bounded(
            timeout,
            "get_by_capture",
            self.stores.classifications.get_by_capture(owner_id, capture_id),
        )
        .await?;

        let destination = match classification
            .as_ref()
            .and_then(|c| c.destination_id.map(|id| (c.category, id)))
        {
            Some((category, id)) => {
                bounded(
                    timeout,
                    "fetch_destination",
                    self.stores.destinations.fetch(owner_id, category, id),
                )
                .await?
            }
            None => None,
        };

        Ok(PipelineOutcome {
            classification,
            destination,
            newly_filed: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_config_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.storage_timeout, Duration::from_secs(10));
        assert_eq!(config.commit_attempts, 3);
        assert_eq!(config.commit_backoff, Duration::from_millis(250));
    }
}
