//! Reviewer resolution of ledger entries.
//!
//! A reviewer either confirms the model's guess or overrides it. What
//! happens to the destination depends on the entry's current state:
//!
//! | Entry has destination | Category | Effect | New status |
//! |---|---|---|---|
//! | no | any | create destination | `manually_filed` |
//! | yes | unchanged | update destination in place | `manually_corrected` |
//! | yes | changed | create destination in the new category; old one kept | `manually_corrected` |

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::{info, instrument};
use uuid::Uuid;

use cerebro_core::{
    defaults, CaptureRepository, Category, Classification, ClassificationRepository,
    ClassificationStatus, DestinationRecord, Error, ExtractedFields, FilingStore,
    ResolutionAction, ResolutionMode, ResolutionPlan, ResolutionReceipt, Result,
};

use crate::bounded;
use crate::stores::Stores;

/// A reviewer's decision on one ledger entry.
#[derive(Debug, Clone, Deserialize)]
pub struct ResolveRequest {
    pub mode: ResolutionMode,
    /// Target category; defaults to the entry's current category.
    #[serde(default)]
    pub category: Option<Category>,
    /// Fields for the target category; defaults to the stored fields.
    #[serde(default)]
    pub fields: Option<JsonValue>,
}

/// Applies reviewer resolutions through the [`FilingStore`].
pub struct ReclassificationHandler {
    captures: Arc<dyn CaptureRepository>,
    classifications: Arc<dyn ClassificationRepository>,
    filing: Arc<dyn FilingStore>,
    storage_timeout: Duration,
}

impl ReclassificationHandler {
    pub fn new(stores: &Stores) -> Self {
        Self {
            captures: stores.captures.clone(),
            classifications: stores.classifications.clone(),
            filing: stores.filing.clone(),
            storage_timeout: Duration::from_secs(defaults::STORAGE_TIMEOUT_SECS),
        }
    }

    pub fn with_storage_timeout(mut self, timeout: Duration) -> Self {
        self.storage_timeout = timeout;
        self
    }

    /// Resolve `classification_id` for `owner_id`.
    ///
    /// Errors:
    /// - `ClassificationNotFound` for unknown or foreign entries
    /// - `InvalidInput` for unusable fields or a confirm that changes category
    /// - `Conflict` when another resolution changed the entry's destination
    ///   after it was read
    #[instrument(
        skip(self, request),
        fields(subsystem = "jobs", component = "reclassify", op = "resolve")
    )]
    pub async fn resolve(
        &self,
        owner_id: Uuid,
        classification_id: Uuid,
        request: ResolveRequest,
    ) -> Result<ResolutionReceipt> {
        let entry = bounded(
            self.storage_timeout,
            "get_classification",
            self.classifications.get(owner_id, classification_id),
        )
        .await?;

        let target = request.category.unwrap_or(entry.category);
        if request.mode == ResolutionMode::Confirm && target != entry.category {
            return Err(Error::InvalidInput(format!(
                "confirm keeps category {}; use override to change it to {}",
                entry.category, target
            )));
        }

        let fields = self
            .resolve_fields(&entry, target, request.fields.as_ref())
            .await?;
        let plan = build_plan(&entry, request.mode, fields);
        let status = plan.status;

        let receipt = bounded(
            self.storage_timeout,
            "commit_resolution",
            self.filing.commit_resolution(plan),
        )
        .await?;

        info!(
            classification_id = %classification_id,
            owner_id = %owner_id,
            mode = request.mode.as_str(),
            previous_category = entry.category.as_str(),
            category = target.as_str(),
            status = status.as_str(),
            destination_id = %receipt.destination.id(),
            "Classification resolved"
        );
        Ok(receipt)
    }

    /// Fields for the target category, in order of preference: supplied by
    /// the reviewer, stored on the entry (converted when the category
    /// changes), or seeded from the capture's raw text.
    async fn resolve_fields(
        &self,
        entry: &Classification,
        target: Category,
        supplied: Option<&JsonValue>,
    ) -> Result<ExtractedFields> {
        if let Some(value) = supplied {
            let fields = ExtractedFields::from_value(target, value).map_err(Error::InvalidInput)?;
            fields.validate().map_err(Error::InvalidInput)?;
            return Ok(fields);
        }

        if let Ok(stored) = entry.extracted() {
            if stored.validate().is_ok() {
                return Ok(stored.convert_to(target));
            }
        }

        let capture = bounded(
            self.storage_timeout,
            "fetch_capture",
            self.captures.fetch(entry.owner_id, entry.capture_id),
        )
        .await?;
        let seeded = ExtractedFields::seed(target, &capture.raw_text);
        seeded.validate().map_err(Error::InvalidInput)?;
        Ok(seeded)
    }
}

/// Choose the destination write and resulting status for a resolution.
fn build_plan(
    entry: &Classification,
    mode: ResolutionMode,
    fields: ExtractedFields,
) -> ResolutionPlan {
    let target = fields.category();
    let (action, status) = match entry.destination_id {
        None => (
            ResolutionAction::Create(DestinationRecord::from_fields(
                entry.owner_id,
                &fields,
                Utc::now(),
            )),
            ClassificationStatus::ManuallyFiled,
        ),
        Some(destination_id) if target == entry.category => (
            ResolutionAction::Update {
                destination_id,
                fields: fields.clone(),
            },
            ClassificationStatus::ManuallyCorrected,
        ),
        Some(_) => (
            ResolutionAction::Create(DestinationRecord::from_fields(
                entry.owner_id,
                &fields,
                Utc::now(),
            )),
            ClassificationStatus::ManuallyCorrected,
        ),
    };

    ResolutionPlan {
        classification_id: entry.id,
        owner_id: entry.owner_id,
        mode,
        expected_destination_id: entry.destination_id,
        category: target,
        extracted_fields: fields.to_value(),
        action,
        status,
    }
}
