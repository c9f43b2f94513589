//! Transactional writes for filing and reviewer resolution.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Postgres};
use tracing::{debug, info};

use cerebro_core::{
    new_v7, Error, FilingReceipt, FilingStore, NewFiling, ResolutionAction, ResolutionPlan,
    ResolutionReceipt, Result,
};

use crate::classifications::{
    parse_classification_row, parse_correction_row, CLASSIFICATION_COLUMNS, CORRECTION_COLUMNS,
};
use crate::destinations::{fetch_for_update, insert_destination, update_destination};

/// PostgreSQL implementation of FilingStore.
///
/// Every commit runs in one transaction; a failure at any step rolls back
/// the destination, the ledger entry and the capture update together.
pub struct PgFilingStore {
    pool: Pool<Postgres>,
}

impl PgFilingStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FilingStore for PgFilingStore {
    async fn commit_filing(&self, filing: NewFiling) -> Result<Option<FilingReceipt>> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        // Claim first: the conditional update is the compare-and-swap that
        // lets exactly one concurrent filer through. Losers block on the row
        // lock, then see processed = true and match nothing.
        let claimed = sqlx::query(
            "UPDATE captures SET processed = true, processing_error = $3
             WHERE id = $1 AND owner_id = $2 AND processed = false
             RETURNING id",
        )
        .bind(filing.capture_id)
        .bind(filing.owner_id)
        .bind(&filing.processing_error)
        .fetch_optional(&mut *tx)
        .await
        .map_err(Error::Database)?;

        if claimed.is_none() {
            tx.rollback().await.map_err(Error::Database)?;
            debug!(
                subsystem = "db",
                component = "filing",
                op = "commit_filing",
                capture_id = %filing.capture_id,
                "Capture already processed; nothing written"
            );
            return Ok(None);
        }

        if let Some(destination) = &filing.destination {
            insert_destination(&mut tx, destination).await?;
        }

        let now = Utc::now();
        let query = format!(
            "INSERT INTO classifications
                 (id, capture_id, owner_id, category, confidence, extracted_fields,
                  raw_llm_response, model, destination_id, status, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)
             RETURNING {}",
            CLASSIFICATION_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(new_v7())
            .bind(filing.capture_id)
            .bind(filing.owner_id)
            .bind(filing.category.as_str())
            .bind(filing.confidence)
            .bind(&filing.extracted_fields)
            .bind(&filing.raw_llm_response)
            .bind(&filing.model)
            .bind(filing.destination.as_ref().map(|d| d.id()))
            .bind(filing.status.as_str())
            .bind(now)
            .fetch_one(&mut *tx)
            .await
            .map_err(Error::Database)?;
        let classification = parse_classification_row(&row)?;

        tx.commit().await.map_err(Error::Database)?;

        info!(
            subsystem = "db",
            component = "filing",
            op = "commit_filing",
            capture_id = %classification.capture_id,
            classification_id = %classification.id,
            category = classification.category.as_str(),
            status = classification.status.as_str(),
            "Filing committed"
        );
        Ok(Some(FilingReceipt {
            classification,
            destination: filing.destination,
        }))
    }

    async fn commit_resolution(&self, plan: ResolutionPlan) -> Result<ResolutionReceipt> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let query = format!(
            "SELECT {} FROM classifications WHERE id = $1 AND owner_id = $2 FOR UPDATE",
            CLASSIFICATION_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(plan.classification_id)
            .bind(plan.owner_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(Error::Database)?
            .ok_or(Error::ClassificationNotFound(plan.classification_id))?;
        let previous = parse_classification_row(&row)?;

        if previous.destination_id != plan.expected_destination_id {
            return Err(Error::Conflict(format!(
                "classification {} was resolved concurrently",
                plan.classification_id
            )));
        }

        let now = Utc::now();
        let destination = match plan.action {
            ResolutionAction::Create(record) => {
                insert_destination(&mut tx, &record).await?;
                record
            }
            ResolutionAction::Update {
                destination_id,
                fields,
            } => {
                let mut record =
                    fetch_for_update(&mut tx, plan.owner_id, plan.category, destination_id)
                        .await?
                        .ok_or_else(|| {
                            Error::NotFound(format!("{} {}", plan.category, destination_id))
                        })?;
                record.apply_fields(&fields, now)?;
                update_destination(&mut tx, &record).await?;
                record
            }
        };

        let query = format!(
            "UPDATE classifications
             SET category = $2, extracted_fields = $3, destination_id = $4, status = $5,
                 updated_at = $6, resolved_at = $6
             WHERE id = $1
             RETURNING {}",
            CLASSIFICATION_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(plan.classification_id)
            .bind(plan.category.as_str())
            .bind(&plan.extracted_fields)
            .bind(destination.id())
            .bind(plan.status.as_str())
            .bind(now)
            .fetch_one(&mut *tx)
            .await
            .map_err(Error::Database)?;
        let classification = parse_classification_row(&row)?;

        let query = format!(
            "INSERT INTO classification_corrections
                 (id, classification_id, owner_id, mode, previous_category,
                  previous_extracted_fields, previous_destination_id, new_category,
                  new_extracted_fields, new_destination_id, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
             RETURNING {}",
            CORRECTION_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(new_v7())
            .bind(previous.id)
            .bind(previous.owner_id)
            .bind(plan.mode.as_str())
            .bind(previous.category.as_str())
            .bind(&previous.extracted_fields)
            .bind(previous.destination_id)
            .bind(classification.category.as_str())
            .bind(&classification.extracted_fields)
            .bind(destination.id())
            .bind(now)
            .fetch_one(&mut *tx)
            .await
            .map_err(Error::Database)?;
        let correction = parse_correction_row(&row)?;

        tx.commit().await.map_err(Error::Database)?;

        info!(
            subsystem = "db",
            component = "filing",
            op = "commit_resolution",
            classification_id = %classification.id,
            mode = plan.mode.as_str(),
            previous_category = previous.category.as_str(),
            category = classification.category.as_str(),
            destination_id = %destination.id(),
            status = classification.status.as_str(),
            "Resolution committed"
        );
        Ok(ResolutionReceipt {
            classification,
            destination,
            correction,
        })
    }
}
