//! Classification ledger queries.
//!
//! The ledger is written only by [`PgFilingStore`](crate::PgFilingStore);
//! this module holds the read side and the row decoders both share.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use cerebro_core::{
    Classification, ClassificationRepository, ClassificationStatus, CorrectionRecord, Error,
    Result, ReviewQueueItem,
};

use crate::rows::text_enum;

pub(crate) const CLASSIFICATION_COLUMNS: &str = "id, capture_id, owner_id, category, confidence, \
     extracted_fields, raw_llm_response, model, destination_id, status, created_at, updated_at, resolved_at";

pub(crate) const CORRECTION_COLUMNS: &str = "id, classification_id, owner_id, mode, \
     previous_category, previous_extracted_fields, previous_destination_id, \
     new_category, new_extracted_fields, new_destination_id, created_at";

pub(crate) fn parse_classification_row(row: &PgRow) -> Result<Classification> {
    Ok(Classification {
        id: row.try_get("id")?,
        capture_id: row.try_get("capture_id")?,
        owner_id: row.try_get("owner_id")?,
        category: text_enum(row, "category")?,
        confidence: row.try_get("confidence")?,
        extracted_fields: row.try_get("extracted_fields")?,
        raw_llm_response: row.try_get("raw_llm_response")?,
        model: row.try_get("model")?,
        destination_id: row.try_get("destination_id")?,
        status: text_enum(row, "status")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        resolved_at: row.try_get("resolved_at")?,
    })
}

pub(crate) fn parse_correction_row(row: &PgRow) -> Result<CorrectionRecord> {
    Ok(CorrectionRecord {
        id: row.try_get("id")?,
        classification_id: row.try_get("classification_id")?,
        owner_id: row.try_get("owner_id")?,
        mode: text_enum(row, "mode")?,
        previous_category: text_enum(row, "previous_category")?,
        previous_extracted_fields: row.try_get("previous_extracted_fields")?,
        previous_destination_id: row.try_get("previous_destination_id")?,
        new_category: text_enum(row, "new_category")?,
        new_extracted_fields: row.try_get("new_extracted_fields")?,
        new_destination_id: row.try_get("new_destination_id")?,
        created_at: row.try_get("created_at")?,
    })
}

/// PostgreSQL implementation of ClassificationRepository.
pub struct PgClassificationRepository {
    pool: Pool<Postgres>,
}

impl PgClassificationRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ClassificationRepository for PgClassificationRepository {
    async fn get(&self, owner_id: Uuid, id: Uuid) -> Result<Classification> {
        let query = format!(
            "SELECT {} FROM classifications WHERE id = $1 AND owner_id = $2",
            CLASSIFICATION_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(id)
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?
            .ok_or(Error::ClassificationNotFound(id))?;
        parse_classification_row(&row)
    }

    async fn get_by_capture(
        &self,
        owner_id: Uuid,
        capture_id: Uuid,
    ) -> Result<Option<Classification>> {
        let query = format!(
            "SELECT {} FROM classifications WHERE capture_id = $1 AND owner_id = $2",
            CLASSIFICATION_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(capture_id)
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;
        row.as_ref().map(parse_classification_row).transpose()
    }

    async fn list(
        &self,
        owner_id: Uuid,
        status: Option<ClassificationStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Classification>> {
        let query = format!(
            "SELECT {} FROM classifications
             WHERE owner_id = $1 AND ($2::text IS NULL OR status = $2)
             ORDER BY created_at DESC, id DESC
             LIMIT $3 OFFSET $4",
            CLASSIFICATION_COLUMNS
        );
        let rows = sqlx::query(&query)
            .bind(owner_id)
            .bind(status.map(|s| s.as_str()))
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;
        rows.iter().map(parse_classification_row).collect()
    }

    async fn review_queue(
        &self,
        owner_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ReviewQueueItem>> {
        let rows = sqlx::query(
            "SELECT cl.id, cl.capture_id, cl.owner_id, cl.category, cl.confidence,
                    cl.extracted_fields, cl.raw_llm_response, cl.model, cl.destination_id,
                    cl.status, cl.created_at, cl.updated_at, cl.resolved_at,
                    c.raw_text, c.source, c.created_at AS capture_created_at
             FROM classifications cl
             JOIN captures c ON c.id = cl.capture_id
             WHERE cl.owner_id = $1 AND cl.status = 'needs_review'
             ORDER BY cl.created_at DESC, cl.id DESC
             LIMIT $2 OFFSET $3",
        )
        .bind(owner_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter()
            .map(|row| {
                Ok(ReviewQueueItem {
                    classification: parse_classification_row(row)?,
                    raw_text: row.try_get("raw_text")?,
                    source: text_enum(row, "source")?,
                    capture_created_at: row.try_get("capture_created_at")?,
                })
            })
            .collect()
    }

    async fn list_corrections(
        &self,
        owner_id: Uuid,
        classification_id: Uuid,
    ) -> Result<Vec<CorrectionRecord>> {
        let query = format!(
            "SELECT {} FROM classification_corrections
             WHERE classification_id = $1 AND owner_id = $2
             ORDER BY created_at ASC, id ASC",
            CORRECTION_COLUMNS
        );
        let rows = sqlx::query(&query)
            .bind(classification_id)
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;
        rows.iter().map(parse_correction_row).collect()
    }
}
