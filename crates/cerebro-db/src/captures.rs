//! Capture repository implementation.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use tokio::sync::Notify;
use tracing::info;
use uuid::Uuid;

use cerebro_core::{
    new_v7, Capture, CaptureRepository, CreateCaptureRequest, Error, JobType, Result,
    ScheduledCapture,
};

use crate::jobs::insert_job;
use crate::rows::text_enum;

pub(crate) const CAPTURE_COLUMNS: &str =
    "id, owner_id, raw_text, source, audio_url, processed, processing_error, created_at";

/// PostgreSQL implementation of CaptureRepository.
pub struct PgCaptureRepository {
    pool: Pool<Postgres>,
    notify: Arc<Notify>,
}

impl PgCaptureRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            pool,
            notify: Arc::new(Notify::new()),
        }
    }

    /// Share the job queue's notify handle so scheduled captures wake workers.
    pub fn with_notify(pool: Pool<Postgres>, notify: Arc<Notify>) -> Self {
        Self { pool, notify }
    }
}

pub(crate) fn parse_capture_row(row: &PgRow) -> Result<Capture> {
    Ok(Capture {
        id: row.try_get("id")?,
        owner_id: row.try_get("owner_id")?,
        raw_text: row.try_get("raw_text")?,
        source: text_enum(row, "source")?,
        audio_url: row.try_get("audio_url")?,
        processed: row.try_get("processed")?,
        processing_error: row.try_get("processing_error")?,
        created_at: row.try_get("created_at")?,
    })
}

async fn insert_capture<'e, E>(executor: E, req: &CreateCaptureRequest) -> Result<Capture>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let query = format!(
        "INSERT INTO captures (id, owner_id, raw_text, source, audio_url, processed, created_at)
         VALUES ($1, $2, $3, $4, $5, false, $6)
         RETURNING {}",
        CAPTURE_COLUMNS
    );
    let row = sqlx::query(&query)
        .bind(new_v7())
        .bind(req.owner_id)
        .bind(&req.raw_text)
        .bind(req.source.as_str())
        .bind(&req.audio_url)
        .bind(Utc::now())
        .fetch_one(executor)
        .await
        .map_err(Error::Database)?;
    parse_capture_row(&row)
}

#[async_trait]
impl CaptureRepository for PgCaptureRepository {
    async fn insert(&self, req: CreateCaptureRequest) -> Result<Capture> {
        req.validate()?;
        insert_capture(&self.pool, &req).await
    }

    async fn insert_and_schedule(&self, req: CreateCaptureRequest) -> Result<ScheduledCapture> {
        req.validate()?;

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        let capture = insert_capture(&mut *tx, &req).await?;
        let job_type = JobType::ClassifyCapture;
        let job_id = insert_job(
            &mut tx,
            Some(capture.id),
            Some(capture.owner_id),
            job_type,
            job_type.default_priority(),
            None,
        )
        .await?;
        tx.commit().await.map_err(Error::Database)?;

        self.notify.notify_waiters();
        info!(
            subsystem = "db",
            component = "captures",
            op = "insert_and_schedule",
            capture_id = %capture.id,
            owner_id = %capture.owner_id,
            job_id = %job_id,
            source = capture.source.as_str(),
            "Capture stored and classification scheduled"
        );
        Ok(ScheduledCapture { capture, job_id })
    }

    async fn fetch(&self, owner_id: Uuid, id: Uuid) -> Result<Capture> {
        let query = format!(
            "SELECT {} FROM captures WHERE id = $1 AND owner_id = $2",
            CAPTURE_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(id)
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?
            .ok_or(Error::CaptureNotFound(id))?;
        parse_capture_row(&row)
    }

    async fn list_stale_unprocessed(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Capture>> {
        let query = format!(
            "SELECT {} FROM captures
             WHERE processed = false AND created_at < $1
             ORDER BY created_at ASC
             LIMIT $2",
            CAPTURE_COLUMNS
        );
        let rows = sqlx::query(&query)
            .bind(older_than)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;
        rows.iter().map(parse_capture_row).collect()
    }
}
