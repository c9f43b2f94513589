//! Job repository implementation.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, Pool, Postgres, Row};
use tokio::sync::Notify;
use uuid::Uuid;

use cerebro_core::{defaults, new_v7, Error, Job, JobRepository, JobType, Result};

use crate::rows::text_enum;

/// Recorded on jobs reclaimed from a worker that never reported back.
pub(crate) const ABANDONED_MESSAGE: &str = "abandoned: worker stopped before finishing the job";

const JOB_COLUMNS: &str = "id, capture_id, owner_id, job_type, status, priority, payload, result, \
     error_message, retry_count, max_retries, created_at, started_at, completed_at";

/// PostgreSQL implementation of JobRepository.
pub struct PgJobRepository {
    pool: Pool<Postgres>,
    /// Woken whenever a job is queued so idle workers skip the poll delay.
    notify: Arc<Notify>,
}

impl PgJobRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            pool,
            notify: Arc::new(Notify::new()),
        }
    }

    /// Create a repository sharing an existing notify handle.
    pub fn with_notify(pool: Pool<Postgres>, notify: Arc<Notify>) -> Self {
        Self { pool, notify }
    }

    /// Handle the worker waits on between polls.
    pub fn job_notify(&self) -> Arc<Notify> {
        self.notify.clone()
    }

    fn parse_job_row(row: &PgRow) -> Result<Job> {
        Ok(Job {
            id: row.try_get("id")?,
            capture_id: row.try_get("capture_id")?,
            owner_id: row.try_get("owner_id")?,
            job_type: text_enum(row, "job_type")?,
            status: text_enum(row, "status")?,
            priority: row.try_get("priority")?,
            payload: row.try_get("payload")?,
            result: row.try_get("result")?,
            error_message: row.try_get("error_message")?,
            retry_count: row.try_get("retry_count")?,
            max_retries: row.try_get("max_retries")?,
            created_at: row.try_get("created_at")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
        })
    }
}

/// Insert a pending job on an existing connection or transaction.
///
/// Used by capture ingestion so the capture and its job commit together.
pub(crate) async fn insert_job(
    conn: &mut PgConnection,
    capture_id: Option<Uuid>,
    owner_id: Option<Uuid>,
    job_type: JobType,
    priority: i32,
    payload: Option<JsonValue>,
) -> Result<Uuid> {
    let job_id = new_v7();
    sqlx::query(
        "INSERT INTO job_queue (id, capture_id, owner_id, job_type, status, priority, payload, max_retries, created_at)
         VALUES ($1, $2, $3, $4, 'pending', $5, $6, $7, $8)",
    )
    .bind(job_id)
    .bind(capture_id)
    .bind(owner_id)
    .bind(job_type.as_str())
    .bind(priority)
    .bind(&payload)
    .bind(defaults::JOB_MAX_RETRIES)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await
    .map_err(Error::Database)?;
    Ok(job_id)
}

#[async_trait]
impl JobRepository for PgJobRepository {
    async fn queue(
        &self,
        capture_id: Option<Uuid>,
        owner_id: Option<Uuid>,
        job_type: JobType,
        priority: i32,
        payload: Option<JsonValue>,
    ) -> Result<Uuid> {
        let mut conn = self.pool.acquire().await.map_err(Error::Database)?;
        let job_id = insert_job(&mut conn, capture_id, owner_id, job_type, priority, payload).await?;
        self.notify.notify_waiters();
        Ok(job_id)
    }

    async fn queue_deduplicated(
        &self,
        capture_id: Uuid,
        owner_id: Uuid,
        job_type: JobType,
        priority: i32,
    ) -> Result<Option<Uuid>> {
        // The unique partial index on live jobs arbitrates concurrent callers;
        // the loser's insert becomes a no-op instead of a second job.
        let result = sqlx::query_scalar::<_, Uuid>(
            "INSERT INTO job_queue (id, capture_id, owner_id, job_type, status, priority, max_retries, created_at)
             VALUES ($1, $2, $3, $4, 'pending', $5, $6, $7)
             ON CONFLICT (capture_id, job_type) WHERE status IN ('pending', 'running')
             DO NOTHING
             RETURNING id",
        )
        .bind(new_v7())
        .bind(capture_id)
        .bind(owner_id)
        .bind(job_type.as_str())
        .bind(priority)
        .bind(defaults::JOB_MAX_RETRIES)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.is_some() {
            self.notify.notify_waiters();
        }
        Ok(result)
    }

    async fn claim_next_for_types(&self, job_types: &[JobType]) -> Result<Option<Job>> {
        let type_strings: Vec<String> = job_types
            .iter()
            .map(|jt| jt.as_str().to_string())
            .collect();

        // FOR UPDATE SKIP LOCKED lets several workers claim concurrently.
        // Empty array = claim any type.
        let query = format!(
            "UPDATE job_queue
             SET status = 'running', started_at = $1
             WHERE id = (
                 SELECT id FROM job_queue
                 WHERE status = 'pending'
                   AND (cardinality($2::text[]) = 0 OR job_type = ANY($2))
                 ORDER BY priority DESC, created_at ASC
                 LIMIT 1
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING {}",
            JOB_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(Utc::now())
            .bind(&type_strings)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        row.as_ref().map(Self::parse_job_row).transpose()
    }

    async fn complete(&self, job_id: Uuid, result: Option<JsonValue>) -> Result<()> {
        sqlx::query(
            "UPDATE job_queue
             SET status = 'completed', completed_at = $1, result = $2
             WHERE id = $3",
        )
        .bind(Utc::now())
        .bind(&result)
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn fail(&self, job_id: Uuid, error: &str) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let (retry_count, max_retries): (i32, i32) = sqlx::query_as(
            "SELECT retry_count, max_retries FROM job_queue WHERE id = $1 FOR UPDATE",
        )
        .bind(job_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(Error::Database)?;

        if retry_count < max_retries {
            sqlx::query(
                "UPDATE job_queue
                 SET status = 'pending', retry_count = $1, error_message = $2, started_at = NULL
                 WHERE id = $3",
            )
            .bind(retry_count + 1)
            .bind(error)
            .bind(job_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        } else {
            sqlx::query(
                "UPDATE job_queue
                 SET status = 'failed', completed_at = $1, error_message = $2
                 WHERE id = $3",
            )
            .bind(Utc::now())
            .bind(error)
            .bind(job_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        }

        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    }

    async fn requeue_abandoned(&self, started_before: DateTime<Utc>) -> Result<u64> {
        // Right-hand sides see the pre-update row, so every CASE agrees on
        // whether the job still has retries left.
        let result = sqlx::query(
            "UPDATE job_queue
             SET status = CASE WHEN retry_count < max_retries THEN 'pending' ELSE 'failed' END,
                 retry_count = CASE WHEN retry_count < max_retries THEN retry_count + 1 ELSE retry_count END,
                 started_at = CASE WHEN retry_count < max_retries THEN NULL ELSE started_at END,
                 completed_at = CASE WHEN retry_count < max_retries THEN NULL ELSE $2 END,
                 error_message = $3
             WHERE status = 'running' AND started_at < $1",
        )
        .bind(started_before)
        .bind(Utc::now())
        .bind(ABANDONED_MESSAGE)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        let reset = result.rows_affected();
        if reset > 0 {
            self.notify.notify_waiters();
        }
        Ok(reset)
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<Job>> {
        let query = format!("SELECT {} FROM job_queue WHERE id = $1", JOB_COLUMNS);
        let row = sqlx::query(&query)
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        row.as_ref().map(Self::parse_job_row).transpose()
    }

    async fn pending_count(&self) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM job_queue WHERE status = 'pending'")
                .fetch_one(&self.pool)
                .await
                .map_err(Error::Database)?;
        Ok(count)
    }
}
