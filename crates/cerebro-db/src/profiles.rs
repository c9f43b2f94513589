//! Owner profile settings.

use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use cerebro_core::{Error, ProfileRepository, Result};

/// PostgreSQL implementation of ProfileRepository.
pub struct PgProfileRepository {
    pool: Pool<Postgres>,
}

impl PgProfileRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Create or update the owner's confidence threshold.
    ///
    /// Profiles are owned by the account service; this exists for seeding
    /// and tests.
    pub async fn set_confidence_threshold(&self, owner_id: Uuid, threshold: f64) -> Result<()> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(Error::InvalidInput(format!(
                "confidence threshold must be within [0, 1], got {}",
                threshold
            )));
        }
        sqlx::query(
            "INSERT INTO profiles (owner_id, confidence_threshold)
             VALUES ($1, $2)
             ON CONFLICT (owner_id)
             DO UPDATE SET confidence_threshold = EXCLUDED.confidence_threshold, updated_at = now()",
        )
        .bind(owner_id)
        .bind(threshold)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }
}

#[async_trait]
impl ProfileRepository for PgProfileRepository {
    async fn confidence_threshold(&self, owner_id: Uuid) -> Result<Option<f64>> {
        let threshold: Option<Option<f64>> =
            sqlx::query_scalar("SELECT confidence_threshold FROM profiles WHERE owner_id = $1")
                .bind(owner_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(Error::Database)?;
        Ok(threshold.flatten())
    }
}
