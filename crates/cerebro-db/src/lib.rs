//! # cerebro-db
//!
//! PostgreSQL storage layer for the cerebro capture pipeline.
//!
//! This crate provides:
//! - Connection pool management
//! - Repository implementations for captures, the classification ledger,
//!   destination records, owner profiles and the job queue
//! - The transactional [`PgFilingStore`] used for filing and resolution
//! - An in-memory [`MemoryStore`] with the same semantics (feature `memory`)
//!
//! ## Example
//!
//! ```rust,ignore
//! use cerebro_db::{CaptureRepository, CaptureSource, CreateCaptureRequest, Database};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/cerebro").await?;
//!
//!     let scheduled = db.captures.insert_and_schedule(CreateCaptureRequest {
//!         owner_id: uuid::Uuid::new_v4(),
//!         raw_text: "Buy milk".to_string(),
//!         source: CaptureSource::Text,
//!         audio_url: None,
//!     }).await?;
//!
//!     println!("Capture {} scheduled as job {}", scheduled.capture.id, scheduled.job_id);
//!     Ok(())
//! }
//! ```

pub mod captures;
pub mod classifications;
pub mod destinations;
pub mod filing;
pub mod jobs;
#[cfg(any(test, feature = "memory"))]
pub mod memory;
pub mod pool;
pub mod profiles;
mod rows;

// Test fixtures for integration tests
// Note: Always compiled so integration tests (in tests/) can use DEFAULT_TEST_DATABASE_URL
pub mod test_fixtures;

use std::sync::Arc;

use tokio::sync::Notify;

// Re-export core types
pub use cerebro_core::*;

pub use captures::PgCaptureRepository;
pub use classifications::PgClassificationRepository;
pub use destinations::PgDestinationRepository;
pub use filing::PgFilingStore;
pub use jobs::PgJobRepository;
#[cfg(any(test, feature = "memory"))]
pub use memory::MemoryStore;
pub use pool::{create_pool, PoolConfig};
pub use profiles::PgProfileRepository;

/// Combined database context with all repositories.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    pub captures: Arc<PgCaptureRepository>,
    pub classifications: Arc<PgClassificationRepository>,
    pub destinations: Arc<PgDestinationRepository>,
    pub profiles: Arc<PgProfileRepository>,
    /// Transactional filing and resolution writes.
    pub filing: Arc<PgFilingStore>,
    /// Job repository for background processing.
    pub jobs: Arc<PgJobRepository>,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        // Ingestion and the job queue share one wake-up handle.
        let notify = Arc::new(Notify::new());
        Self {
            captures: Arc::new(PgCaptureRepository::with_notify(
                pool.clone(),
                notify.clone(),
            )),
            classifications: Arc::new(PgClassificationRepository::new(pool.clone())),
            destinations: Arc::new(PgDestinationRepository::new(pool.clone())),
            profiles: Arc::new(PgProfileRepository::new(pool.clone())),
            filing: Arc::new(PgFilingStore::new(pool.clone())),
            jobs: Arc::new(PgJobRepository::with_notify(pool.clone(), notify)),
            pool,
        }
    }

    /// Connect to `url` with pool sizing taken from the environment.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url, &PoolConfig::from_env()).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}
