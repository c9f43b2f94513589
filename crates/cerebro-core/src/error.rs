//! Error types for the capture pipeline.

use thiserror::Error;

/// Result type alias using cerebro's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for cerebro operations.
///
/// Model-side classification problems are not represented here; they are
/// [`ClassificationError`](crate::ClassificationError) values that the filing
/// engine turns into reviewable ledger entries.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Capture not found (or not visible to the requesting owner)
    #[error("Capture not found: {0}")]
    CaptureNotFound(uuid::Uuid),

    /// Ledger entry not found (or not visible to the requesting owner)
    #[error("Classification not found: {0}")]
    ClassificationNotFound(uuid::Uuid),

    /// Inference call failed in a way retrying will not fix
    #[error("Inference error: {0}")]
    Inference(String),

    /// Model provider transiently unavailable (timeout, 5xx, rate limit)
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// A bounded operation exceeded its deadline
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Concurrent modification detected by an optimistic check
    #[error("Conflict: {0}")]
    Conflict(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Authentication/authorization failed
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
}

impl Error {
    /// Whether the failure came from storage and may succeed on a later attempt.
    pub fn is_storage_failure(&self) -> bool {
        matches!(self, Error::Database(_) | Error::Timeout(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() {
            Error::ProviderUnavailable(e.to_string())
        } else {
            Error::Request(e.to_string())
        }
    }
}
