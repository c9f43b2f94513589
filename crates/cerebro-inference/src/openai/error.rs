//! Mapping of provider HTTP failures onto the core error type.

use cerebro_core::Error;

/// Failure classes reported by OpenAI-compatible providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorCode {
    /// Invalid or missing API key.
    Authentication,
    /// Provider asked us to slow down (HTTP 429).
    RateLimited,
    /// Provider did not answer in time (HTTP 408/504).
    Timeout,
    /// Model id unknown to the provider.
    ModelNotFound,
    /// Request rejected as malformed or too large.
    BadRequest,
    /// Provider-side failure (HTTP 5xx).
    Server,
    Unknown,
}

impl ProviderErrorCode {
    /// Classify a non-success response from its status and error `type`.
    pub fn from_response(status: u16, error_type: &str) -> Self {
        match (status, error_type) {
            (401, _) | (403, _) => Self::Authentication,
            (429, _) => Self::RateLimited,
            (408, _) | (504, _) => Self::Timeout,
            (404, _) | (_, "model_not_found") => Self::ModelNotFound,
            (400, _) | (413, _) | (422, _) => Self::BadRequest,
            (500..=599, _) => Self::Server,
            _ => Self::Unknown,
        }
    }

    /// Transient failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited | Self::Timeout | Self::Server)
    }
}

/// Convert a provider failure to a core [`Error`].
///
/// Retryable codes become `Error::ProviderUnavailable`; credential and model
/// problems are configuration errors.
pub fn to_core_error(code: ProviderErrorCode, status: u16, message: &str) -> Error {
    match code {
        ProviderErrorCode::Authentication => {
            Error::Config(format!("Authentication failed ({}): {}", status, message))
        }
        ProviderErrorCode::ModelNotFound => {
            Error::Config(format!("Model not found ({}): {}", status, message))
        }
        code if code.is_retryable() => {
            Error::ProviderUnavailable(format!("HTTP {}: {}", status, message))
        }
        _ => Error::Inference(format!("HTTP {}: {}", status, message)),
    }
}
