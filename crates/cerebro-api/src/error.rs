//! HTTP error mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use tracing::error;

/// Error returned by every handler, rendered as `{"error": "..."}`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Storage or other internal failure.
    #[error(transparent)]
    Internal(cerebro_core::Error),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Conflict(String),
    /// A dependency is slow or unavailable; the client may retry.
    #[error("{0}")]
    ServiceUnavailable(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<cerebro_core::Error> for ApiError {
    fn from(err: cerebro_core::Error) -> Self {
        use cerebro_core::Error;

        match err {
            Error::NotFound(_) | Error::CaptureNotFound(_) | Error::ClassificationNotFound(_) => {
                ApiError::NotFound(err.to_string())
            }
            Error::InvalidInput(msg) => ApiError::BadRequest(msg),
            Error::Unauthorized(msg) => ApiError::Unauthorized(msg),
            Error::Conflict(msg) => ApiError::Conflict(msg),
            Error::ProviderUnavailable(_) | Error::Timeout(_) => {
                ApiError::ServiceUnavailable(err.to_string())
            }
            other => ApiError::Internal(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(subsystem = "api", status = status.as_u16(), error = %self, "Request failed");
        }

        let body = Json(serde_json::json!({
            "error": self.to_string(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cerebro_core::Error;
    use uuid::Uuid;

    #[test]
    fn test_core_error_status_mapping() {
        let cases = [
            (Error::CaptureNotFound(Uuid::nil()), StatusCode::NOT_FOUND),
            (Error::ClassificationNotFound(Uuid::nil()), StatusCode::NOT_FOUND),
            (Error::NotFound("job".into()), StatusCode::NOT_FOUND),
            (Error::InvalidInput("empty".into()), StatusCode::BAD_REQUEST),
            (Error::Unauthorized("no owner".into()), StatusCode::UNAUTHORIZED),
            (Error::Conflict("moved".into()), StatusCode::CONFLICT),
            (Error::Timeout("commit".into()), StatusCode::SERVICE_UNAVAILABLE),
            (Error::ProviderUnavailable("503".into()), StatusCode::SERVICE_UNAVAILABLE),
            (Error::Internal("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (Error::Config("bad".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            let label = err.to_string();
            assert_eq!(ApiError::from(err).status(), expected, "{}", label);
        }
    }

    #[test]
    fn test_bad_request_keeps_message() {
        let err = ApiError::from(Error::InvalidInput("raw_text must not be empty".into()));
        assert_eq!(err.to_string(), "raw_text must not be empty");
    }
}
