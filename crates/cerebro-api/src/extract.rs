//! Request extractors.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use serde::Deserialize;
use uuid::Uuid;

use cerebro_core::defaults;

use crate::error::ApiError;

/// Header carrying the authenticated owner id.
pub const OWNER_HEADER: &str = "x-owner-id";

/// The owner every request is scoped to.
///
/// Authentication happens upstream; this extractor only requires that the
/// auth layer supplied a well-formed owner id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Owner(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for Owner
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(OWNER_HEADER)
            .ok_or_else(|| ApiError::Unauthorized("X-Owner-Id header required".to_string()))?;

        value
            .to_str()
            .ok()
            .and_then(|v| Uuid::parse_str(v.trim()).ok())
            .map(Owner)
            .ok_or_else(|| ApiError::Unauthorized("X-Owner-Id must be a UUID".to_string()))
    }
}

/// `limit` / `offset` query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Normalised page bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub limit: i64,
    pub offset: i64,
}

impl Pagination {
    /// Limit defaults to 50 and is clamped to `1..=500`; offset floors at 0.
    pub fn new(limit: Option<i64>, offset: Option<i64>) -> Self {
        Self {
            limit: limit
                .unwrap_or(defaults::PAGE_LIMIT)
                .clamp(1, defaults::PAGE_LIMIT_MAX),
            offset: offset.unwrap_or(0).max(0),
        }
    }
}

impl From<PageQuery> for Pagination {
    fn from(query: PageQuery) -> Self {
        Self::new(query.limit, query.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(request: Request<()>) -> Result<Owner, ApiError> {
        let (mut parts, _) = request.into_parts();
        Owner::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_owner_from_header() {
        let owner = Uuid::new_v4();
        let request = Request::builder()
            .header(OWNER_HEADER, owner.to_string())
            .body(())
            .unwrap();
        assert_eq!(extract(request).await.unwrap(), Owner(owner));
    }

    #[tokio::test]
    async fn test_owner_missing_or_malformed_is_unauthorized() {
        let missing = Request::builder().body(()).unwrap();
        assert!(matches!(extract(missing).await, Err(ApiError::Unauthorized(_))));

        let malformed = Request::builder()
            .header(OWNER_HEADER, "alice")
            .body(())
            .unwrap();
        assert!(matches!(extract(malformed).await, Err(ApiError::Unauthorized(_))));
    }

    #[test]
    fn test_pagination_bounds() {
        assert_eq!(Pagination::new(None, None), Pagination { limit: 50, offset: 0 });
        assert_eq!(Pagination::new(Some(10_000), Some(-5)), Pagination { limit: 500, offset: 0 });
        assert_eq!(Pagination::new(Some(0), Some(20)), Pagination { limit: 1, offset: 20 });
    }
}
