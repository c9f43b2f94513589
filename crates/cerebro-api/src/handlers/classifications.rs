//! Classification ledger, review queue and reviewer resolution.

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use tracing::instrument;
use uuid::Uuid;

use cerebro_core::{Classification, ClassificationStatus, ResolutionReceipt};
use cerebro_jobs::ResolveRequest;

use crate::extract::PageQuery;
use crate::{ApiError, AppState, Owner, Pagination};

#[derive(Debug, Default, Deserialize)]
pub struct ListClassificationsQuery {
    /// A ledger status such as `needs_review` or `auto_filed`.
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn list_classifications(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    Query(query): Query<ListClassificationsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let status = query
        .status
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<ClassificationStatus>())
        .transpose()
        .map_err(ApiError::BadRequest)?;
    let page = Pagination::new(query.limit, query.offset);

    let entries = state
        .stores
        .classifications
        .list(owner_id, status, page.limit, page.offset)
        .await?;

    Ok(Json(serde_json::json!({
        "classifications": entries,
        "count": entries.len(),
        "limit": page.limit,
        "offset": page.offset,
    })))
}

pub async fn get_classification(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    Path(id): Path<Uuid>,
) -> Result<Json<Classification>, ApiError> {
    let entry = state.stores.classifications.get(owner_id, id).await?;
    Ok(Json(entry))
}

/// Correction audit rows for one entry, oldest first.
pub async fn list_corrections(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    // Distinguish "no corrections yet" from "no such entry".
    state.stores.classifications.get(owner_id, id).await?;
    let corrections = state
        .stores
        .classifications
        .list_corrections(owner_id, id)
        .await?;

    Ok(Json(serde_json::json!({
        "corrections": corrections,
        "count": corrections.len(),
    })))
}

/// `needs_review` entries with their capture text, newest first.
pub async fn review_queue(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let page = Pagination::from(query);
    let items = state
        .stores
        .classifications
        .review_queue(owner_id, page.limit, page.offset)
        .await?;

    Ok(Json(serde_json::json!({
        "items": items,
        "count": items.len(),
        "limit": page.limit,
        "offset": page.offset,
    })))
}

/// Apply a reviewer's confirm or override.
///
/// # Request body
/// - `mode`: `"confirm"` or `"override"`
/// - `category`: target category (optional; defaults to the current one)
/// - `fields`: extracted fields for the target category (optional)
///
/// # Returns
/// - 200 OK with `{classification, destination, correction}`
/// - 400 Bad Request for unusable fields or a confirm that changes category
/// - 404 Not Found for unknown entries
/// - 409 Conflict when a concurrent resolution moved the entry first
#[instrument(
    skip(state, request),
    fields(subsystem = "api", component = "classifications", op = "resolve", owner_id = %owner_id)
)]
pub async fn resolve_classification(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    Path(id): Path<Uuid>,
    Json(request): Json<ResolveRequest>,
) -> Result<Json<ResolutionReceipt>, ApiError> {
    let receipt = state.resolver.resolve(owner_id, id, request).await?;
    Ok(Json(receipt))
}
