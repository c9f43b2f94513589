//! Capture ingestion and the synchronous classify trigger.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use tracing::{info, instrument};
use uuid::Uuid;

use cerebro_core::{Capture, CaptureSource, CreateCaptureRequest};
use cerebro_jobs::PipelineOutcome;

use crate::{ApiError, AppState, Owner};

#[derive(Debug, Deserialize)]
pub struct CreateCaptureBody {
    pub raw_text: String,
    #[serde(default = "default_source")]
    pub source: CaptureSource,
    #[serde(default)]
    pub audio_url: Option<String>,
}

fn default_source() -> CaptureSource {
    CaptureSource::Text
}

/// Store a capture and schedule its classification.
///
/// Responds 201 with `{capture, job_id}` once both rows are committed. The
/// capture is classified by the job worker; poll `/api/v1/jobs/:id` or the
/// capture itself for the result.
#[instrument(
    skip(state, body),
    fields(subsystem = "api", component = "captures", op = "create", owner_id = %owner_id)
)]
pub async fn create_capture(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    Json(body): Json<CreateCaptureBody>,
) -> Result<impl IntoResponse, ApiError> {
    let scheduled = state
        .stores
        .captures
        .insert_and_schedule(CreateCaptureRequest {
            owner_id,
            raw_text: body.raw_text,
            source: body.source,
            audio_url: body.audio_url,
        })
        .await?;

    info!(
        capture_id = %scheduled.capture.id,
        job_id = %scheduled.job_id,
        source = scheduled.capture.source.as_str(),
        "Capture stored and classification scheduled"
    );
    Ok((StatusCode::CREATED, Json(scheduled)))
}

pub async fn get_capture(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    Path(id): Path<Uuid>,
) -> Result<Json<Capture>, ApiError> {
    let capture = state.stores.captures.fetch(owner_id, id).await?;
    Ok(Json(capture))
}

/// Run the pipeline for one capture now and return
/// `{classification, destination, newly_filed}`.
///
/// A capture that is already processed is not classified again; its
/// existing ledger entry comes back with `newly_filed: false`.
#[instrument(
    skip(state),
    fields(subsystem = "api", component = "captures", op = "classify", owner_id = %owner_id)
)]
pub async fn classify_capture(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    Path(id): Path<Uuid>,
) -> Result<Json<PipelineOutcome>, ApiError> {
    let outcome = state.pipeline.process_capture(owner_id, id).await?;
    Ok(Json(outcome))
}

/// Ledger entries written for a capture (at most one).
pub async fn list_capture_classifications(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    // 404 for unknown or foreign captures rather than an empty list.
    state.stores.captures.fetch(owner_id, id).await?;

    let entries: Vec<_> = state
        .stores
        .classifications
        .get_by_capture(owner_id, id)
        .await?
        .into_iter()
        .collect();

    Ok(Json(serde_json::json!({
        "classifications": entries,
        "count": entries.len(),
    })))
}
