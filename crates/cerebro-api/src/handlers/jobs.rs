//! Job status.

use axum::extract::{Path, State};
use axum::Json;
use uuid::Uuid;

use cerebro_core::Job;

use crate::{ApiError, AppState, Owner};

/// Status of a queued job. Jobs belonging to another owner are reported as
/// missing.
pub async fn get_job(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    Path(id): Path<Uuid>,
) -> Result<Json<Job>, ApiError> {
    state
        .stores
        .jobs
        .get(id)
        .await?
        .filter(|job| job.owner_id == Some(owner_id))
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Job {} not found", id)))
}
