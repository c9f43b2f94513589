//! HTTP handlers, grouped by resource.

pub mod captures;
pub mod classifications;
pub mod jobs;

use axum::response::IntoResponse;
use axum::Json;

pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
