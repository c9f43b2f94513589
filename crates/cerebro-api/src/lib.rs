//! # cerebro-api
//!
//! HTTP surface for the cerebro capture pipeline.
//!
//! Every `/api/v1` route is scoped to the owner named in the `X-Owner-Id`
//! header, which the upstream auth layer sets after authenticating the
//! caller. Requests without a valid owner are rejected with 401.
//!
//! | Method | Path | Purpose |
//! |--------|------|---------|
//! | POST | `/api/v1/captures` | Store a capture and schedule its classification |
//! | GET | `/api/v1/captures/:id` | Fetch a capture |
//! | POST | `/api/v1/captures/:id/classify` | Run the pipeline now |
//! | GET | `/api/v1/captures/:id/classifications` | Ledger entries for a capture |
//! | GET | `/api/v1/classifications` | Ledger, optionally filtered by `status` |
//! | GET | `/api/v1/classifications/:id` | One ledger entry |
//! | GET | `/api/v1/classifications/:id/corrections` | Correction audit trail |
//! | POST | `/api/v1/classifications/:id/resolve` | Apply a reviewer decision |
//! | GET | `/api/v1/review-queue` | Entries awaiting review |
//! | GET | `/api/v1/jobs/:id` | Job status |
//! | GET | `/health` | Liveness |

pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;

use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, HeaderName, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use cerebro_jobs::{ClassificationPipeline, ReclassificationHandler, Stores};

pub use config::ServerConfig;
pub use error::ApiError;
pub use extract::{Owner, Pagination, OWNER_HEADER};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub stores: Stores,
    pub pipeline: Arc<ClassificationPipeline>,
    pub resolver: Arc<ReclassificationHandler>,
}

impl AppState {
    /// State whose resolver shares the pipeline's stores.
    pub fn new(pipeline: Arc<ClassificationPipeline>) -> Self {
        let stores = pipeline.stores().clone();
        let resolver = Arc::new(ReclassificationHandler::new(&stores));
        Self {
            stores,
            pipeline,
            resolver,
        }
    }
}

/// Generates time-ordered UUIDv7 request correlation IDs.
#[derive(Clone, Default)]
pub struct MakeRequestUuidV7;

impl MakeRequestId for MakeRequestUuidV7 {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = Uuid::now_v7().to_string().parse().ok()?;
        Some(RequestId::new(id))
    }
}

/// Build the application router with its middleware stack.
pub fn router(state: AppState, config: &ServerConfig) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        // Captures
        .route("/api/v1/captures", post(handlers::captures::create_capture))
        .route("/api/v1/captures/:id", get(handlers::captures::get_capture))
        .route(
            "/api/v1/captures/:id/classify",
            post(handlers::captures::classify_capture),
        )
        .route(
            "/api/v1/captures/:id/classifications",
            get(handlers::captures::list_capture_classifications),
        )
        // Ledger
        .route(
            "/api/v1/classifications",
            get(handlers::classifications::list_classifications),
        )
        .route(
            "/api/v1/classifications/:id",
            get(handlers::classifications::get_classification),
        )
        .route(
            "/api/v1/classifications/:id/corrections",
            get(handlers::classifications::list_corrections),
        )
        .route(
            "/api/v1/classifications/:id/resolve",
            post(handlers::classifications::resolve_classification),
        )
        .route(
            "/api/v1/review-queue",
            get(handlers::classifications::review_queue),
        )
        // Jobs
        .route("/api/v1/jobs/:id", get(handlers::jobs::get_job))
        // Middleware
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7))
        .layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(config.allowed_origins()))
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([
                    header::AUTHORIZATION,
                    header::CONTENT_TYPE,
                    header::ACCEPT,
                    HeaderName::from_static(OWNER_HEADER),
                ])
                .max_age(Duration::from_secs(config.cors_max_age_secs)),
        )
        .layer(RequestBodyLimitLayer::new(config.max_body_bytes))
        .with_state(state)
}
