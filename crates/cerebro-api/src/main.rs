use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cerebro_api::{router, AppState, ServerConfig};
use cerebro_db::Database;
use cerebro_inference::{LlmClassifier, OpenAIBackend, RetryPolicy};
use cerebro_jobs::{
    ClassificationPipeline, ClassifyCaptureHandler, PipelineConfig, StaleCaptureSweeper, Stores,
    SweepConfig, WorkerBuilder, WorkerConfig,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with configurable output
    //
    // Environment variables:
    //   LOG_FORMAT  - "json" or "text" (default: "text")
    //   LOG_FILE    - path to log file (optional, enables file logging)
    //   LOG_ANSI    - "true"/"false" override ANSI colors (auto-detected by default)
    //   RUST_LOG    - standard env filter
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "cerebro_api=debug,cerebro_jobs=info,tower_http=debug".into());

    let registry = tracing_subscriber::registry().with(env_filter);

    // Keep the guard alive so buffered file output is flushed on exit.
    let _file_guard = if let Some(ref path) = log_file {
        let file_dir = std::path::Path::new(path)
            .parent()
            .unwrap_or(std::path::Path::new("."));
        let file_name = std::path::Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("cerebro-api.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(log_ansi.unwrap_or(false));
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        // Console-only output
        if log_format == "json" {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer();
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );

    let config = ServerConfig::from_env();

    // Database
    let db = Database::connect(&config.database_url).await?;
    db.migrate().await?;
    info!(subsystem = "api", "Database connected and migrated");
    let stores = Stores::from_database(&db);

    // Classification pipeline
    let backend = OpenAIBackend::from_env()?;
    let classifier = LlmClassifier::with_policy(Arc::new(backend), RetryPolicy::from_env());
    let pipeline = Arc::new(ClassificationPipeline::new(
        stores.clone(),
        Arc::new(classifier),
        PipelineConfig::from_env(),
    ));

    // Background processing
    let worker = WorkerBuilder::from_stores(&stores)
        .with_config(WorkerConfig::from_env())
        .with_handler(ClassifyCaptureHandler::new(pipeline.clone()))
        .build()
        .await;
    let worker = worker.start();
    let sweeper = StaleCaptureSweeper::new(&stores, SweepConfig::from_env()).start();

    let app = router(AppState::new(pipeline), &config);

    // Start server
    let addr = config.socket_addr()?;
    info!(subsystem = "api", %addr, "Starting server");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!(subsystem = "api", "Server stopped; shutting down background tasks");
    // A disabled worker or sweeper has already exited; nothing to stop.
    if let Err(e) = sweeper.shutdown().await {
        warn!(subsystem = "api", error = %e, "Sweeper was not running");
    }
    if let Err(e) = worker.shutdown().await {
        warn!(subsystem = "api", error = %e, "Job worker was not running");
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(subsystem = "api", error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
