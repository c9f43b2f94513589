//! Server configuration.

use std::net::SocketAddr;

use axum::http::HeaderValue;
use tracing::warn;

use cerebro_core::{defaults, Error, Result};

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// Comma-separated CORS origins, as read from `ALLOWED_ORIGINS`.
    pub allowed_origins: String,
    pub cors_max_age_secs: u64,
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: defaults::SERVER_PORT,
            database_url: "postgres://localhost/cerebro".to_string(),
            allowed_origins: "http://localhost:3000".to_string(),
            cors_max_age_secs: defaults::CORS_MAX_AGE_SECS,
            max_body_bytes: defaults::MAX_BODY_SIZE_BYTES,
        }
    }
}

impl ServerConfig {
    /// | Variable | Default |
    /// |----------|---------|
    /// | `HOST` | `0.0.0.0` |
    /// | `PORT` | `3000` |
    /// | `DATABASE_URL` | `postgres://localhost/cerebro` |
    /// | `ALLOWED_ORIGINS` | `http://localhost:3000` |
    /// | `MAX_BODY_SIZE_BYTES` | `262144` |
    pub fn from_env() -> Self {
        let base = Self::default();
        Self {
            host: std::env::var("HOST").unwrap_or(base.host),
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(base.port),
            database_url: std::env::var("DATABASE_URL").unwrap_or(base.database_url),
            allowed_origins: std::env::var("ALLOWED_ORIGINS").unwrap_or(base.allowed_origins),
            cors_max_age_secs: base.cors_max_age_secs,
            max_body_bytes: std::env::var("MAX_BODY_SIZE_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(base.max_body_bytes),
        }
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| Error::Config(format!("invalid listen address: {}", e)))
    }

    /// Parsed CORS origins. Unparseable entries are skipped with a warning.
    pub fn allowed_origins(&self) -> Vec<HeaderValue> {
        self.allowed_origins
            .split(',')
            .filter_map(|s| {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return None;
                }
                match trimmed.parse::<HeaderValue>() {
                    Ok(v) => Some(v),
                    Err(e) => {
                        warn!(subsystem = "api", origin = trimmed, error = %e, "Invalid CORS origin");
                        None
                    }
                }
            })
            .collect()
    }
}
