//! Centralized default constants for the capture pipeline.
//!
//! **This module is the single source of truth** for shared default values.
//! Config constructors (`*Config::from_env`) fall back to these when the
//! corresponding environment variable is unset.

// =============================================================================
// CONFIDENCE GATE
// =============================================================================

/// Confidence threshold used when the owner's profile has none.
pub const CONFIDENCE_THRESHOLD: f64 = 0.6;

// =============================================================================
// CAPTURES
// =============================================================================

/// Maximum raw text length accepted at ingestion, in characters.
pub const CAPTURE_MAX_CHARS: usize = 10_000;

/// Length (in characters) of a primary label seeded from raw capture text.
pub const SEEDED_LABEL_MAX_CHARS: usize = 120;

// =============================================================================
// CLASSIFICATION
// =============================================================================

/// Default chat-completion endpoint (OpenRouter, OpenAI-compatible).
pub const LLM_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Default classification model.
pub const LLM_MODEL: &str = "openai/gpt-4o-mini";

/// Upper bound on tokens in a classification response.
pub const LLM_MAX_TOKENS: u32 = 500;

/// Per-attempt timeout for the classification call in seconds.
pub const CLASSIFY_TIMEOUT_SECS: u64 = 30;

/// Automatic retries after the first failed provider call.
pub const CLASSIFY_MAX_RETRIES: u32 = 2;

/// Initial retry backoff in milliseconds; doubles on each retry.
pub const CLASSIFY_BACKOFF_MS: u64 = 1_000;

// =============================================================================
// STORAGE
// =============================================================================

/// Timeout applied to each storage call made by the pipeline, in seconds.
pub const STORAGE_TIMEOUT_SECS: u64 = 10;

/// Attempts at committing a filing before the storage error propagates.
pub const FILING_COMMIT_ATTEMPTS: u32 = 3;

/// Delay between filing commit attempts in milliseconds.
pub const FILING_COMMIT_BACKOFF_MS: u64 = 250;

// =============================================================================
// PAGINATION
// =============================================================================

/// Default page size for ledger listings and the review queue.
pub const PAGE_LIMIT: i64 = 50;

/// Largest page size accepted by list endpoints.
pub const PAGE_LIMIT_MAX: i64 = 500;

// =============================================================================
// SERVER
// =============================================================================

/// Default HTTP server port.
pub const SERVER_PORT: u16 = 3000;

/// Default CORS max-age in seconds (1 hour).
pub const CORS_MAX_AGE_SECS: u64 = 3600;

/// Maximum request body size in bytes.
pub const MAX_BODY_SIZE_BYTES: usize = 256 * 1024;

/// Default event broadcast channel capacity.
pub const EVENT_BUS_CAPACITY: usize = 256;

// =============================================================================
// JOB PROCESSING
// =============================================================================

/// Default maximum retry count for failed jobs.
pub const JOB_MAX_RETRIES: i32 = 3;

/// Default job worker poll interval in milliseconds.
pub const JOB_POLL_INTERVAL_MS: u64 = 500;

/// Default maximum concurrent jobs per worker.
pub const JOB_MAX_CONCURRENT: usize = 4;

/// Default job execution timeout in seconds.
///
/// Must exceed the worst-case classification path: three 30s attempts plus
/// backoff plus storage calls.
pub const JOB_TIMEOUT_SECS: u64 = 180;

// =============================================================================
// STALE CAPTURE SWEEP
// =============================================================================

/// Interval between sweeps for unprocessed captures, in seconds.
pub const SWEEP_INTERVAL_SECS: u64 = 60;

/// Age an unprocessed capture must reach before the sweep re-queues it.
pub const SWEEP_GRACE_SECS: u64 = 300;

/// Maximum captures re-queued per sweep.
pub const SWEEP_BATCH: i64 = 100;

/// A job still `running` this long after it started is treated as
/// abandoned by a dead worker and returned to the queue.
pub const SWEEP_ABANDON_SECS: u64 = 2 * JOB_TIMEOUT_SECS;
