//! # cerebro-core
//!
//! Core types, traits, and the confidence gate for the cerebro capture
//! classification pipeline.
//!
//! This crate performs no I/O. Storage, inference and scheduling live in
//! the other cerebro crates behind the traits defined here.

pub mod defaults;
pub mod error;
pub mod gate;
pub mod models;
pub mod traits;
pub mod uuid_utils;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use gate::{decide, effective_threshold, ConfidenceGate, Decision};
pub use models::*;
pub use traits::*;
pub use uuid_utils::{extract_timestamp, new_v7};
