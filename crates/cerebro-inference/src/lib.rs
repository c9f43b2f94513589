//! # cerebro-inference
//!
//! Classification client for the cerebro capture pipeline.
//!
//! This crate provides:
//! - An OpenAI-compatible chat-completion backend (feature `openai`, default),
//!   pointed at OpenRouter unless configured otherwise
//! - The versioned classification prompt
//! - Strict parsing of the model's JSON reply, with confidence clamping
//! - [`LlmClassifier`], which adds per-attempt timeouts and bounded retry
//! - A scripted mock backend (feature `mock`)
//!
//! # Feature Flags
//!
//! - `openai` (default): Enable the OpenAI-compatible backend
//! - `mock`: Enable [`mock::MockGenerationBackend`] for dependent crates' tests
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cerebro_inference::{Classifier, LlmClassifier, OpenAIBackend, RetryPolicy};
//!
//! #[tokio::main]
//! async fn main() -> cerebro_inference::Result<()> {
//!     let backend = Arc::new(OpenAIBackend::from_env()?);
//!     let classifier = LlmClassifier::with_policy(backend, RetryPolicy::from_env());
//!     match classifier.classify("Buy milk").await {
//!         Ok(result) => println!("{} ({:.2})", result.category(), result.confidence),
//!         Err(err) => println!("needs review: {}", err.summary()),
//!     }
//!     Ok(())
//! }
//! ```

pub mod classifier;
pub mod parse;
pub mod prompt;

#[cfg(feature = "openai")]
pub mod openai;

// Scripted backend for tests
#[cfg(any(test, feature = "mock"))]
pub mod mock;

// Re-export core types
pub use cerebro_core::*;

pub use classifier::{LlmClassifier, RetryPolicy};
#[cfg(any(test, feature = "mock"))]
pub use mock::{MockGenerationBackend, MockReply};
#[cfg(feature = "openai")]
pub use openai::{OpenAIBackend, OpenAIConfig};
pub use parse::{clamp_confidence, parse_classification};
pub use prompt::{CLASSIFICATION_PROMPT, CLASSIFICATION_PROMPT_VERSION};
