//! OpenAI-compatible inference backend.
//!
//! Works against any endpoint speaking the OpenAI chat-completions API:
//! OpenRouter (the default), OpenAI itself, or a local server such as vLLM
//! or LM Studio.
//!
//! # Configuration
//!
//! | Variable | Default |
//! |----------|---------|
//! | `LLM_BASE_URL` | `https://openrouter.ai/api/v1` |
//! | `LLM_API_KEY` | none |
//! | `LLM_MODEL` | `openai/gpt-4o-mini` |
//! | `LLM_TIMEOUT_SECS` | `30` |
//! | `LLM_MAX_TOKENS` | `500` |
//! | `LLM_HTTP_REFERER` / `LLM_X_TITLE` | none (OpenRouter attribution) |
//!
//! # Example
//!
//! ```rust,no_run
//! use cerebro_core::{GenerationBackend, GenerationOptions};
//! use cerebro_inference::openai::OpenAIBackend;
//!
//! #[tokio::main]
//! async fn main() -> cerebro_core::Result<()> {
//!     let backend = OpenAIBackend::from_env()?;
//!     let reply = backend
//!         .generate_with_system("Reply in JSON.", "Buy milk", &GenerationOptions::default())
//!         .await?;
//!     println!("{}", reply);
//!     Ok(())
//! }
//! ```

mod backend;
mod error;
mod types;

pub use backend::{OpenAIBackend, OpenAIConfig};
pub use error::{to_core_error, ProviderErrorCode};
pub use types::*;
