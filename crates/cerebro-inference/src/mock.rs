//! Scripted generation backend for deterministic testing.
//!
//! Replies are consumed in order; once the script runs out the fallback
//! reply is used for every further call.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use cerebro_inference::mock::{MockGenerationBackend, MockReply};
//!
//! let backend = MockGenerationBackend::new()
//!     .then(MockReply::Unavailable("HTTP 503".into()))
//!     .then_classification("task", 0.95, serde_json::json!({"name": "Buy milk"}));
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};

use cerebro_core::{Error, GenerationBackend, GenerationOptions, Result};

/// One scripted outcome of a generation call.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Message content returned as-is.
    Content(String),
    /// Transient provider failure (`Error::ProviderUnavailable`).
    Unavailable(String),
    /// Permanent provider failure (`Error::Inference`).
    Fail(String),
    /// Never answers; exercises caller timeouts.
    Hang,
}

/// A recorded generation call.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub system: String,
    pub prompt: String,
    pub options: GenerationOptions,
}

#[derive(Debug)]
struct MockState {
    script: VecDeque<MockReply>,
    fallback: MockReply,
    calls: Vec<MockCall>,
}

/// Mock backend for testing classifier and pipeline behaviour.
#[derive(Clone)]
pub struct MockGenerationBackend {
    model: String,
    latency: Option<Duration>,
    state: Arc<Mutex<MockState>>,
}

impl Default for MockGenerationBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// JSON a well-behaved model would return for a classification.
pub fn classification_json(category: &str, confidence: f64, extracted: JsonValue) -> String {
    json!({
        "category": category,
        "confidence": confidence,
        "extracted": extracted,
    })
    .to_string()
}

impl MockGenerationBackend {
    /// Create a backend whose fallback reply is an unparseable apology.
    pub fn new() -> Self {
        Self {
            model: "mock-model".to_string(),
            latency: None,
            state: Arc::new(Mutex::new(MockState {
                script: VecDeque::new(),
                fallback: MockReply::Content("Sorry, I cannot classify this.".to_string()),
                calls: Vec::new(),
            })),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Delay every reply by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Reply used once the script is exhausted.
    pub fn with_fallback(self, reply: MockReply) -> Self {
        self.lock().fallback = reply;
        self
    }

    /// Append a reply to the script.
    pub fn then(self, reply: MockReply) -> Self {
        self.push(reply);
        self
    }

    /// Append a well-formed classification reply to the script.
    pub fn then_classification(self, category: &str, confidence: f64, extracted: JsonValue) -> Self {
        self.then(MockReply::Content(classification_json(
            category, confidence, extracted,
        )))
    }

    /// Append a reply to a shared backend.
    pub fn push(&self, reply: MockReply) {
        self.lock().script.push_back(reply);
    }

    /// All calls received so far.
    pub fn calls(&self) -> Vec<MockCall> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        // A panicking test thread must not poison every later assertion.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn next_reply(&self, call: MockCall) -> MockReply {
        let mut state = self.lock();
        state.calls.push(call);
        match state.script.pop_front() {
            Some(reply) => reply,
            None => state.fallback.clone(),
        }
    }
}

#[async_trait]
impl GenerationBackend for MockGenerationBackend {
    async fn generate_with_system(
        &self,
        system: &str,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String> {
        let reply = self.next_reply(MockCall {
            system: system.to_string(),
            prompt: prompt.to_string(),
            options: options.clone(),
        });

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        match reply {
            MockReply::Content(content) => Ok(content),
            MockReply::Unavailable(msg) => Err(Error::ProviderUnavailable(msg)),
            MockReply::Fail(msg) => Err(Error::Inference(msg)),
            MockReply::Hang => std::future::pending().await,
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
