//! OpenAI-compatible chat-completion backend (OpenRouter by default).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info};

use cerebro_core::{defaults, Error, GenerationBackend, GenerationOptions, Result};

use super::error::{to_core_error, ProviderErrorCode};
use super::types::*;

/// Longest slice of an unparseable error body kept in the error message.
const ERROR_BODY_PREVIEW_CHARS: usize = 200;

/// Configuration for the OpenAI-compatible backend.
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    /// Base URL for the API endpoint.
    pub base_url: String,
    /// API key for authentication (optional for local endpoints).
    pub api_key: Option<String>,
    /// Model used for classification.
    pub model: String,
    /// Request timeout in seconds.
    pub timeout_seconds: u64,
    /// Upper bound on completion tokens.
    pub max_tokens: u32,
    /// HTTP-Referer header for OpenRouter.ai rankings (optional).
    pub http_referer: Option<String>,
    /// X-Title header for app name on OpenRouter.ai (optional).
    pub x_title: Option<String>,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::LLM_BASE_URL.to_string(),
            api_key: None,
            model: defaults::LLM_MODEL.to_string(),
            timeout_seconds: defaults::CLASSIFY_TIMEOUT_SECS,
            max_tokens: defaults::LLM_MAX_TOKENS,
            http_referer: None,
            x_title: None,
        }
    }
}

impl OpenAIConfig {
    /// Read `LLM_*` environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let env = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        Self {
            base_url: env("LLM_BASE_URL").unwrap_or_else(|| defaults::LLM_BASE_URL.to_string()),
            api_key: env("LLM_API_KEY"),
            model: env("LLM_MODEL").unwrap_or_else(|| defaults::LLM_MODEL.to_string()),
            timeout_seconds: env("LLM_TIMEOUT_SECS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults::CLASSIFY_TIMEOUT_SECS),
            max_tokens: env("LLM_MAX_TOKENS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults::LLM_MAX_TOKENS),
            http_referer: env("LLM_HTTP_REFERER"),
            x_title: env("LLM_X_TITLE"),
        }
    }
}

/// OpenAI-compatible generation backend.
pub struct OpenAIBackend {
    client: Client,
    config: OpenAIConfig,
}

impl OpenAIBackend {
    /// Create a new backend with the given configuration.
    pub fn new(config: OpenAIConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            subsystem = "inference",
            component = "openai",
            url = %config.base_url,
            model = %config.model,
            timeout_secs = config.timeout_seconds,
            "Initializing OpenAI-compatible backend"
        );

        Ok(Self { client, config })
    }

    /// Create with default configuration.
    pub fn with_defaults() -> Result<Self> {
        Self::new(OpenAIConfig::default())
    }

    /// Create from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(OpenAIConfig::from_env())
    }

    /// Get the current configuration.
    pub fn config(&self) -> &OpenAIConfig {
        &self.config
    }

    /// Build a POST request with authentication and attribution headers.
    fn build_request(&self, endpoint: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), endpoint);
        let mut req = self.client.post(&url);

        if let Some(ref api_key) = self.config.api_key {
            req = req.bearer_auth(api_key);
        }

        // OpenRouter attribution
        if let Some(ref referer) = self.config.http_referer {
            req = req.header("HTTP-Referer", referer);
        }

        if let Some(ref title) = self.config.x_title {
            req = req.header("X-Title", title);
        }

        req.header("Content-Type", "application/json")
    }

    fn build_chat_request(
        &self,
        system: &str,
        prompt: &str,
        options: &GenerationOptions,
    ) -> ChatCompletionRequest {
        let mut messages = Vec::with_capacity(2);
        if !system.is_empty() {
            messages.push(ChatMessage::system(system));
        }
        messages.push(ChatMessage::user(prompt));

        ChatCompletionRequest {
            model: self.config.model.clone(),
            messages,
            temperature: options.temperature,
            max_tokens: Some(
                options
                    .max_tokens
                    .map_or(self.config.max_tokens, |m| m.min(self.config.max_tokens)),
            ),
            response_format: options.json_response.then(ResponseFormat::json_object),
        }
    }
}

/// Turn a non-success response into a core error, keeping the provider's message.
async fn error_from_response(response: reqwest::Response) -> Error {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();

    let (message, error_type) = match serde_json::from_str::<ProviderErrorResponse>(&body) {
        Ok(parsed) => (parsed.error.message, parsed.error.error_type.unwrap_or_default()),
        Err(_) => (
            body.chars().take(ERROR_BODY_PREVIEW_CHARS).collect(),
            String::new(),
        ),
    };

    let code = ProviderErrorCode::from_response(status, &error_type);
    to_core_error(code, status, &message)
}

#[async_trait]
impl GenerationBackend for OpenAIBackend {
    async fn generate_with_system(
        &self,
        system: &str,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String> {
        debug!(
            subsystem = "inference",
            component = "openai",
            op = "generate",
            model = %self.config.model,
            system_len = system.len(),
            prompt_len = prompt.len(),
            "Sending chat completion"
        );

        let request = self.build_chat_request(system, prompt, options);

        // reqwest timeouts and connect failures map to ProviderUnavailable
        let response = self
            .build_request("/chat/completions")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let result: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::Inference(format!("Failed to decode completion: {}", e)))?;

        let choice = result
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::Inference("Completion contained no choices".to_string()))?;
        let content = choice.message.content.unwrap_or_default();

        debug!(
            subsystem = "inference",
            component = "openai",
            op = "generate",
            response_len = content.len(),
            finish_reason = choice.finish_reason.as_deref().unwrap_or("unknown"),
            "Chat completion received"
        );
        Ok(content)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}
