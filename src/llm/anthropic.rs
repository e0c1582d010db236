//! Anthropic API client implementation
//!
//! This module implements the LlmClient trait for the Anthropic (Claude) API.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};

use crate::llm::client::{LlmClient, LlmError};
use crate::llm::tool_parser;
use crate::llm::types::{CompletionRequest, CompletionResponse, Usage};

/// Anthropic API base URL
const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";

/// Anthropic API version
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Default model to use
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Default max tokens
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Environment variable holding the API key
pub const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

/// Configuration for the Anthropic client
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub model: String,
    pub max_tokens: u32,
    pub timeout: Duration,
    pub api_url: String,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout: Duration::from_secs(120),
            api_url: ANTHROPIC_API_URL.to_string(),
        }
    }
}

impl AnthropicConfig {
    /// Create a new config with a specific model
    pub fn with_model(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }
}

/// Anthropic API client
pub struct AnthropicClient {
    client: Client,
    api_key: String,
    config: AnthropicConfig,
    usage: Arc<Mutex<Usage>>,
}

impl AnthropicClient {
    /// Create a new Anthropic client
    ///
    /// Reads ANTHROPIC_API_KEY from environment
    pub fn new(config: AnthropicConfig) -> Result<Self, LlmError> {
        let api_key = std::env::var(API_KEY_ENV).map_err(|_| LlmError::MissingApiKey {
            env_var: API_KEY_ENV.to_string(),
        })?;

        Self::with_api_key(api_key, config)
    }

    /// Create a client with an explicit API key
    pub fn with_api_key(api_key: String, config: AnthropicConfig) -> Result<Self, LlmError> {
        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            api_key,
            config,
            usage: Arc::new(Mutex::new(Usage::default())),
        })
    }

    /// Build the request body for the Anthropic API
    ///
    /// Message content blocks serialize directly into the API's block format.
    fn build_request(&self, request: &CompletionRequest) -> Value {
        let model = request.model.as_deref().unwrap_or(&self.config.model);
        let max_tokens = request.max_tokens.unwrap_or(self.config.max_tokens);

        let mut body = json!({
            "model": model,
            "max_tokens": max_tokens,
            "messages": request.messages,
        });

        if !request.system.is_empty() {
            body["system"] = json!(request.system);
        }

        if !request.tools.is_empty() {
            let tools: Vec<Value> = request.tools.iter().map(|t| t.to_anthropic_schema()).collect();
            body["tools"] = json!(tools);
        }

        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }

        body
    }

    /// Send a request to the Anthropic API
    async fn send_request(&self, body: Value) -> Result<Value, LlmError> {
        let response = self
            .client
            .post(&self.config.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(LlmError::RateLimited {
                retry_after: Duration::from_secs(retry_after),
            });
        }

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(LlmError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json().await?)
    }

    fn record_usage(&self, usage: &Usage) {
        if let Ok(mut total) = self.usage.lock() {
            total.add(usage);
        }
    }

    /// Get cumulative token usage
    pub fn total_usage(&self) -> Usage {
        self.usage.lock().map(|u| *u).unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = self.build_request(&request);
        log::debug!(
            "anthropic request: model={} messages={} tools={}",
            body["model"],
            request.messages.len(),
            request.tools.len()
        );

        let raw = self.send_request(body).await?;
        if raw.get("content").is_none() {
            return Err(LlmError::InvalidResponse(
                "response has no content field".to_string(),
            ));
        }

        let response = tool_parser::parse_response(&raw);
        self.record_usage(&response.usage);
        Ok(response)
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

impl std::fmt::Debug for AnthropicClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicClient")
            .field("model", &self.config.model)
            .field("max_tokens", &self.config.max_tokens)
            .finish()
    }
}
