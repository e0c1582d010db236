//! Built-in tools shipped with the binary

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::error::{AgentflowError, Result};

use super::catalog::ToolRegistry;
use super::definition::{ExecutionContext, Tool, ToolCapability};

/// Response bodies larger than this are truncated before reaching the model
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Outbound HTTP request
pub struct HttpRequest {
    client: reqwest::Client,
}

impl HttpRequest {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    pub fn tool(self) -> Tool {
        Tool::new(
            "http_request",
            "Perform an HTTP request and return the status code and response body",
            Arc::new(self),
        )
        .with_requires_approval(true)
        .with_schema(json!({
            "type": "object",
            "properties": {
                "url": { "type": "string", "description": "Absolute URL" },
                "method": { "type": "string", "enum": ["GET", "POST", "PUT", "PATCH", "DELETE"] },
                "body": { "type": "object", "description": "JSON body for write methods" }
            },
            "required": ["url"],
            "additionalProperties": false
        }))
    }
}

#[async_trait]
impl ToolCapability for HttpRequest {
    async fn execute(&self, input: Value, ctx: &ExecutionContext) -> Result<Value> {
        let url = input
            .get("url")
            .and_then(|u| u.as_str())
            .ok_or_else(|| AgentflowError::Validation("url is required".to_string()))?;
        let method = input.get("method").and_then(|m| m.as_str()).unwrap_or("GET");
        let method = reqwest::Method::from_bytes(method.as_bytes())
            .map_err(|e| AgentflowError::Validation(format!("invalid method: {}", e)))?;

        log::info!("http_request {} {} for agent {}", method, url, ctx.agent_id);

        let mut request = self.client.request(method, url);
        if let Some(body) = input.get("body") {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AgentflowError::Tool(format!("request failed: {}", e)))?;
        let status = response.status().as_u16();
        let mut body = response
            .text()
            .await
            .map_err(|e| AgentflowError::Tool(format!("failed to read body: {}", e)))?;

        if body.len() > MAX_BODY_BYTES {
            let mut cut = MAX_BODY_BYTES;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
            body.push_str("\n... [body truncated]");
        }

        Ok(json!({ "status": status, "body": body }))
    }
}

/// Current UTC time
pub struct CurrentTime;

impl CurrentTime {
    pub fn tool() -> Tool {
        Tool::new("current_time", "Return the current UTC time", Arc::new(CurrentTime))
    }
}

#[async_trait]
impl ToolCapability for CurrentTime {
    async fn execute(&self, _input: Value, _ctx: &ExecutionContext) -> Result<Value> {
        let now = chrono::Utc::now();
        Ok(json!({
            "iso8601": now.to_rfc3339(),
            "unix_ms": now.timestamp_millis()
        }))
    }
}

/// Registry with every built-in tool
pub fn builtin_registry(http_timeout: Duration) -> Result<ToolRegistry> {
    ToolRegistry::new()
        .with_tool(HttpRequest::new(http_timeout)?.tool())?
        .with_tool(CurrentTime::tool())
}
