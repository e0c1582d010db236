//! Tool definitions and the capability seam
//!
//! A `Tool` pairs LLM-facing metadata (name, description, input schema) with
//! an execution capability and the approval/timeout policy applied around it.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::llm::ToolDefinition;

/// Default timeout for a single capability call
pub const DEFAULT_TOOL_TIMEOUT_MS: u64 = 30_000;

/// Who is calling a tool, passed to every capability
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    pub session_id: String,
    pub agent_id: String,
    pub project_id: String,
    pub workflow_run_id: Option<String>,
}

/// The side-effecting half of a tool
#[async_trait]
pub trait ToolCapability: Send + Sync {
    async fn execute(&self, input: Value, ctx: &ExecutionContext) -> Result<Value>;
}

/// A registered tool
#[derive(Clone)]
pub struct Tool {
    /// Tool name (e.g., "http_request")
    pub name: String,
    /// Human-readable description for the LLM
    pub description: String,
    /// JSON schema for input parameters
    pub input_schema: Value,
    /// Calls pause for human review unless a rule says otherwise
    pub requires_approval: bool,
    /// Timeout in milliseconds
    pub timeout_ms: Option<u64>,
    capability: Arc<dyn ToolCapability>,
}

impl Tool {
    /// Create a new tool with an empty object schema
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        capability: Arc<dyn ToolCapability>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {},
                "required": []
            }),
            requires_approval: false,
            timeout_ms: None,
            capability,
        }
    }

    /// Set input schema
    pub fn with_schema(mut self, schema: Value) -> Self {
        self.input_schema = schema;
        self
    }

    pub fn with_requires_approval(mut self, requires_approval: bool) -> Self {
        self.requires_approval = requires_approval;
        self
    }

    /// Set timeout
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn effective_timeout_ms(&self) -> u64 {
        self.timeout_ms.unwrap_or(DEFAULT_TOOL_TIMEOUT_MS)
    }

    pub async fn execute(&self, input: Value, ctx: &ExecutionContext) -> Result<Value> {
        self.capability.execute(input, ctx).await
    }

    /// Convert to LLM ToolDefinition for API calls
    pub fn to_llm_definition(&self) -> ToolDefinition {
        ToolDefinition::new(self.name.clone(), self.description.clone(), self.input_schema.clone())
    }
}

impl fmt::Debug for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("requires_approval", &self.requires_approval)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}
