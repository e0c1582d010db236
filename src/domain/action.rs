//! Action records - the append-only log of everything a session did
//!
//! One record is written per tool invocation (successful or not) and one per
//! final model turn that produced no tool request.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::id::now_ms;

/// What kind of step produced the record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    ModelCall,
    ToolCall,
}

/// Classification of a failed tool record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionErrorKind {
    /// Input did not match the tool schema
    Validation,
    /// Blocked by an approval rule
    Permission,
    /// A human rejected the pending call
    Rejected,
    /// The capability itself failed
    Tool,
    /// The model asked for a tool the agent does not have
    UnknownTool,
}

impl ActionErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Permission => "permission",
            Self::Rejected => "rejected",
            Self::Tool => "tool",
            Self::UnknownTool => "unknown_tool",
        }
    }
}

/// Immutable record of one session step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    /// Assigned when appended to a session
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub session_id: String,
    /// 1-based position within the session
    #[serde(default)]
    pub sequence: u32,

    pub action_type: ActionType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,

    pub tokens_used: u64,
    pub cost_usd: f64,
    pub duration_ms: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ActionErrorKind>,

    pub created_at: i64,
}

impl ActionRecord {
    /// A final model turn (no tool requested)
    pub fn model_call(tokens_used: u64, cost_usd: f64, duration_ms: u64) -> Self {
        Self {
            id: String::new(),
            session_id: String::new(),
            sequence: 0,
            action_type: ActionType::ModelCall,
            tool_name: None,
            input: None,
            output: None,
            tokens_used,
            cost_usd,
            duration_ms,
            error: None,
            error_kind: None,
            created_at: now_ms(),
        }
    }

    /// A tool invocation; finish with `with_output` or `with_error`
    pub fn tool_call(tool_name: impl Into<String>, input: Value) -> Self {
        Self {
            action_type: ActionType::ToolCall,
            tool_name: Some(tool_name.into()),
            input: Some(input),
            ..Self::model_call(0, 0.0, 0)
        }
    }

    pub fn with_output(mut self, output: Value) -> Self {
        self.output = Some(output);
        self.error = None;
        self.error_kind = None;
        self
    }

    pub fn with_error(mut self, kind: ActionErrorKind, message: impl Into<String>) -> Self {
        self.output = None;
        self.error = Some(message.into());
        self.error_kind = Some(kind);
        self
    }

    /// Attribute model usage to this record
    pub fn with_usage(mut self, tokens_used: u64, cost_usd: f64) -> Self {
        self.tokens_used = tokens_used;
        self.cost_usd = cost_usd;
        self
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}
