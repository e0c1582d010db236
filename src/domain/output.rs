//! Node outputs and workflow execution results

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::domain::suspension::Suspension;
use crate::domain::workflow::NodeType;
use crate::error::AgentflowError;
use crate::id::now_ms;

/// Outcome of a single node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Completed,
    Failed,
    Skipped,
}

/// Classifies a failure so callers can tell limits, providers, tools and
/// configuration mistakes apart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    SafetyLimit,
    Provider,
    Tool,
    Configuration,
    Rejected,
    Delivery,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SafetyLimit => "safety_limit",
            Self::Provider => "provider",
            Self::Tool => "tool",
            Self::Configuration => "configuration",
            Self::Rejected => "rejected",
            Self::Delivery => "delivery",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Provider)
    }
}

/// Human-readable failure with a kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl NodeFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for NodeFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.message)
    }
}

impl From<&AgentflowError> for NodeFailure {
    fn from(err: &AgentflowError) -> Self {
        let kind = match err {
            AgentflowError::SafetyLimitExceeded { .. } => FailureKind::SafetyLimit,
            AgentflowError::Provider(_) => FailureKind::Provider,
            e if e.is_configuration() => FailureKind::Configuration,
            AgentflowError::Validation(_) | AgentflowError::Template(_) => FailureKind::Configuration,
            AgentflowError::Permission(_) => FailureKind::Rejected,
            _ => FailureKind::Tool,
        };
        Self::new(kind, err.to_string())
    }
}

/// Recorded result of executing one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeOutput {
    pub node_id: String,
    pub node_type: NodeType,
    pub status: NodeStatus,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    pub completed_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<NodeFailure>,
}

impl NodeOutput {
    pub fn completed(node_id: impl Into<String>, node_type: NodeType, data: Value) -> Self {
        Self {
            node_id: node_id.into(),
            node_type,
            status: NodeStatus::Completed,
            data,
            response: None,
            completed_at: now_ms(),
            failure: None,
        }
    }

    pub fn failed(node_id: impl Into<String>, node_type: NodeType, failure: NodeFailure) -> Self {
        Self {
            status: NodeStatus::Failed,
            data: json!({ "error": failure.message }),
            failure: Some(failure),
            ..Self::completed(node_id, node_type, Value::Null)
        }
    }

    pub fn skipped(node_id: impl Into<String>, node_type: NodeType, reason: &str) -> Self {
        Self {
            status: NodeStatus::Skipped,
            ..Self::completed(node_id, node_type, json!({ "reason": reason }))
        }
    }

    pub fn with_response(mut self, response: impl Into<String>) -> Self {
        self.response = Some(response.into());
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    pub fn is_completed(&self) -> bool {
        self.status == NodeStatus::Completed
    }
}

/// Lifecycle of a workflow run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Paused,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Terminal states never transition again
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "paused" => Some(Self::Paused),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one executor pass over a workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExecutionResult {
    pub status: RunStatus,
    pub outputs: BTreeMap<String, NodeOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused_at_node_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspension: Option<Suspension>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<NodeFailure>,
}

impl WorkflowExecutionResult {
    pub fn completed(outputs: BTreeMap<String, NodeOutput>) -> Self {
        Self {
            status: RunStatus::Completed,
            outputs,
            paused_at_node_id: None,
            suspension: None,
            error: None,
        }
    }

    pub fn failed(outputs: BTreeMap<String, NodeOutput>, error: NodeFailure) -> Self {
        Self {
            status: RunStatus::Failed,
            error: Some(error),
            ..Self::completed(outputs)
        }
    }

    pub fn paused(
        outputs: BTreeMap<String, NodeOutput>,
        node_id: impl Into<String>,
        suspension: Suspension,
    ) -> Self {
        Self {
            status: RunStatus::Paused,
            paused_at_node_id: Some(node_id.into()),
            suspension: Some(suspension),
            ..Self::completed(outputs)
        }
    }
}
