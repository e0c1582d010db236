//! Error types for agentflow
//!
//! Centralized error handling using thiserror. Failures that are local to a
//! single tool call (bad input, blocked tool, capability error) are recorded as
//! values on an `ActionRecord` instead and never surface here.

use thiserror::Error;

/// All error types that can occur in agentflow
#[derive(Debug, Error)]
pub enum AgentflowError {
    /// Tool input did not match the tool's schema
    #[error("Validation error: {0}")]
    Validation(String),

    /// Tool is blocked for this agent by an approval rule
    #[error("Permission denied: {0}")]
    Permission(String),

    /// A session hit one of its safety limits
    #[error("Safety limit exceeded: {reason}")]
    SafetyLimitExceeded { reason: String },

    /// External provider (model API, webhook, mailer) failed; retryable by the job queue
    #[error("Provider error: {0}")]
    Provider(String),

    /// Workflow graph contains a cycle
    #[error("Cycle detected in workflow graph ({remaining} node(s) never reached zero in-degree)")]
    CycleDetected { remaining: usize },

    /// No handler registered for a node type
    #[error("No handler registered for node type: {0}")]
    NoHandler(String),

    /// Workflow definition is malformed
    #[error("Invalid workflow: {0}")]
    InvalidWorkflow(String),

    /// Record not found in storage
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid state transition or operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Tool registry or capability error outside a session
    #[error("Tool error: {0}")]
    Tool(String),

    /// Template rendering failed
    #[error("Template error: {0}")]
    Template(String),

    /// Storage/persistence error
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl AgentflowError {
    /// Returns true if the outer job queue may retry the operation
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Provider(_))
    }

    /// Returns true if the error stems from an invalid workflow or registry setup
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::CycleDetected { .. } | Self::NoHandler(_) | Self::InvalidWorkflow(_)
        )
    }
}

impl From<reqwest::Error> for AgentflowError {
    fn from(err: reqwest::Error) -> Self {
        Self::Provider(err.to_string())
    }
}

/// Result type alias for agentflow operations
pub type Result<T> = std::result::Result<T, AgentflowError>;
