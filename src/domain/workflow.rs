//! Workflow definitions: typed nodes, branch-aware edges and run context
//!
//! Definitions are plain data loaded from YAML and snapshotted into every run
//! record, so a paused run can be resumed from persisted state alone.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AgentflowError, Result};

/// Closed set of node types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Trigger,
    Agent,
    Condition,
    Approval,
    Delay,
    Output,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trigger => "trigger",
            Self::Agent => "agent",
            Self::Condition => "condition",
            Self::Approval => "approval",
            Self::Delay => "delay",
            Self::Output => "output",
        }
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-type node configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
    Trigger(TriggerConfig),
    Agent(AgentNodeConfig),
    Condition(ConditionConfig),
    Approval(ApprovalNodeConfig),
    Delay(DelayConfig),
    Output(OutputConfig),
}

impl NodeKind {
    pub fn node_type(&self) -> NodeType {
        match self {
            Self::Trigger(_) => NodeType::Trigger,
            Self::Agent(_) => NodeType::Agent,
            Self::Condition(_) => NodeType::Condition,
            Self::Approval(_) => NodeType::Approval,
            Self::Delay(_) => NodeType::Delay,
            Self::Output(_) => NodeType::Output,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriggerConfig {
    /// Free-form source label (manual, schedule, webhook...)
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentNodeConfig {
    pub agent_id: String,
    /// Task prompt, rendered against run variables and upstream outputs
    pub prompt: String,
}

/// How a condition node decides its branch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ConditionConfig {
    /// Ask the model; true iff the reply starts with "YES"
    LlmEval {
        prompt: String,
        #[serde(default)]
        model: Option<String>,
    },
    /// Substring of the serialized upstream data (case-sensitive)
    Contains { value: String },
    /// Dot-path lookup into upstream data compared to `expected`
    JsonPath { path: String, expected: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalNodeConfig {
    pub approver_role: String,
    #[serde(default)]
    pub timeout_hours: Option<u32>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DelayUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl DelayUnit {
    pub fn millis(&self) -> u64 {
        match self {
            Self::Seconds => 1_000,
            Self::Minutes => 60_000,
            Self::Hours => 3_600_000,
            Self::Days => 86_400_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelayConfig {
    pub duration: u64,
    pub unit: DelayUnit,
}

impl DelayConfig {
    pub fn delay_ms(&self) -> u64 {
        self.duration.saturating_mul(self.unit.millis())
    }
}

/// Where an output node delivers its rendered message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "channel", rename_all = "snake_case")]
pub enum OutputChannel {
    #[default]
    Log,
    Webhook {
        #[serde(default)]
        url: Option<String>,
    },
    Email {
        #[serde(default)]
        to: Option<String>,
        #[serde(default)]
        subject: Option<String>,
    },
}

impl OutputChannel {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::Webhook { .. } => "webhook",
            Self::Email { .. } => "email",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    pub template: String,
    #[serde(default)]
    pub destination: OutputChannel,
}

/// A node in the workflow graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowNode {
    pub id: String,
    #[serde(default)]
    pub label: Option<String>,
    pub config: NodeKind,
}

impl WorkflowNode {
    pub fn new(id: impl Into<String>, config: NodeKind) -> Self {
        Self {
            id: id.into(),
            label: None,
            config,
        }
    }

    pub fn node_type(&self) -> NodeType {
        self.config.node_type()
    }
}

/// Directed edge; `source_handle` selects a condition branch ("true"/"false")
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowEdge {
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
}

impl WorkflowEdge {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            source_handle: None,
        }
    }

    pub fn with_handle(mut self, handle: impl Into<String>) -> Self {
        self.source_handle = Some(handle.into());
        self
    }
}

/// A complete workflow definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub project_id: String,
    pub nodes: Vec<WorkflowNode>,
    #[serde(default)]
    pub edges: Vec<WorkflowEdge>,
}

impl WorkflowDefinition {
    pub fn from_yaml(content: &str) -> Result<Self> {
        let def: Self = serde_yaml::from_str(content)
            .map_err(|e| AgentflowError::InvalidWorkflow(format!("failed to parse workflow: {}", e)))?;
        def.check_references()?;
        Ok(def)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    pub fn node(&self, id: &str) -> Option<&WorkflowNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Node ids must be unique and every edge must join two known nodes
    pub fn check_references(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for node in &self.nodes {
            if !seen.insert(node.id.as_str()) {
                return Err(AgentflowError::InvalidWorkflow(format!(
                    "duplicate node id '{}'",
                    node.id
                )));
            }
        }
        for edge in &self.edges {
            for end in [&edge.source, &edge.target] {
                if !seen.contains(end.as_str()) {
                    return Err(AgentflowError::InvalidWorkflow(format!(
                        "edge {} -> {} references unknown node '{}'",
                        edge.source, edge.target, end
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Identity and variables of one workflow run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRunContext {
    pub workflow_id: String,
    pub workflow_run_id: String,
    pub project_id: String,
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

impl WorkflowRunContext {
    pub fn new(
        workflow_id: impl Into<String>,
        workflow_run_id: impl Into<String>,
        project_id: impl Into<String>,
    ) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            workflow_run_id: workflow_run_id.into(),
            project_id: project_id.into(),
            variables: BTreeMap::new(),
        }
    }

    pub fn with_variable(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }
}
