//! Approval rules keyed by (project, agent, tool)

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{AgentflowError, Result};

/// Stored gating decision for one agent + tool pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    AlwaysAllow,
    AlwaysBlock,
    RequireApproval,
}

impl ApprovalDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AlwaysAllow => "always_allow",
            Self::AlwaysBlock => "always_block",
            Self::RequireApproval => "require_approval",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "always_allow" => Some(Self::AlwaysAllow),
            "always_block" => Some(Self::AlwaysBlock),
            "require_approval" => Some(Self::RequireApproval),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRule {
    pub project_id: String,
    pub agent_id: String,
    pub tool_name: String,
    pub decision: ApprovalDecision,
}

impl ApprovalRule {
    pub fn new(
        project_id: impl Into<String>,
        agent_id: impl Into<String>,
        tool_name: impl Into<String>,
        decision: ApprovalDecision,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            agent_id: agent_id.into(),
            tool_name: tool_name.into(),
            decision,
        }
    }
}

/// External rule lookup
#[async_trait]
pub trait ApprovalRuleStore: Send + Sync {
    async fn lookup(&self, project_id: &str, agent_id: &str, tool_name: &str) -> Result<Option<ApprovalDecision>>;

    async fn upsert(&self, rule: ApprovalRule) -> Result<()>;
}

type RuleKey = (String, String, String);

/// Process-local rule store
#[derive(Default)]
pub struct InMemoryApprovalRules {
    rules: Mutex<HashMap<RuleKey, ApprovalDecision>>,
}

impl InMemoryApprovalRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rules(rules: impl IntoIterator<Item = ApprovalRule>) -> Self {
        let map = rules
            .into_iter()
            .map(|r| ((r.project_id, r.agent_id, r.tool_name), r.decision))
            .collect();
        Self {
            rules: Mutex::new(map),
        }
    }
}

#[async_trait]
impl ApprovalRuleStore for InMemoryApprovalRules {
    async fn lookup(&self, project_id: &str, agent_id: &str, tool_name: &str) -> Result<Option<ApprovalDecision>> {
        let rules = self
            .rules
            .lock()
            .map_err(|e| AgentflowError::Storage(format!("approval rules lock poisoned: {}", e)))?;
        let key = (project_id.to_string(), agent_id.to_string(), tool_name.to_string());
        Ok(rules.get(&key).copied())
    }

    async fn upsert(&self, rule: ApprovalRule) -> Result<()> {
        let mut rules = self
            .rules
            .lock()
            .map_err(|e| AgentflowError::Storage(format!("approval rules lock poisoned: {}", e)))?;
        rules.insert((rule.project_id, rule.agent_id, rule.tool_name), rule.decision);
        Ok(())
    }
}
