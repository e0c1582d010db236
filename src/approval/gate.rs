//! Approval gate - decides whether an agent may call a tool right now

use std::sync::Arc;

use crate::approval::rules::{ApprovalDecision, ApprovalRuleStore};
use crate::error::Result;

pub struct ApprovalGate {
    rules: Arc<dyn ApprovalRuleStore>,
}

impl ApprovalGate {
    pub fn new(rules: Arc<dyn ApprovalRuleStore>) -> Self {
        Self { rules }
    }

    /// Resolve the decision for an (agent, tool) pair.
    ///
    /// A stored rule wins; otherwise the tool's own `requires_approval` flag
    /// picks between `RequireApproval` and `AlwaysAllow`.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn resolve(
        &self,
        project_id: &str,
        agent_id: &str,
        tool_name: &str,
        requires_approval: bool,
    ) -> Result<ApprovalDecision> {
        let decision = match self.rules.lookup(project_id, agent_id, tool_name).await? {
            Some(decision) => decision,
            None if requires_approval => ApprovalDecision::RequireApproval,
            None => ApprovalDecision::AlwaysAllow,
        };
        log::debug!(
            "approval gate: project={} agent={} tool={} -> {}",
            project_id,
            agent_id,
            tool_name,
            decision.as_str()
        );
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::rules::{ApprovalRule, InMemoryApprovalRules};

    fn gate(rules: Vec<ApprovalRule>) -> ApprovalGate {
        ApprovalGate::new(Arc::new(InMemoryApprovalRules::with_rules(rules)))
    }

    #[tokio::test]
    async fn test_default_follows_tool_flag() {
        let gate = gate(vec![]);
        assert_eq!(
            gate.resolve("p", "a", "http_request", true).await.unwrap(),
            ApprovalDecision::RequireApproval
        );
        assert_eq!(
            gate.resolve("p", "a", "current_time", false).await.unwrap(),
            ApprovalDecision::AlwaysAllow
        );
    }

    #[tokio::test]
    async fn test_rule_overrides_flag() {
        let gate = gate(vec![
            ApprovalRule::new("p", "a", "http_request", ApprovalDecision::AlwaysAllow),
            ApprovalRule::new("p", "a", "current_time", ApprovalDecision::AlwaysBlock),
        ]);
        assert_eq!(
            gate.resolve("p", "a", "http_request", true).await.unwrap(),
            ApprovalDecision::AlwaysAllow
        );
        assert_eq!(
            gate.resolve("p", "a", "current_time", false).await.unwrap(),
            ApprovalDecision::AlwaysBlock
        );
    }

    #[tokio::test]
    async fn test_rules_scoped_by_project() {
        let gate = gate(vec![ApprovalRule::new(
            "p1",
            "a",
            "http_request",
            ApprovalDecision::AlwaysAllow,
        )]);
        assert_eq!(
            gate.resolve("p2", "a", "http_request", true).await.unwrap(),
            ApprovalDecision::RequireApproval
        );
    }
}
