use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::agents::{AgentClaims, AgentDirectory, AgentProfile};
use crate::audit::AuditSink;
use crate::domain::{
    AgentNodeConfig, AgentSession, FailureKind, NodeExecution, NodeFailure, NodeKind, NodeOutput, NodeType,
    ResumeSignal, SessionStatus, Suspension,
};
use crate::error::{AgentflowError, Result};
use crate::id::now_ms;
use crate::llm::LlmClient;
use crate::prompt::PromptRenderer;
use crate::runner::{AgentContext, AgentLoop, ApprovalResolution, LoopCheckpoint, LoopOutcome};
use crate::tools::ToolRegistry;
use crate::workflow::registry::{NodeHandler, NodeInput};

use super::template_context;

/// Role recorded on approvals raised by a tool call inside an agent node
pub const TOOL_APPROVER_ROLE: &str = "agent_owner";

/// Runs one agent session for the node.
///
/// The agent is claimed for the run before the session starts and stays
/// claimed while the session is parked on a tool approval.
pub struct AgentHandler<L: LlmClient> {
    directory: Arc<dyn AgentDirectory>,
    claims: Arc<dyn AgentClaims>,
    tools: Arc<ToolRegistry>,
    agent_loop: Arc<AgentLoop<L>>,
    renderer: Arc<PromptRenderer>,
    audit: Option<Arc<dyn AuditSink>>,
}

impl<L: LlmClient> AgentHandler<L> {
    pub fn new(
        directory: Arc<dyn AgentDirectory>,
        claims: Arc<dyn AgentClaims>,
        tools: Arc<ToolRegistry>,
        agent_loop: Arc<AgentLoop<L>>,
        renderer: Arc<PromptRenderer>,
    ) -> Self {
        Self {
            directory,
            claims,
            tools,
            agent_loop,
            renderer,
            audit: None,
        }
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    async fn run_session(
        &self,
        agent: AgentProfile,
        config: &AgentNodeConfig,
        input: &NodeInput<'_>,
    ) -> Result<LoopOutcome> {
        let tools = self
            .tools
            .resolve(&agent.tools)
            .map_err(|e| AgentflowError::InvalidWorkflow(format!("agent {}: {}", agent.id, e)))?;
        let task = self.renderer.render_json(&config.prompt, &template_context(input))?;
        let ctx = AgentContext::build(
            agent,
            &input.context.project_id,
            Some(input.context.workflow_run_id.clone()),
            task,
            &self.renderer,
        )?;

        match (input.resume, input.suspension) {
            (
                Some(ResumeSignal::Approval { approved, comment, .. }),
                Some(Suspension::Approval {
                    checkpoint: Some(checkpoint),
                    ..
                }),
            ) => {
                let checkpoint: LoopCheckpoint = serde_json::from_value(checkpoint.clone())?;
                let resolution = if *approved {
                    ApprovalResolution::Approved
                } else {
                    ApprovalResolution::Rejected {
                        reason: comment.clone(),
                    }
                };
                self.agent_loop.resume(&ctx, &tools, checkpoint, resolution).await
            }
            _ => self.agent_loop.run(&ctx, &tools).await,
        }
    }

    fn finish(&self, run_id: &str, node_id: &str, session: &AgentSession) -> NodeOutput {
        if let Some(audit) = &self.audit {
            for action in &session.actions {
                audit.record_action(Some(run_id), action);
            }
        }

        let mut data = json!({
            "session_id": session.session_id,
            "agent_id": session.agent_id,
            "status": session.status,
            "actions": session.action_count,
            "tokens": session.total_tokens,
            "cost_usd": session.total_cost_usd,
            "duration_ms": session.duration_ms(),
            "response": session.final_response,
        });

        let failure = match session.status {
            SessionStatus::Completed | SessionStatus::Running => None,
            SessionStatus::Aborted => Some(NodeFailure::new(
                FailureKind::SafetyLimit,
                format!(
                    "session aborted: {}",
                    session.abort_reason.map(|r| r.as_str()).unwrap_or("unknown")
                ),
            )),
            SessionStatus::Error => Some(NodeFailure::new(
                FailureKind::Provider,
                session.error.clone().unwrap_or_else(|| "session error".to_string()),
            )),
        };

        match failure {
            None => {
                let output = NodeOutput::completed(node_id, NodeType::Agent, data);
                match &session.final_response {
                    Some(response) => output.with_response(response),
                    None => output,
                }
            }
            Some(failure) => {
                data["error"] = json!(failure.message);
                NodeOutput::failed(node_id, NodeType::Agent, failure).with_data(data)
            }
        }
    }
}

#[async_trait]
impl<L: LlmClient + 'static> NodeHandler for AgentHandler<L> {
    fn node_type(&self) -> NodeType {
        NodeType::Agent
    }

    async fn execute(&self, input: NodeInput<'_>) -> Result<NodeExecution> {
        let NodeKind::Agent(config) = &input.node.config else {
            return Err(input.config_mismatch(NodeType::Agent));
        };
        let node_id = input.node.id.as_str();
        let run_id = input.context.workflow_run_id.as_str();

        let Some(agent) = self.directory.get_agent(&config.agent_id).await? else {
            return Ok(NodeExecution::Continue(NodeOutput::failed(
                node_id,
                NodeType::Agent,
                NodeFailure::new(FailureKind::Configuration, format!("unknown agent '{}'", config.agent_id)),
            )));
        };

        if !self.claims.try_claim(&agent.id, run_id).await? {
            log::info!("node {}: agent {} is busy, skipping", node_id, agent.id);
            return Ok(NodeExecution::Continue(NodeOutput::skipped(
                node_id,
                NodeType::Agent,
                "agent_busy",
            )));
        }

        let agent_id = agent.id.clone();
        let outcome = self.run_session(agent, config, &input).await;

        match outcome {
            Ok(LoopOutcome::Suspended(checkpoint)) => {
                let tool_name = checkpoint.awaiting().map(|c| c.name.clone());
                let message = format!(
                    "agent {} requests approval to call {}",
                    agent_id,
                    tool_name.as_deref().unwrap_or("a tool")
                );
                Ok(NodeExecution::Suspend(Suspension::Approval {
                    approver_role: TOOL_APPROVER_ROLE.to_string(),
                    timeout_hours: None,
                    message: Some(message),
                    tool_name,
                    checkpoint: Some(serde_json::to_value(&*checkpoint)?),
                    requested_at: now_ms(),
                }))
            }
            Ok(LoopOutcome::Finished(session)) => {
                self.claims.release(&agent_id, run_id).await?;
                Ok(NodeExecution::Continue(self.finish(run_id, node_id, &session)))
            }
            Err(e) => {
                self.claims.release(&agent_id, run_id).await?;
                log::error!("node {}: agent {} failed: {}", node_id, agent_id, e);
                Ok(NodeExecution::Continue(NodeOutput::failed(
                    node_id,
                    NodeType::Agent,
                    NodeFailure::from(&e),
                )))
            }
        }
    }
}
