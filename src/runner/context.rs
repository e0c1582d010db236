//! Agent context and the serializable loop checkpoint

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::agents::AgentProfile;
use crate::domain::AgentSession;
use crate::error::Result;
use crate::llm::{Message, ToolCall, ToolResult, Usage};
use crate::prompt::PromptRenderer;
use crate::tools::ExecutionContext;

/// Everything a session needs to talk to the model
#[derive(Debug, Clone)]
pub struct AgentContext {
    pub agent: AgentProfile,
    pub project_id: String,
    pub workflow_run_id: Option<String>,
    /// Rendered system prompt including memory
    pub system_prompt: String,
    /// Rendered task for the first user turn
    pub task: String,
}

impl AgentContext {
    pub fn build(
        agent: AgentProfile,
        project_id: impl Into<String>,
        workflow_run_id: Option<String>,
        task: impl Into<String>,
        renderer: &PromptRenderer,
    ) -> Result<Self> {
        let prompt_vars = json!({
            "agent_id": agent.id,
            "agent_name": agent.name,
            "archetype": agent.archetype,
        });
        let system_prompt = renderer.render_system_prompt(&agent.system_prompt, &prompt_vars, &agent.memory)?;

        Ok(Self {
            agent,
            project_id: project_id.into(),
            workflow_run_id,
            system_prompt,
            task: task.into(),
        })
    }

    pub fn execution_context(&self, session: &AgentSession) -> ExecutionContext {
        ExecutionContext {
            session_id: session.session_id.clone(),
            agent_id: self.agent.id.clone(),
            project_id: self.project_id.clone(),
            workflow_run_id: self.workflow_run_id.clone(),
        }
    }
}

/// Session state parked while a tool call waits for approval.
///
/// `pending[0]` is the call awaiting a decision; the rest of the model turn's
/// calls follow it. `results` holds tool results already produced this turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopCheckpoint {
    pub session: AgentSession,
    pub messages: Vec<Message>,
    pub pending: Vec<ToolCall>,
    #[serde(default)]
    pub results: Vec<ToolResult>,
    /// Model usage of the current turn not yet charged to a record
    #[serde(default)]
    pub turn_usage: Option<Usage>,
    pub suspended_at: i64,
}

impl LoopCheckpoint {
    /// The call a human must decide on
    pub fn awaiting(&self) -> Option<&ToolCall> {
        self.pending.first()
    }
}
