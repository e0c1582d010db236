//! Tool invoker - validation, approval, rate limiting and execution of one call
//!
//! Every permitted or refused call yields an `ActionRecord`; only calls the
//! approval gate allowed ever reach a capability, and only those carry output.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::approval::{ApprovalDecision, ApprovalGate};
use crate::domain::{ActionErrorKind, ActionRecord, AgentSession};
use crate::error::Result;
use crate::llm::{ToolCall, validate_tool_input};

use super::definition::{ExecutionContext, Tool};
use super::throttle::ToolThrottle;

/// What happened to a tool call
#[derive(Debug, Clone, PartialEq)]
pub enum InvokeOutcome {
    /// A record to append (success or soft failure)
    Recorded(ActionRecord),
    /// The call must wait for a human decision; nothing was executed
    NeedsApproval,
}

pub struct ToolInvoker {
    gate: Arc<ApprovalGate>,
}

impl ToolInvoker {
    pub fn new(gate: Arc<ApprovalGate>) -> Self {
        Self { gate }
    }

    /// Validate, gate and (if allowed) execute a call.
    ///
    /// `tool` is `None` when the model asked for a tool outside the agent's
    /// allowlist. Errors are only returned for infrastructure failures such
    /// as an unreachable rule store. `throttle` carries the session's
    /// effective tool spacing.
    pub async fn invoke(
        &self,
        tool: Option<&Tool>,
        call: &ToolCall,
        session: &mut AgentSession,
        ctx: &ExecutionContext,
        throttle: ToolThrottle,
    ) -> Result<InvokeOutcome> {
        let Some(tool) = tool else {
            log::warn!("session {} requested unknown tool {}", session.session_id, call.name);
            return Ok(InvokeOutcome::Recorded(
                ActionRecord::tool_call(&call.name, call.input.clone())
                    .with_error(ActionErrorKind::UnknownTool, format!("unknown tool '{}'", call.name)),
            ));
        };

        if let Some(record) = Self::validate(tool, call) {
            return Ok(InvokeOutcome::Recorded(record));
        }

        let decision = self
            .gate
            .resolve(&session.project_id, &session.agent_id, &tool.name, tool.requires_approval)
            .await?;

        match decision {
            ApprovalDecision::AlwaysBlock => Ok(InvokeOutcome::Recorded(
                ActionRecord::tool_call(&tool.name, call.input.clone()).with_error(
                    ActionErrorKind::Permission,
                    format!("tool '{}' is blocked for agent {}", tool.name, session.agent_id),
                ),
            )),
            ApprovalDecision::RequireApproval => {
                log::info!(
                    "session {} paused: tool {} requires approval",
                    session.session_id,
                    tool.name
                );
                Ok(InvokeOutcome::NeedsApproval)
            }
            ApprovalDecision::AlwaysAllow => Ok(InvokeOutcome::Recorded(
                Self::run(tool, call, session, ctx, throttle).await,
            )),
        }
    }

    /// Execute a call a human already approved; still validated
    pub async fn invoke_approved(
        &self,
        tool: &Tool,
        call: &ToolCall,
        session: &mut AgentSession,
        ctx: &ExecutionContext,
        throttle: ToolThrottle,
    ) -> ActionRecord {
        if let Some(record) = Self::validate(tool, call) {
            return record;
        }
        Self::run(tool, call, session, ctx, throttle).await
    }

    fn validate(tool: &Tool, call: &ToolCall) -> Option<ActionRecord> {
        let violations = validate_tool_input(&call.input, &tool.input_schema);
        if violations.is_empty() {
            return None;
        }
        Some(
            ActionRecord::tool_call(&tool.name, call.input.clone())
                .with_error(ActionErrorKind::Validation, violations.join("; ")),
        )
    }

    async fn run(
        tool: &Tool,
        call: &ToolCall,
        session: &mut AgentSession,
        ctx: &ExecutionContext,
        throttle: ToolThrottle,
    ) -> ActionRecord {
        session.last_tool_call_at = Some(throttle.acquire(session.last_tool_call_at).await);

        let start = Instant::now();
        let timeout = Duration::from_millis(tool.effective_timeout_ms());
        let result = tokio::time::timeout(timeout, tool.execute(call.input.clone(), ctx)).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        let record = ActionRecord::tool_call(&tool.name, call.input.clone()).with_duration(duration_ms);
        match result {
            Ok(Ok(output)) => {
                log::debug!("tool {} completed in {}ms", tool.name, duration_ms);
                record.with_output(output)
            }
            Ok(Err(e)) => {
                log::warn!("tool {} failed: {}", tool.name, e);
                record.with_error(ActionErrorKind::Tool, e.to_string())
            }
            Err(_) => {
                log::warn!("tool {} timed out after {}ms", tool.name, timeout.as_millis());
                record.with_error(
                    ActionErrorKind::Tool,
                    format!("tool '{}' timed out after {}ms", tool.name, timeout.as_millis()),
                )
            }
        }
    }
}
