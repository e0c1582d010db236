//! Agentic loop - drives one agent session to a terminal state or a pause.
//!
//! Each iteration:
//! 1. Asks the safety governor whether the session may continue
//! 2. Calls the model with the accumulated history and the agent's tools
//! 3. A reply without tool requests completes the session
//! 4. Otherwise each requested call goes through the ToolInvoker; a call that
//!    needs approval parks the whole session in a `LoopCheckpoint`
//! 5. Tool results are fed back and the loop continues
//!
//! Tool failures are soft (counted by the governor). A failed model call ends
//! the session with status `error`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::domain::{ActionErrorKind, ActionRecord, AgentSession, SessionStatus};
use crate::error::Result;
use crate::id::now_ms;
use crate::llm::{CompletionRequest, LlmClient, Message, ToolCall, ToolResult, Usage};
use crate::safety::{SafetyGovernor, SafetyLimits, Verdict};
use crate::tools::{InvokeOutcome, Tool, ToolInvoker, ToolThrottle};

use super::context::{AgentContext, LoopCheckpoint};

/// Configuration for the AgentLoop
#[derive(Debug, Clone)]
pub struct AgentLoopConfig {
    /// Maximum tokens for LLM responses
    pub max_tokens: u32,
    /// Upper bound on a single model call
    pub model_timeout: Duration,
}

impl Default for AgentLoopConfig {
    fn default() -> Self {
        Self {
            max_tokens: 4096,
            model_timeout: Duration::from_secs(120),
        }
    }
}

/// Where a run of the loop stopped
#[derive(Debug, Clone, PartialEq)]
pub enum LoopOutcome {
    /// Session reached completed, error or aborted
    Finished(AgentSession),
    /// A tool call awaits human approval
    Suspended(Box<LoopCheckpoint>),
}

/// Human decision on a parked tool call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalResolution {
    Approved,
    Rejected { reason: Option<String> },
}

/// Mutable loop state between model turns
struct LoopState {
    session: AgentSession,
    messages: Vec<Message>,
    pending: Vec<ToolCall>,
    results: Vec<ToolResult>,
    turn_usage: Option<Usage>,
}

impl LoopState {
    fn into_checkpoint(self) -> LoopCheckpoint {
        LoopCheckpoint {
            session: self.session,
            messages: self.messages,
            pending: self.pending,
            results: self.results,
            turn_usage: self.turn_usage,
            suspended_at: now_ms(),
        }
    }
}

/// Executes agent sessions
pub struct AgentLoop<L: LlmClient> {
    llm: Arc<L>,
    invoker: Arc<ToolInvoker>,
    default_limits: SafetyLimits,
    config: AgentLoopConfig,
}

impl<L: LlmClient> AgentLoop<L> {
    pub fn new(llm: Arc<L>, invoker: Arc<ToolInvoker>, default_limits: SafetyLimits) -> Self {
        Self::with_config(llm, invoker, default_limits, AgentLoopConfig::default())
    }

    pub fn with_config(
        llm: Arc<L>,
        invoker: Arc<ToolInvoker>,
        default_limits: SafetyLimits,
        config: AgentLoopConfig,
    ) -> Self {
        Self {
            llm,
            invoker,
            default_limits,
            config,
        }
    }

    /// Start a fresh session
    pub async fn run(&self, ctx: &AgentContext, tools: &[Tool]) -> Result<LoopOutcome> {
        let session = AgentSession::new(&ctx.agent.id, &ctx.project_id);
        log::info!(
            "session {} started for agent {} ({} tools)",
            session.session_id,
            ctx.agent.id,
            tools.len()
        );

        let state = LoopState {
            session,
            messages: vec![Message::user(&ctx.task)],
            pending: Vec::new(),
            results: Vec::new(),
            turn_usage: None,
        };
        self.drive(ctx, tools, state).await
    }

    /// Continue a parked session after a human decision
    pub async fn resume(
        &self,
        ctx: &AgentContext,
        tools: &[Tool],
        checkpoint: LoopCheckpoint,
        resolution: ApprovalResolution,
    ) -> Result<LoopOutcome> {
        let LoopCheckpoint {
            mut session,
            messages,
            mut pending,
            results,
            turn_usage,
            suspended_at,
        } = checkpoint;

        session.suspended_ms += (now_ms() - suspended_at).max(0);
        log::info!("session {} resumed: {:?}", session.session_id, resolution);

        let mut state = LoopState {
            session,
            messages,
            pending: Vec::new(),
            results,
            turn_usage,
        };

        if pending.is_empty() {
            return self.drive(ctx, tools, state).await;
        }
        let call = pending.remove(0);
        state.pending = pending;

        let record = match resolution {
            ApprovalResolution::Approved => match find_tool(tools, &call.name) {
                Some(tool) => {
                    let exec = ctx.execution_context(&state.session);
                    self.invoker
                        .invoke_approved(tool, &call, &mut state.session, &exec, self.throttle(ctx))
                        .await
                }
                None => ActionRecord::tool_call(&call.name, call.input.clone())
                    .with_error(ActionErrorKind::UnknownTool, format!("unknown tool '{}'", call.name)),
            },
            ApprovalResolution::Rejected { reason } => {
                let message = match reason {
                    Some(reason) => format!("tool call rejected by approver: {}", reason),
                    None => "tool call rejected by approver".to_string(),
                };
                ActionRecord::tool_call(&call.name, call.input.clone()).with_error(ActionErrorKind::Rejected, message)
            }
        };

        if self.record_tool(&mut state, ctx, &call, record)? {
            return Ok(LoopOutcome::Finished(state.session));
        }
        self.drive(ctx, tools, state).await
    }

    fn governor(&self, ctx: &AgentContext) -> SafetyGovernor {
        SafetyGovernor::new(ctx.agent.limits.clone().unwrap_or_else(|| self.default_limits.clone()))
    }

    /// Tool spacing from the same effective limits the governor uses
    fn throttle(&self, ctx: &AgentContext) -> ToolThrottle {
        ToolThrottle::new(self.governor(ctx).limits().tool_call_min_interval_ms)
    }

    async fn drive(&self, ctx: &AgentContext, tools: &[Tool], mut state: LoopState) -> Result<LoopOutcome> {
        let governor = self.governor(ctx);
        let throttle = self.throttle(ctx);
        let definitions: Vec<_> = tools.iter().map(Tool::to_llm_definition).collect();
        let model = ctx.agent.model.clone().unwrap_or_else(|| self.llm.model().to_string());

        loop {
            // Finish the current turn's tool calls
            while !state.pending.is_empty() {
                let call = state.pending[0].clone();
                let exec = ctx.execution_context(&state.session);
                let outcome = self
                    .invoker
                    .invoke(find_tool(tools, &call.name), &call, &mut state.session, &exec, throttle)
                    .await?;

                match outcome {
                    InvokeOutcome::NeedsApproval => {
                        return Ok(LoopOutcome::Suspended(Box::new(state.into_checkpoint())));
                    }
                    InvokeOutcome::Recorded(record) => {
                        state.pending.remove(0);
                        if self.record_tool(&mut state, ctx, &call, record)? {
                            return Ok(LoopOutcome::Finished(state.session));
                        }
                    }
                }
            }

            if !state.results.is_empty() {
                let results = std::mem::take(&mut state.results);
                state.messages.push(Message::tool_results(&results));
            }

            if let Verdict::Abort(reason) = governor.evaluate(&state.session) {
                state.session.abort(reason)?;
                return Ok(LoopOutcome::Finished(state.session));
            }

            let request = CompletionRequest::new(&ctx.system_prompt)
                .with_messages(state.messages.clone())
                .with_tools(definitions.clone())
                .with_max_tokens(ctx.agent.max_tokens.unwrap_or(self.config.max_tokens))
                .with_model(&model);
            let request = CompletionRequest {
                temperature: ctx.agent.temperature,
                ..request
            };

            let start = Instant::now();
            let response = match tokio::time::timeout(self.config.model_timeout, self.llm.complete(request)).await {
                Ok(Ok(response)) => response,
                Ok(Err(e)) => {
                    log::error!("session {} model call failed: {}", state.session.session_id, e);
                    state.session.fail(format!("model call failed: {}", e))?;
                    return Ok(LoopOutcome::Finished(state.session));
                }
                Err(_) => {
                    log::error!("session {} model call timed out", state.session.session_id);
                    state.session.fail(format!(
                        "model call timed out after {}s",
                        self.config.model_timeout.as_secs()
                    ))?;
                    return Ok(LoopOutcome::Finished(state.session));
                }
            };
            let model_ms = start.elapsed().as_millis() as u64;

            if !response.requests_tools() {
                let usage = response.usage;
                let record = ActionRecord::model_call(usage.total(), usage.cost_usd(&model), model_ms);
                state.session.append(record)?;
                state.messages.push(Message::assistant(&response.content));
                state.session.complete(&response.content)?;
                log::info!(
                    "session {} completed: {} actions, {} tokens",
                    state.session.session_id,
                    state.session.action_count,
                    state.session.total_tokens
                );
                return Ok(LoopOutcome::Finished(state.session));
            }

            state
                .messages
                .push(Message::assistant_turn(&response.content, &response.tool_calls));
            state.pending = response.tool_calls;
            state.turn_usage = Some(response.usage);
        }
    }

    /// Append a tool record and queue its result for the model.
    ///
    /// Returns true when the governor stopped the session.
    fn record_tool(
        &self,
        state: &mut LoopState,
        ctx: &AgentContext,
        call: &ToolCall,
        record: ActionRecord,
    ) -> Result<bool> {
        let record = match state.turn_usage.take() {
            Some(usage) => {
                let model = ctx.agent.model.as_deref().unwrap_or_else(|| self.llm.model());
                record.with_usage(usage.total(), usage.cost_usd(model))
            }
            None => record,
        };

        let result = match (&record.output, &record.error) {
            (_, Some(error)) => ToolResult::error(&call.id, error),
            (Some(output), None) => ToolResult::success(&call.id, render_output(output)),
            (None, None) => ToolResult::success(&call.id, ""),
        };
        state.results.push(result);
        state.session.append(record)?;

        if let Verdict::Abort(reason) = self.governor(ctx).evaluate(&state.session) {
            state.session.abort(reason)?;
            return Ok(true);
        }
        Ok(state.session.status != SessionStatus::Running)
    }
}

fn find_tool<'a>(tools: &'a [Tool], name: &str) -> Option<&'a Tool> {
    tools.iter().find(|t| t.name == name)
}

fn render_output(output: &serde_json::Value) -> String {
    match output {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
