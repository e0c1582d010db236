//! Agent session integration tests
//!
//! Drives the agent loop end to end with a scripted LLM client and spy tool
//! capabilities, checking approval gating, rate limiting and safety limits.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Value, json};

use agentflow::agents::AgentProfile;
use agentflow::approval::{ApprovalDecision, ApprovalGate, ApprovalRule, InMemoryApprovalRules};
use agentflow::domain::{AbortReason, ActionErrorKind, AgentSession, SessionStatus};
use agentflow::error::Result;
use agentflow::id::now_ms;
use agentflow::llm::{CompletionResponse, MockLlmClient, ToolCall, Usage};
use agentflow::prompt::PromptRenderer;
use agentflow::runner::{AgentContext, AgentLoop, LoopOutcome};
use agentflow::safety::SafetyLimits;
use agentflow::tools::{ExecutionContext, Tool, ToolCapability, ToolInvoker};

#[derive(Default)]
struct SpyCapability {
    calls: AtomicUsize,
    started_at: Mutex<Vec<i64>>,
}

#[async_trait]
impl ToolCapability for SpyCapability {
    async fn execute(&self, _input: Value, _ctx: &ExecutionContext) -> Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.started_at.lock().unwrap().push(now_ms());
        Ok(json!({"ok": true}))
    }
}

fn tool_call_reply(id: &str) -> CompletionResponse {
    CompletionResponse::tool_use(ToolCall::new(id, "send_email", json!({})), Usage::new(10, 5))
}

fn build_loop(mock: MockLlmClient, rules: Vec<ApprovalRule>, limits: SafetyLimits) -> AgentLoop<MockLlmClient> {
    let gate = ApprovalGate::new(Arc::new(InMemoryApprovalRules::with_rules(rules)));
    let invoker = ToolInvoker::new(Arc::new(gate));
    AgentLoop::new(Arc::new(mock), Arc::new(invoker), limits)
}

fn context() -> AgentContext {
    let agent = AgentProfile::new("mailer", "You send email").with_tools(&["send_email"]);
    AgentContext::build(agent, "proj", None, "Notify the customer", &PromptRenderer::new()).unwrap()
}

fn session(outcome: LoopOutcome) -> AgentSession {
    match outcome {
        LoopOutcome::Finished(session) => session,
        LoopOutcome::Suspended(_) => panic!("session unexpectedly suspended"),
    }
}

async fn run_with_decision(decision: Option<ApprovalDecision>) -> (usize, LoopOutcome) {
    let spy = Arc::new(SpyCapability::default());
    let tool = Tool::new("send_email", "Send an email", spy.clone()).with_requires_approval(true);
    let rules = decision
        .map(|d| vec![ApprovalRule::new("proj", "mailer", "send_email", d)])
        .unwrap_or_default();
    let mock = MockLlmClient::new(vec![
        tool_call_reply("toolu_1"),
        CompletionResponse::text("done", Usage::new(5, 5)),
    ]);

    let looper = build_loop(mock, rules, SafetyLimits::default().with_tool_interval_ms(0));
    let outcome = looper.run(&context(), &[tool]).await.unwrap();
    (spy.calls.load(Ordering::SeqCst), outcome)
}

#[tokio::test]
async fn test_gated_tool_is_never_executed_without_approval() {
    let (calls, outcome) = run_with_decision(None).await;
    assert_eq!(calls, 0);
    match outcome {
        LoopOutcome::Suspended(checkpoint) => {
            assert_eq!(checkpoint.awaiting().unwrap().name, "send_email");
            assert_eq!(checkpoint.session.status, SessionStatus::Running);
        }
        LoopOutcome::Finished(_) => panic!("expected suspension"),
    }
}

#[tokio::test]
async fn test_always_block_records_permission_error() {
    let (calls, outcome) = run_with_decision(Some(ApprovalDecision::AlwaysBlock)).await;
    assert_eq!(calls, 0);

    let session = session(outcome);
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.actions[0].error_kind, Some(ActionErrorKind::Permission));
    assert!(session.actions[0].output.is_none());
}

#[tokio::test]
async fn test_always_allow_executes_once() {
    let (calls, outcome) = run_with_decision(Some(ApprovalDecision::AlwaysAllow)).await;
    assert_eq!(calls, 1);

    let session = session(outcome);
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.actions[0].output, Some(json!({"ok": true})));
    assert_eq!(session.final_response.as_deref(), Some("done"));
}

#[tokio::test]
async fn test_agent_profile_interval_spaces_tool_calls() {
    let spy = Arc::new(SpyCapability::default());
    let tool = Tool::new("send_email", "Send an email", spy.clone());
    let mock = MockLlmClient::new(vec![
        tool_call_reply("toolu_1"),
        tool_call_reply("toolu_2"),
        CompletionResponse::text("done", Usage::new(5, 5)),
    ]);
    let agent = AgentProfile::new("mailer", "You send email")
        .with_tools(&["send_email"])
        .with_limits(SafetyLimits::default().with_tool_interval_ms(300));
    let ctx = AgentContext::build(agent, "proj", None, "Notify the customer", &PromptRenderer::new()).unwrap();

    let looper = build_loop(mock, vec![], SafetyLimits::default().with_tool_interval_ms(0));
    let session = session(looper.run(&ctx, &[tool]).await.unwrap());
    assert_eq!(session.status, SessionStatus::Completed);

    let started = spy.started_at.lock().unwrap().clone();
    assert_eq!(started.len(), 2);
    assert!(started[1] - started[0] >= 300, "gap was {}ms", started[1] - started[0]);
}

#[tokio::test]
async fn test_consecutive_tool_calls_respect_min_interval() {
    let spy = Arc::new(SpyCapability::default());
    let tool = Tool::new("send_email", "Send an email", spy.clone());
    let mock = MockLlmClient::new(vec![
        tool_call_reply("toolu_1"),
        tool_call_reply("toolu_2"),
        CompletionResponse::text("done", Usage::new(5, 5)),
    ]);

    let looper = build_loop(mock, vec![], SafetyLimits::default().with_tool_interval_ms(200));
    let session = session(looper.run(&context(), &[tool]).await.unwrap());
    assert_eq!(session.status, SessionStatus::Completed);

    let started = spy.started_at.lock().unwrap().clone();
    assert_eq!(started.len(), 2);
    assert!(started[1] - started[0] >= 200, "gap was {}ms", started[1] - started[0]);
}

#[tokio::test]
async fn test_runaway_agent_is_stopped_by_action_limit() {
    let spy = Arc::new(SpyCapability::default());
    let tool = Tool::new("send_email", "Send an email", spy.clone());
    let mock = MockLlmClient::repeating(tool_call_reply("toolu_loop"));
    let limits = SafetyLimits::default().with_tool_interval_ms(0).with_max_actions(3);

    let looper = build_loop(mock, vec![], limits);
    let session = session(looper.run(&context(), &[tool]).await.unwrap());

    assert_eq!(session.status, SessionStatus::Aborted);
    assert_eq!(session.abort_reason, Some(AbortReason::MaxActionsExceeded));
    assert_eq!(session.action_count, 3);
    assert_eq!(spy.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_action_sequence_is_gapless() {
    let spy = Arc::new(SpyCapability::default());
    let tool = Tool::new("send_email", "Send an email", spy);
    let mock = MockLlmClient::new(vec![
        tool_call_reply("toolu_1"),
        tool_call_reply("toolu_2"),
        CompletionResponse::text("done", Usage::new(5, 5)),
    ]);

    let looper = build_loop(mock, vec![], SafetyLimits::default().with_tool_interval_ms(0));
    let session = session(looper.run(&context(), &[tool]).await.unwrap());

    let sequences: Vec<u32> = session.actions.iter().map(|a| a.sequence).collect();
    assert_eq!(sequences, vec![1, 2, 3]);
    let tokens: u64 = session.actions.iter().map(|a| a.tokens_used).sum();
    assert_eq!(tokens, session.total_tokens);
}
