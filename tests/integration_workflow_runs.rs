//! Workflow run integration tests
//!
//! Runs whole workflows through the RunManager against a temporary store,
//! with the LLM replaced by a scripted client.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use agentflow::agents::{AgentProfile, InMemoryAgentDirectory};
use agentflow::approval::ApprovalGate;
use agentflow::audit::{AuditSink, LogAuditSink};
use agentflow::domain::{
    FailureKind, NodeStatus, RunStatus, Suspension, WorkflowDefinition, WorkflowEdge, WorkflowRun,
};
use agentflow::error::AgentflowError;
use agentflow::id::now_ms;
use agentflow::llm::{CompletionResponse, MockLlmClient, Usage};
use agentflow::manager::{ApprovalDecisionInput, RunManager};
use agentflow::prompt::PromptRenderer;
use agentflow::queue::RetryPolicy;
use agentflow::runner::AgentLoop;
use agentflow::safety::SafetyLimits;
use agentflow::store::FlowStore;
use agentflow::tools::{ToolInvoker, ToolRegistry};
use agentflow::workflow::{
    AgentHandler, ApprovalHandler, ConditionHandler, DelayHandler, NodeHandlerRegistry, OutputHandler,
    TriggerHandler, WorkflowExecutor, topological_sort,
};

struct Harness {
    _temp: TempDir,
    store: Arc<FlowStore>,
    llm: Arc<MockLlmClient>,
    manager: RunManager,
}

fn harness(llm: MockLlmClient, retry: RetryPolicy) -> Harness {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(FlowStore::open_at(temp.path()).unwrap());
    let llm = Arc::new(llm);
    let renderer = Arc::new(PromptRenderer::new());
    let audit: Arc<dyn AuditSink> = Arc::new(LogAuditSink);

    let directory = Arc::new(InMemoryAgentDirectory::new(vec![AgentProfile::new(
        "writer",
        "You summarise tickets",
    )]));
    let invoker = Arc::new(ToolInvoker::new(Arc::new(ApprovalGate::new(store.clone()))));
    let limits = SafetyLimits::default().with_tool_interval_ms(0);
    let agent_loop = Arc::new(AgentLoop::new(llm.clone(), invoker, limits));

    let registry = NodeHandlerRegistry::new()
        .with_handler(TriggerHandler)
        .with_handler(
            AgentHandler::new(
                directory,
                store.clone(),
                Arc::new(ToolRegistry::new()),
                agent_loop,
                renderer.clone(),
            )
            .with_audit(audit.clone()),
        )
        .with_handler(ConditionHandler::new(llm.clone(), renderer.clone()))
        .with_handler(ApprovalHandler)
        .with_handler(DelayHandler)
        .with_handler(OutputHandler::new(renderer, Duration::from_secs(1)).unwrap());
    let executor = Arc::new(WorkflowExecutor::new(Arc::new(registry)).with_audit(audit.clone()));

    let manager = RunManager::new(store.clone(), store.clone(), store.clone(), executor, audit, retry);
    Harness {
        _temp: temp,
        store,
        llm,
        manager,
    }
}

fn vars(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

fn summary_reply() -> CompletionResponse {
    CompletionResponse::text("Summary ready", Usage::new(40, 10))
}

const AGENT_FLOW: &str = r#"
id: summarise
project_id: proj
nodes:
  - id: start
    config:
      type: trigger
  - id: agent
    config:
      type: agent
      agent_id: writer
      prompt: "Summarise ticket {{ticket}}"
  - id: notify
    config:
      type: output
      template: "Result: {{upstream.agent.response}}"
edges:
  - source: start
    target: agent
  - source: agent
    target: notify
"#;

const APPROVAL_FLOW: &str = r#"
id: gated
project_id: proj
nodes:
  - id: start
    config:
      type: trigger
  - id: agent
    config:
      type: agent
      agent_id: writer
      prompt: "Draft a reply"
  - id: review
    config:
      type: approval
      approver_role: lead
  - id: send
    config:
      type: output
      template: "approved by {{upstream.review.data.decided_by}}"
edges:
  - source: start
    target: agent
  - source: agent
    target: review
  - source: review
    target: send
"#;

const ROUTING_FLOW: &str = r#"
id: routing
project_id: proj
nodes:
  - id: start
    config:
      type: trigger
  - id: check
    config:
      type: condition
      mode: contains
      value: urgent
  - id: escalate
    config:
      type: output
      template: "escalating {{ticket}}"
  - id: backlog
    config:
      type: output
      template: "queued {{ticket}}"
edges:
  - source: start
    target: check
  - source: check
    target: escalate
    source_handle: "true"
  - source: check
    target: backlog
    source_handle: "false"
"#;

const DELAY_FLOW: &str = r#"
id: follow-up
project_id: proj
nodes:
  - id: start
    config:
      type: trigger
  - id: wait
    config:
      type: delay
      duration: 5
      unit: minutes
  - id: remind
    config:
      type: output
      template: "reminder"
edges:
  - source: start
    target: wait
  - source: wait
    target: remind
"#;

fn approve(approved: bool) -> ApprovalDecisionInput {
    ApprovalDecisionInput {
        approved,
        decided_by: Some("lead-1".into()),
        comment: (!approved).then(|| "tone is off".to_string()),
    }
}

fn status_of(run: &WorkflowRun, node: &str) -> NodeStatus {
    run.outputs[node].status
}

#[test]
fn test_topological_sort_orders_edges_and_rejects_cycles() {
    let ids: Vec<String> = ["c", "b", "a"].iter().map(|s| s.to_string()).collect();
    let edges = vec![WorkflowEdge::new("a", "b"), WorkflowEdge::new("b", "c")];
    assert_eq!(topological_sort(&ids, &edges).unwrap(), vec!["a", "b", "c"]);

    let cyclic = vec![
        WorkflowEdge::new("a", "b"),
        WorkflowEdge::new("b", "c"),
        WorkflowEdge::new("c", "a"),
    ];
    let err = topological_sort(&ids, &cyclic).unwrap_err();
    assert!(matches!(err, AgentflowError::CycleDetected { remaining: 3 }));
}

#[tokio::test]
async fn test_cyclic_workflow_is_rejected_before_execution() {
    let h = harness(MockLlmClient::repeating(summary_reply()), RetryPolicy::default());
    let mut definition = WorkflowDefinition::from_yaml(AGENT_FLOW).unwrap();
    definition.edges.push(WorkflowEdge::new("notify", "start"));

    let err = h.manager.start_run(definition, BTreeMap::new()).await.unwrap_err();
    assert!(matches!(err, AgentflowError::CycleDetected { .. }));
    assert_eq!(h.llm.call_count(), 0);
    assert!(h.manager.list_runs(None).unwrap().is_empty());
}

#[tokio::test]
async fn test_trigger_agent_output_completes() {
    let h = harness(MockLlmClient::new(vec![summary_reply()]), RetryPolicy::default());
    let definition = WorkflowDefinition::from_yaml(AGENT_FLOW).unwrap();

    let run = h.manager.start_run(definition, vars(&[("ticket", "T-42")])).await.unwrap();

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.completed_node_count(), 3);
    assert_eq!(run.outputs["agent"].response.as_deref(), Some("Summary ready"));
    assert_eq!(run.outputs["notify"].response.as_deref(), Some("Result: Summary ready"));

    let request = &h.llm.requests()[0];
    assert!(format!("{:?}", request.messages).contains("Summarise ticket T-42"));

    assert_eq!(h.store.claim_holder("writer").unwrap(), None);
    let stored = h.manager.get_run(&run.id).unwrap().unwrap();
    assert_eq!(stored.status, RunStatus::Completed);
}

#[tokio::test]
async fn test_condition_routes_on_upstream_content() {
    let h = harness(MockLlmClient::new(vec![]), RetryPolicy::default());

    let urgent = h
        .manager
        .start_run(
            WorkflowDefinition::from_yaml(ROUTING_FLOW).unwrap(),
            vars(&[("ticket", "T-1"), ("priority", "urgent")]),
        )
        .await
        .unwrap();
    assert_eq!(urgent.status, RunStatus::Completed);
    assert_eq!(status_of(&urgent, "escalate"), NodeStatus::Completed);
    assert_eq!(status_of(&urgent, "backlog"), NodeStatus::Skipped);
    assert_eq!(urgent.outputs["escalate"].response.as_deref(), Some("escalating T-1"));

    let routine = h
        .manager
        .start_run(
            WorkflowDefinition::from_yaml(ROUTING_FLOW).unwrap(),
            vars(&[("ticket", "T-2"), ("priority", "low")]),
        )
        .await
        .unwrap();
    assert_eq!(status_of(&routine, "escalate"), NodeStatus::Skipped);
    assert_eq!(status_of(&routine, "backlog"), NodeStatus::Completed);
    assert_eq!(h.llm.call_count(), 0);
}

#[tokio::test]
async fn test_delay_pauses_then_resumes_when_due() {
    let h = harness(MockLlmClient::new(vec![]), RetryPolicy::default());
    let before = now_ms();
    let run = h
        .manager
        .start_run(WorkflowDefinition::from_yaml(DELAY_FLOW).unwrap(), BTreeMap::new())
        .await
        .unwrap();
    let after = now_ms();

    assert_eq!(run.status, RunStatus::Paused);
    assert_eq!(run.paused_at_node_id.as_deref(), Some("wait"));
    let resume_at = match run.suspension {
        Some(Suspension::Delay { resume_at, delay_ms }) => {
            assert_eq!(delay_ms, 300_000);
            resume_at
        }
        other => panic!("unexpected suspension {:?}", other),
    };
    assert!(resume_at >= before + 300_000 && resume_at <= after + 300_000);

    let jobs = h.manager.pending_jobs().await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].run_at_ms, resume_at);

    assert!(h.manager.process_due_jobs(after).await.unwrap().is_empty());
    let processed = h.manager.process_due_jobs(resume_at).await.unwrap();
    assert_eq!(processed.len(), 1);

    let finished = h.manager.get_run(&run.id).unwrap().unwrap();
    assert_eq!(finished.status, RunStatus::Completed);
    assert_eq!(status_of(&finished, "remind"), NodeStatus::Completed);
    assert!(h.manager.pending_jobs().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_approval_resume_does_not_recompute_finished_nodes() {
    let h = harness(MockLlmClient::new(vec![summary_reply()]), RetryPolicy::default());
    let run = h
        .manager
        .start_run(WorkflowDefinition::from_yaml(APPROVAL_FLOW).unwrap(), BTreeMap::new())
        .await
        .unwrap();

    assert_eq!(run.status, RunStatus::Paused);
    assert_eq!(run.paused_at_node_id.as_deref(), Some("review"));
    assert!(!run.outputs.contains_key("send"));
    assert_eq!(h.llm.call_count(), 1);
    let session_id = run.outputs["agent"].data["session_id"].clone();

    h.manager.resolve_approval(&run.id, approve(true)).await.unwrap();
    h.manager.process_due_jobs(now_ms()).await.unwrap();

    let finished = h.manager.get_run(&run.id).unwrap().unwrap();
    assert_eq!(finished.status, RunStatus::Completed);
    assert_eq!(h.llm.call_count(), 1);
    assert_eq!(finished.outputs["agent"].data["session_id"], session_id);
    assert_eq!(finished.outputs["review"].data["decided_by"], "lead-1");
    assert_eq!(finished.outputs["send"].response.as_deref(), Some("approved by lead-1"));
}

#[tokio::test]
async fn test_rejected_approval_fails_run() {
    let h = harness(MockLlmClient::new(vec![summary_reply()]), RetryPolicy::default());
    let run = h
        .manager
        .start_run(WorkflowDefinition::from_yaml(APPROVAL_FLOW).unwrap(), BTreeMap::new())
        .await
        .unwrap();

    h.manager.resolve_approval(&run.id, approve(false)).await.unwrap();
    h.manager.process_due_jobs(now_ms()).await.unwrap();

    let finished = h.manager.get_run(&run.id).unwrap().unwrap();
    assert_eq!(finished.status, RunStatus::Failed);
    assert_eq!(finished.error.unwrap().kind, FailureKind::Rejected);
    assert!(!finished.outputs.contains_key("send"));
    assert_eq!(h.manager.list_runs(Some(RunStatus::Failed)).unwrap().len(), 1);
}

#[tokio::test]
async fn test_provider_failure_is_retried_then_fails() {
    let h = harness(MockLlmClient::failing("connection reset"), RetryPolicy::new(1, 10, 10));
    let run = h
        .manager
        .start_run(WorkflowDefinition::from_yaml(AGENT_FLOW).unwrap(), BTreeMap::new())
        .await
        .unwrap();

    assert_eq!(run.status, RunStatus::Running);
    assert_eq!(run.attempts, 1);
    assert!(!run.outputs.contains_key("agent"));
    let jobs = h.manager.pending_jobs().await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert!(jobs[0].resume_from_node_id.is_none());

    h.manager.process_due_jobs(jobs[0].run_at_ms).await.unwrap();

    let finished = h.manager.get_run(&run.id).unwrap().unwrap();
    assert_eq!(finished.status, RunStatus::Failed);
    assert_eq!(finished.error.unwrap().kind, FailureKind::Provider);
    assert_eq!(h.llm.call_count(), 2);
    assert!(h.manager.pending_jobs().await.unwrap().is_empty());
}
