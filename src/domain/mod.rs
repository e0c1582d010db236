//! Domain types for agentflow
//!
//! This module contains all core domain types:
//! - AgentSession / ActionRecord: one bounded agent execution and its append-only log
//! - WorkflowDefinition: typed nodes and branch-aware edges
//! - NodeOutput / WorkflowExecutionResult: per-node and per-run results
//! - Suspension / ResumeSignal: typed pause and resume events
//! - WorkflowRun: the persisted, resumable run record

pub mod action;
pub mod output;
pub mod run_record;
pub mod session;
pub mod suspension;
pub mod workflow;

pub use action::{ActionErrorKind, ActionRecord, ActionType};
pub use output::{FailureKind, NodeFailure, NodeOutput, NodeStatus, RunStatus, WorkflowExecutionResult};
pub use run_record::WorkflowRun;
pub use session::{AbortReason, AgentSession, SessionStatus};
pub use suspension::{NodeExecution, ResumeSignal, Suspension};
pub use workflow::{
    AgentNodeConfig, ApprovalNodeConfig, ConditionConfig, DelayConfig, DelayUnit, NodeKind, NodeType, OutputChannel,
    OutputConfig, TriggerConfig, WorkflowDefinition, WorkflowEdge, WorkflowNode, WorkflowRunContext,
};
