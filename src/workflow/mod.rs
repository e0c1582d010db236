//! Workflow orchestration: graph ordering, node handlers and the executor

pub mod executor;
pub mod graph;
pub mod handlers;
pub mod registry;

pub use executor::{ResumePoint, WorkflowExecutor, emitted_handle};
pub use graph::{WorkflowGraph, topological_sort};
pub use handlers::{
    AgentHandler, ApprovalHandler, ConditionHandler, DelayHandler, EmailSender, OutputHandler, TriggerHandler,
};
pub use registry::{NodeHandler, NodeHandlerRegistry, NodeInput};
