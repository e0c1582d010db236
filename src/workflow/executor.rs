//! Workflow executor - walks the graph in dependency order
//!
//! A pass starts from the outputs already recorded for the run, so resuming a
//! paused run re-enters the same algorithm and skips every node that already
//! has an output. Only the node the run paused at sees the resume signal.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::audit::AuditSink;
use crate::domain::{
    FailureKind, NodeExecution, NodeFailure, NodeOutput, NodeStatus, NodeType, ResumeSignal, Suspension, WorkflowDefinition,
    WorkflowExecutionResult, WorkflowRunContext,
};
use crate::error::{AgentflowError, Result};

use super::graph::{WorkflowGraph, edge_matches};
use super::registry::{NodeHandlerRegistry, NodeInput};

/// Where and how a paused run continues
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumePoint {
    pub node_id: String,
    /// What the node returned when it paused
    #[serde(default)]
    pub suspension: Option<Suspension>,
    pub signal: ResumeSignal,
}

pub struct WorkflowExecutor {
    registry: Arc<NodeHandlerRegistry>,
    audit: Option<Arc<dyn AuditSink>>,
}

impl WorkflowExecutor {
    pub fn new(registry: Arc<NodeHandlerRegistry>) -> Self {
        Self { registry, audit: None }
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Check references, acyclicity and handler coverage; returns the order
    pub fn validate(&self, definition: &WorkflowDefinition) -> Result<Vec<String>> {
        definition.check_references()?;
        let order = WorkflowGraph::new(definition).topological_sort()?;
        for node in &definition.nodes {
            self.registry.get(node.node_type())?;
        }
        Ok(order)
    }

    /// Run (or continue) a workflow.
    ///
    /// Configuration problems (cycle, missing handler, unknown resume node)
    /// are returned as errors before any node executes.
    pub async fn execute(
        &self,
        definition: &WorkflowDefinition,
        context: &WorkflowRunContext,
        prior_outputs: BTreeMap<String, NodeOutput>,
        resume: Option<&ResumePoint>,
    ) -> Result<WorkflowExecutionResult> {
        let order = self.validate(definition)?;
        if let Some(point) = resume.filter(|p| definition.node(&p.node_id).is_none()) {
            return Err(AgentflowError::InvalidWorkflow(format!(
                "cannot resume at unknown node '{}'",
                point.node_id
            )));
        }

        let graph = WorkflowGraph::new(definition);
        let mut outputs = prior_outputs;
        log::info!(
            "run {} executing {} nodes ({} already recorded)",
            context.workflow_run_id,
            order.len(),
            outputs.len()
        );

        for node_id in order {
            if outputs.contains_key(&node_id) {
                continue;
            }
            let Some(node) = definition.node(&node_id) else {
                continue;
            };

            if let Some(reason) = inactive_reason(definition, &node_id, &outputs) {
                log::debug!("node {} skipped: {}", node_id, reason);
                let output = NodeOutput::skipped(&node_id, node.node_type(), reason);
                self.emit(context, &output);
                outputs.insert(node_id, output);
                continue;
            }

            let upstream = graph.upstream_outputs(&node_id, &outputs);
            let mut input = NodeInput::new(node, &upstream, context);
            if let Some(point) = resume.filter(|p| p.node_id == node_id) {
                input = input.resuming(&point.signal, point.suspension.as_ref());
            }

            log::debug!("node {} ({}) executing", node_id, node.node_type());
            let output = match self.registry.execute(input).await {
                Ok(NodeExecution::Continue(output)) => output,
                Ok(NodeExecution::Suspend(suspension)) => {
                    log::info!(
                        "run {} paused at {} ({})",
                        context.workflow_run_id,
                        node_id,
                        suspension.reason()
                    );
                    return Ok(WorkflowExecutionResult::paused(outputs, node_id, suspension));
                }
                Err(e) => {
                    log::error!("node {} failed: {}", node_id, e);
                    NodeOutput::failed(&node_id, node.node_type(), NodeFailure::from(&e))
                }
            };

            self.emit(context, &output);
            let failure = (output.status == NodeStatus::Failed).then(|| {
                output
                    .failure
                    .clone()
                    .unwrap_or_else(|| NodeFailure::new(FailureKind::Tool, "node failed"))
            });
            outputs.insert(node_id.clone(), output);

            if let Some(failure) = failure {
                log::warn!("run {} failed at {}: {}", context.workflow_run_id, node_id, failure);
                return Ok(WorkflowExecutionResult::failed(outputs, failure));
            }
        }

        log::info!("run {} completed", context.workflow_run_id);
        Ok(WorkflowExecutionResult::completed(outputs))
    }

    fn emit(&self, context: &WorkflowRunContext, output: &NodeOutput) {
        if let Some(audit) = &self.audit {
            audit.record_node(&context.workflow_run_id, output);
        }
    }
}

/// Branch handle a completed node emits; only conditions emit one
pub fn emitted_handle(output: &NodeOutput) -> Option<&'static str> {
    if output.node_type != NodeType::Condition {
        return None;
    }
    output
        .data
        .get("result")
        .and_then(|v| v.as_bool())
        .map(|b| if b { "true" } else { "false" })
}

/// `None` when the node should run; otherwise why it is skipped.
///
/// Root nodes always run. Other nodes run when at least one incoming edge
/// comes from a completed node and matches that node's branch handle.
fn inactive_reason(
    definition: &WorkflowDefinition,
    node_id: &str,
    outputs: &BTreeMap<String, NodeOutput>,
) -> Option<&'static str> {
    let mut has_incoming = false;
    let mut completed_upstream = false;

    for edge in definition.edges.iter().filter(|e| e.target == node_id) {
        has_incoming = true;
        let Some(source) = outputs.get(&edge.source) else {
            continue;
        };
        if !source.is_completed() {
            continue;
        }
        completed_upstream = true;
        if edge_matches(edge, emitted_handle(source)) {
            return None;
        }
    }

    match (has_incoming, completed_upstream) {
        (false, _) => None,
        (true, true) => Some("branch_not_taken"),
        (true, false) => Some("upstream_skipped"),
    }
}
