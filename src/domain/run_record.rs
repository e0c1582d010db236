//! Persisted workflow run record
//!
//! Holds everything needed to resume a run in another process: the
//! definition snapshot, run context, completed outputs, and the pause point.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::output::{NodeFailure, NodeOutput, RunStatus, WorkflowExecutionResult};
use crate::domain::suspension::Suspension;
use crate::domain::workflow::{WorkflowDefinition, WorkflowRunContext};
use crate::error::{AgentflowError, Result};
use crate::id::{generate_run_id, now_ms};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: String,
    pub workflow_id: String,
    pub project_id: String,
    pub status: RunStatus,

    pub definition: WorkflowDefinition,
    pub context: WorkflowRunContext,

    #[serde(default)]
    pub outputs: BTreeMap<String, NodeOutput>,
    #[serde(default)]
    pub paused_at_node_id: Option<String>,
    #[serde(default)]
    pub suspension: Option<Suspension>,
    #[serde(default)]
    pub error: Option<NodeFailure>,

    /// Provider-failure retries consumed so far
    #[serde(default)]
    pub attempts: u32,

    pub created_at: i64,
    pub updated_at: i64,
}

impl WorkflowRun {
    /// New run in `running` state with a fresh id
    pub fn new(definition: WorkflowDefinition, variables: BTreeMap<String, String>) -> Self {
        let id = generate_run_id();
        let now = now_ms();
        let context = WorkflowRunContext {
            workflow_id: definition.id.clone(),
            workflow_run_id: id.clone(),
            project_id: definition.project_id.clone(),
            variables,
        };

        Self {
            id,
            workflow_id: definition.id.clone(),
            project_id: definition.project_id.clone(),
            status: RunStatus::Running,
            definition,
            context,
            outputs: BTreeMap::new(),
            paused_at_node_id: None,
            suspension: None,
            error: None,
            attempts: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Fold an executor result into the record
    pub fn apply(&mut self, result: WorkflowExecutionResult) -> Result<()> {
        if self.status.is_terminal() {
            return Err(AgentflowError::InvalidState(format!(
                "run {} is already {}",
                self.id, self.status
            )));
        }
        self.status = result.status;
        self.outputs = result.outputs;
        self.paused_at_node_id = result.paused_at_node_id;
        self.suspension = result.suspension;
        self.error = result.error;
        self.updated_at = now_ms();
        Ok(())
    }

    /// paused -> running; any other source state is rejected
    pub fn mark_resuming(&mut self) -> Result<()> {
        if self.status != RunStatus::Paused {
            return Err(AgentflowError::InvalidState(format!(
                "run {} is {} and cannot be resumed",
                self.id, self.status
            )));
        }
        self.status = RunStatus::Running;
        self.updated_at = now_ms();
        Ok(())
    }

    /// Force a terminal failure (expired approval, exhausted retries)
    pub fn mark_failed(&mut self, failure: NodeFailure) {
        self.status = RunStatus::Failed;
        self.error = Some(failure);
        self.updated_at = now_ms();
    }

    pub fn completed_node_count(&self) -> usize {
        self.outputs.values().filter(|o| o.is_completed()).count()
    }
}
