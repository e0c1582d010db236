//! Run Manager implementation
//!
//! RunManager owns the lifecycle of workflow runs: it starts them, persists
//! every state transition, schedules continuation jobs for delays, approvals
//! and provider retries, and processes those jobs when they fall due.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::agents::AgentClaims;
use crate::audit::AuditSink;
use crate::domain::{
    FailureKind, NodeFailure, NodeKind, NodeStatus, ResumeSignal, RunStatus, Suspension, WorkflowDefinition,
    WorkflowExecutionResult, WorkflowRun,
};
use crate::error::{AgentflowError, Result};
use crate::id::now_ms;
use crate::queue::{ContinuationJob, JobQueue, RetryPolicy};
use crate::store::FlowStore;
use crate::workflow::WorkflowExecutor;

/// Human decision on a paused run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalDecisionInput {
    pub approved: bool,
    pub decided_by: Option<String>,
    pub comment: Option<String>,
}

/// Manages workflow run lifecycle
pub struct RunManager {
    store: Arc<FlowStore>,
    jobs: Arc<dyn JobQueue>,
    claims: Arc<dyn AgentClaims>,
    executor: Arc<WorkflowExecutor>,
    audit: Arc<dyn AuditSink>,
    retry: RetryPolicy,
}

impl RunManager {
    pub fn new(
        store: Arc<FlowStore>,
        jobs: Arc<dyn JobQueue>,
        claims: Arc<dyn AgentClaims>,
        executor: Arc<WorkflowExecutor>,
        audit: Arc<dyn AuditSink>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            jobs,
            claims,
            executor,
            audit,
            retry,
        }
    }

    /// Validate, persist and execute a new run until it completes, fails or pauses.
    ///
    /// Invalid definitions (cycles, missing handlers) are rejected before a
    /// run record is created.
    pub async fn start_run(
        &self,
        definition: WorkflowDefinition,
        variables: BTreeMap<String, String>,
    ) -> Result<WorkflowRun> {
        self.executor.validate(&definition)?;

        let mut run = WorkflowRun::new(definition, variables);
        self.store.save_run(&run)?;
        self.audit.record_run(&run);
        log::info!("run {} started for workflow {}", run.id, run.workflow_id);

        let result = self
            .executor
            .execute(&run.definition, &run.context, BTreeMap::new(), None)
            .await?;
        self.settle(&mut run, result).await?;
        Ok(run)
    }

    /// Record a human decision and enqueue the continuation
    #[tracing::instrument(level = "debug", skip(self, decision))]
    pub async fn resolve_approval(&self, run_id: &str, decision: ApprovalDecisionInput) -> Result<ContinuationJob> {
        let run = self.require_run(run_id)?;
        let (node_id, suspension) = match (&run.status, &run.paused_at_node_id, &run.suspension) {
            (RunStatus::Paused, Some(node_id), Some(suspension @ Suspension::Approval { .. })) => {
                (node_id.clone(), suspension.clone())
            }
            _ => {
                return Err(AgentflowError::InvalidState(format!(
                    "run {} is not waiting for approval (status {})",
                    run_id, run.status
                )));
            }
        };

        if self.has_pending_job(run_id).await? {
            return Err(AgentflowError::InvalidState(format!(
                "run {} already has a pending decision",
                run_id
            )));
        }

        log::info!(
            "run {} approval at {}: {} by {}",
            run_id,
            node_id,
            if decision.approved { "approved" } else { "rejected" },
            decision.decided_by.as_deref().unwrap_or("unknown")
        );
        let signal = ResumeSignal::Approval {
            approved: decision.approved,
            decided_by: decision.decided_by,
            comment: decision.comment,
        };
        let job = ContinuationJob::resume(run_id, node_id, signal, Some(suspension), run.outputs, now_ms());
        self.jobs.enqueue(job.clone()).await?;
        Ok(job)
    }

    /// Expire overdue approvals, then run every job due at `now`
    pub async fn process_due_jobs(&self, now: i64) -> Result<Vec<WorkflowRun>> {
        self.expire_approvals(now).await?;

        let due = self.jobs.lease_due(now).await?;
        let mut processed = Vec::with_capacity(due.len());
        for job in due {
            match self.process_job(&job).await {
                Ok(Some(run)) => {
                    self.jobs.complete(&job.id).await?;
                    processed.push(run);
                }
                Ok(None) => self.jobs.complete(&job.id).await?,
                Err(e) => {
                    log::error!("job {} for run {} failed: {}", job.id, job.workflow_run_id, e);
                    match self.retry.next_run_at(&job.workflow_run_id, job.attempts, now) {
                        Some(at) => self.jobs.retry(&job.id, at, &e.to_string()).await?,
                        None => {
                            self.jobs.complete(&job.id).await?;
                            if let Some(mut run) = self.store.get_run(&job.workflow_run_id)? {
                                if !run.status.is_terminal() {
                                    run.mark_failed(NodeFailure::from(&e));
                                    self.persist(&run)?;
                                }
                            }
                        }
                    }
                }
            }
        }
        Ok(processed)
    }

    async fn process_job(&self, job: &ContinuationJob) -> Result<Option<WorkflowRun>> {
        let Some(mut run) = self.store.get_run(&job.workflow_run_id)? else {
            log::warn!("job {} references missing run {}", job.id, job.workflow_run_id);
            return Ok(None);
        };

        let point = job.resume_point();
        match (&point, run.status) {
            (Some(_), RunStatus::Paused) => run.mark_resuming()?,
            // An earlier attempt of this job already moved the run to running
            (Some(_), RunStatus::Running) if job.attempts > 0 => {
                log::info!("job {} re-entering run {} (attempt {})", job.id, run.id, job.attempts + 1);
            }
            (None, RunStatus::Running) => {}
            (_, status) => {
                log::warn!("job {} skipped: run {} is {}", job.id, run.id, status);
                return Ok(None);
            }
        }
        self.store.save_run(&run)?;

        let result = match self
            .executor
            .execute(&run.definition, &run.context, job.outputs.clone(), point.as_ref())
            .await
        {
            Ok(result) => result,
            Err(e) if e.is_configuration() => {
                run.mark_failed(NodeFailure::from(&e));
                self.persist(&run)?;
                return Ok(Some(run));
            }
            Err(e) => return Err(e),
        };
        self.settle(&mut run, result).await?;
        Ok(Some(run))
    }

    /// Fold an executor result into the run and schedule what comes next
    async fn settle(&self, run: &mut WorkflowRun, result: WorkflowExecutionResult) -> Result<()> {
        let retryable = result.status == RunStatus::Failed
            && result.error.as_ref().is_some_and(|e| e.kind.is_retryable());
        if retryable {
            if let Some(at) = self.retry.next_run_at(&run.id, run.attempts, now_ms()) {
                let outputs: BTreeMap<_, _> = result
                    .outputs
                    .into_iter()
                    .filter(|(_, o)| o.status != NodeStatus::Failed)
                    .collect();
                run.attempts += 1;
                run.outputs = outputs.clone();
                run.error = result.error;
                run.updated_at = now_ms();
                self.persist(run)?;
                self.jobs.enqueue(ContinuationJob::retry(&run.id, outputs, at)).await?;
                return Ok(());
            }
        }

        run.apply(result)?;
        self.persist(run)?;

        match (&run.status, &run.suspension, &run.paused_at_node_id) {
            (RunStatus::Paused, Some(suspension @ Suspension::Delay { resume_at, .. }), Some(node_id)) => {
                let job = ContinuationJob::resume(
                    &run.id,
                    node_id,
                    ResumeSignal::Timer,
                    Some(suspension.clone()),
                    run.outputs.clone(),
                    *resume_at,
                );
                log::info!("run {} will resume at {} ({})", run.id, resume_at, node_id);
                self.jobs.enqueue(job).await?;
            }
            (RunStatus::Paused, Some(Suspension::Approval { approver_role, .. }), Some(node_id)) => {
                log::info!("run {} awaits approval from {} at {}", run.id, approver_role, node_id);
            }
            (RunStatus::Completed, _, _) => log::info!("run {} completed", run.id),
            (RunStatus::Failed, _, _) => log::warn!(
                "run {} failed: {}",
                run.id,
                run.error.as_ref().map(|e| e.to_string()).unwrap_or_default()
            ),
            _ => {}
        }
        Ok(())
    }

    /// Fail paused runs whose approval deadline has passed.
    ///
    /// A run whose decision is already queued is left for the worker.
    pub async fn expire_approvals(&self, now: i64) -> Result<usize> {
        let queued: Vec<String> = self
            .jobs
            .pending()
            .await?
            .into_iter()
            .map(|j| j.workflow_run_id)
            .collect();

        let mut expired = 0;
        for mut run in self.store.list_runs_by_status(RunStatus::Paused)? {
            let Some(deadline) = run.suspension.as_ref().and_then(Suspension::approval_deadline) else {
                continue;
            };
            if deadline > now {
                continue;
            }
            if queued.contains(&run.id) {
                log::debug!("run {} approval overdue but a decision is queued", run.id);
                continue;
            }

            log::warn!("run {} approval expired", run.id);
            if let Some(node) = run.paused_at_node_id.as_deref().and_then(|id| run.definition.node(id)) {
                if let NodeKind::Agent(config) = &node.config {
                    self.claims.release(&config.agent_id, &run.id).await?;
                }
            }
            run.mark_failed(NodeFailure::new(FailureKind::Rejected, "approval timed out"));
            self.persist(&run)?;
            expired += 1;
        }
        Ok(expired)
    }

    pub fn get_run(&self, run_id: &str) -> Result<Option<WorkflowRun>> {
        self.store.get_run(run_id)
    }

    pub fn list_runs(&self, status: Option<RunStatus>) -> Result<Vec<WorkflowRun>> {
        match status {
            Some(status) => self.store.list_runs_by_status(status),
            None => self.store.list_runs(),
        }
    }

    pub async fn pending_jobs(&self) -> Result<Vec<ContinuationJob>> {
        self.jobs.pending().await
    }

    async fn has_pending_job(&self, run_id: &str) -> Result<bool> {
        Ok(self.jobs.pending().await?.iter().any(|j| j.workflow_run_id == run_id))
    }

    fn require_run(&self, run_id: &str) -> Result<WorkflowRun> {
        self.store
            .get_run(run_id)?
            .ok_or_else(|| AgentflowError::NotFound(format!("run {}", run_id)))
    }

    fn persist(&self, run: &WorkflowRun) -> Result<()> {
        self.store.save_run(run)?;
        self.audit.record_run(run);
        Ok(())
    }
}
