//! Continuation jobs and the queue that schedules them

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{NodeOutput, ResumeSignal, Suspension};
use crate::error::{AgentflowError, Result};
use crate::id::{generate_job_id, now_ms};
use crate::workflow::ResumePoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Leased,
    Done,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Leased => "leased",
            Self::Done => "done",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "leased" => Some(Self::Leased),
            "done" => Some(Self::Done),
            _ => None,
        }
    }
}

/// Work item that continues a workflow run.
///
/// Without `resume_from_node_id` the run re-enters from its recorded outputs
/// (provider retry); with it, the named node receives `trigger`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContinuationJob {
    pub id: String,
    pub workflow_run_id: String,
    #[serde(default)]
    pub resume_from_node_id: Option<String>,
    #[serde(default)]
    pub trigger: Option<ResumeSignal>,
    #[serde(default)]
    pub suspension: Option<Suspension>,
    #[serde(default)]
    pub outputs: BTreeMap<String, NodeOutput>,
    pub run_at_ms: i64,
    #[serde(default)]
    pub attempts: u32,
    pub status: JobStatus,
    #[serde(default)]
    pub last_error: Option<String>,
    pub created_at: i64,
}

impl ContinuationJob {
    /// Resume `node_id` with `trigger` at `run_at_ms`
    pub fn resume(
        workflow_run_id: impl Into<String>,
        node_id: impl Into<String>,
        trigger: ResumeSignal,
        suspension: Option<Suspension>,
        outputs: BTreeMap<String, NodeOutput>,
        run_at_ms: i64,
    ) -> Self {
        let workflow_run_id = workflow_run_id.into();
        Self {
            id: generate_job_id(&workflow_run_id),
            workflow_run_id,
            resume_from_node_id: Some(node_id.into()),
            trigger: Some(trigger),
            suspension,
            outputs,
            run_at_ms,
            attempts: 0,
            status: JobStatus::Queued,
            last_error: None,
            created_at: now_ms(),
        }
    }

    /// Re-run the remaining nodes after a retryable failure
    pub fn retry(workflow_run_id: impl Into<String>, outputs: BTreeMap<String, NodeOutput>, run_at_ms: i64) -> Self {
        let workflow_run_id = workflow_run_id.into();
        Self {
            id: generate_job_id(&workflow_run_id),
            workflow_run_id,
            resume_from_node_id: None,
            trigger: None,
            suspension: None,
            outputs,
            run_at_ms,
            attempts: 0,
            status: JobStatus::Queued,
            last_error: None,
            created_at: now_ms(),
        }
    }

    pub fn is_due(&self, now: i64) -> bool {
        self.status == JobStatus::Queued && self.run_at_ms <= now
    }

    pub fn resume_point(&self) -> Option<ResumePoint> {
        match (&self.resume_from_node_id, &self.trigger) {
            (Some(node_id), Some(signal)) => Some(ResumePoint {
                node_id: node_id.clone(),
                suspension: self.suspension.clone(),
                signal: signal.clone(),
            }),
            _ => None,
        }
    }
}

/// Persistent queue of continuation jobs
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: ContinuationJob) -> Result<()>;

    /// Atomically move every due queued job to leased and return them
    async fn lease_due(&self, now: i64) -> Result<Vec<ContinuationJob>>;

    async fn complete(&self, job_id: &str) -> Result<()>;

    /// Put a leased job back in the queue for `run_at_ms`
    async fn retry(&self, job_id: &str, run_at_ms: i64, error: &str) -> Result<()>;

    /// Jobs not yet done, ordered by run time
    async fn pending(&self) -> Result<Vec<ContinuationJob>>;
}

/// Process-local queue for tests and single-shot runs
#[derive(Debug, Default)]
pub struct InMemoryJobQueue {
    jobs: Mutex<Vec<ContinuationJob>>,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<ContinuationJob>>> {
        self.jobs
            .lock()
            .map_err(|e| AgentflowError::Storage(format!("job queue lock poisoned: {}", e)))
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, job: ContinuationJob) -> Result<()> {
        self.lock()?.push(job);
        Ok(())
    }

    async fn lease_due(&self, now: i64) -> Result<Vec<ContinuationJob>> {
        let mut jobs = self.lock()?;
        let mut leased = Vec::new();
        for job in jobs.iter_mut().filter(|j| j.is_due(now)) {
            job.status = JobStatus::Leased;
            leased.push(job.clone());
        }
        leased.sort_by_key(|j| j.run_at_ms);
        Ok(leased)
    }

    async fn complete(&self, job_id: &str) -> Result<()> {
        let mut jobs = self.lock()?;
        let job = jobs
            .iter_mut()
            .find(|j| j.id == job_id)
            .ok_or_else(|| AgentflowError::NotFound(format!("job {}", job_id)))?;
        job.status = JobStatus::Done;
        Ok(())
    }

    async fn retry(&self, job_id: &str, run_at_ms: i64, error: &str) -> Result<()> {
        let mut jobs = self.lock()?;
        let job = jobs
            .iter_mut()
            .find(|j| j.id == job_id)
            .ok_or_else(|| AgentflowError::NotFound(format!("job {}", job_id)))?;
        job.status = JobStatus::Queued;
        job.run_at_ms = run_at_ms;
        job.attempts += 1;
        job.last_error = Some(error.to_string());
        Ok(())
    }

    async fn pending(&self) -> Result<Vec<ContinuationJob>> {
        let mut pending: Vec<_> = self
            .lock()?
            .iter()
            .filter(|j| j.status != JobStatus::Done)
            .cloned()
            .collect();
        pending.sort_by_key(|j| j.run_at_ms);
        Ok(pending)
    }
}
