//! Audit sinks - fire-and-forget emission of action records and node outputs
//!
//! Sinks never fail the caller: write errors are logged and dropped.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Serialize;
use serde_json::json;

use crate::domain::{ActionRecord, NodeOutput, WorkflowRun};
use crate::error::{AgentflowError, Result};
use crate::id::now_ms;

pub trait AuditSink: Send + Sync {
    /// One tool call or model call of an agent session
    fn record_action(&self, run_id: Option<&str>, action: &ActionRecord);

    /// One finished node
    fn record_node(&self, run_id: &str, output: &NodeOutput);

    /// Run status transition
    fn record_run(&self, run: &WorkflowRun);
}

/// Writes audit events through the `log` facade
#[derive(Debug, Default)]
pub struct LogAuditSink;

impl AuditSink for LogAuditSink {
    fn record_action(&self, run_id: Option<&str>, action: &ActionRecord) {
        match &action.error {
            Some(error) => log::info!(
                "audit action {} run={} tool={} error={}",
                action.id,
                run_id.unwrap_or("-"),
                action.tool_name.as_deref().unwrap_or("-"),
                error
            ),
            None => log::info!(
                "audit action {} run={} type={:?} tool={} tokens={} {}ms",
                action.id,
                run_id.unwrap_or("-"),
                action.action_type,
                action.tool_name.as_deref().unwrap_or("-"),
                action.tokens_used,
                action.duration_ms
            ),
        }
    }

    fn record_node(&self, run_id: &str, output: &NodeOutput) {
        log::info!(
            "audit node {} run={} type={} status={:?}",
            output.node_id,
            run_id,
            output.node_type,
            output.status
        );
    }

    fn record_run(&self, run: &WorkflowRun) {
        log::info!("audit run {} workflow={} status={}", run.id, run.workflow_id, run.status);
    }
}

/// Appends audit events to `actions.jsonl`, `nodes.jsonl` and `runs.jsonl`
#[derive(Debug)]
pub struct JsonlAuditSink {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl JsonlAuditSink {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn append<T: Serialize>(&self, file: &str, event: &T) -> Result<()> {
        let _guard = self
            .lock
            .lock()
            .map_err(|e| AgentflowError::Storage(format!("audit lock poisoned: {}", e)))?;
        let mut out = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.join(file))?;
        writeln!(out, "{}", serde_json::to_string(event)?)?;
        Ok(())
    }

    fn emit<T: Serialize>(&self, file: &str, event: &T) {
        if let Err(e) = self.append(file, event) {
            log::warn!("audit write to {} failed: {}", file, e);
        }
    }
}

impl AuditSink for JsonlAuditSink {
    fn record_action(&self, run_id: Option<&str>, action: &ActionRecord) {
        self.emit(
            "actions.jsonl",
            &json!({ "run_id": run_id, "recorded_at": now_ms(), "action": action }),
        );
    }

    fn record_node(&self, run_id: &str, output: &NodeOutput) {
        self.emit(
            "nodes.jsonl",
            &json!({ "run_id": run_id, "recorded_at": now_ms(), "output": output }),
        );
    }

    fn record_run(&self, run: &WorkflowRun) {
        self.emit(
            "runs.jsonl",
            &json!({
                "run_id": run.id,
                "workflow_id": run.workflow_id,
                "status": run.status,
                "paused_at_node_id": run.paused_at_node_id,
                "error": run.error,
                "recorded_at": now_ms(),
            }),
        );
    }
}

/// Fans one event out to several sinks
#[derive(Default)]
pub struct AuditFanout {
    sinks: Vec<Box<dyn AuditSink>>,
}

impl AuditFanout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: impl AuditSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }
}

impl AuditSink for AuditFanout {
    fn record_action(&self, run_id: Option<&str>, action: &ActionRecord) {
        for sink in &self.sinks {
            sink.record_action(run_id, action);
        }
    }

    fn record_node(&self, run_id: &str, output: &NodeOutput) {
        for sink in &self.sinks {
            sink.record_node(run_id, output);
        }
    }

    fn record_run(&self, run: &WorkflowRun) {
        for sink in &self.sinks {
            sink.record_run(run);
        }
    }
}
