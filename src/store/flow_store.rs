//! FlowStore implementation with JSONL append log and SQLite index.
//!
//! - **JSONL file**: Append-only log of every run record change (source of truth)
//! - **SQLite database**: Query index over runs, rebuilt from JSONL on open
//!
//! The same database hosts the agent claim table, stored approval rules and
//! the continuation job queue.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};
use sha2::{Digest, Sha256};

use crate::agents::AgentClaims;
use crate::approval::{ApprovalDecision, ApprovalRule, ApprovalRuleStore};
use crate::domain::{RunStatus, WorkflowRun};
use crate::error::{AgentflowError, Result};
use crate::id::now_ms;
use crate::queue::{ContinuationJob, JobQueue, JobStatus};

/// Persistence for runs, claims, rules and jobs
pub struct FlowStore {
    base_dir: PathBuf,
    jsonl_path: PathBuf,
    db: Mutex<Connection>,
}

impl FlowStore {
    /// Open or create the store for a project directory.
    ///
    /// The store lives at `~/.agentflow/<project-hash>/.flowstore/`.
    pub fn open(project_dir: &Path) -> Result<Self> {
        let project_hash = compute_project_hash(project_dir)?;
        let base = dirs::home_dir()
            .ok_or_else(|| AgentflowError::Storage("cannot determine home directory".into()))?
            .join(".agentflow")
            .join(project_hash);
        Self::open_at(&base)
    }

    /// Open or create a store at the given directory
    pub fn open_at(base_dir: &Path) -> Result<Self> {
        let store_dir = base_dir.join(".flowstore");
        fs::create_dir_all(&store_dir)?;

        let jsonl_path = store_dir.join("runs.jsonl");
        let db = Connection::open(store_dir.join("flowstore.db"))?;
        Self::init_schema(&db)?;

        let store = Self {
            base_dir: base_dir.to_path_buf(),
            jsonl_path,
            db: Mutex::new(db),
        };
        store.rebuild_index_if_needed()?;
        Ok(store)
    }

    fn init_schema(db: &Connection) -> Result<()> {
        db.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS runs (
                id TEXT PRIMARY KEY,
                workflow_id TEXT NOT NULL,
                status TEXT NOT NULL,
                paused_at_node TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                json_data TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_runs_status ON runs(status);
            CREATE INDEX IF NOT EXISTS idx_runs_workflow ON runs(workflow_id);
            CREATE INDEX IF NOT EXISTS idx_runs_created ON runs(created_at);

            CREATE TABLE IF NOT EXISTS agent_claims (
                agent_id TEXT PRIMARY KEY,
                status TEXT NOT NULL DEFAULT 'idle',
                holder TEXT,
                claimed_at INTEGER
            );

            CREATE TABLE IF NOT EXISTS approval_rules (
                project_id TEXT NOT NULL,
                agent_id TEXT NOT NULL,
                tool_name TEXT NOT NULL,
                decision TEXT NOT NULL,
                PRIMARY KEY (project_id, agent_id, tool_name)
            );

            CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                run_id TEXT NOT NULL,
                status TEXT NOT NULL,
                run_at INTEGER NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 0,
                last_error TEXT,
                json_data TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_jobs_due ON jobs(status, run_at);
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db
            .lock()
            .map_err(|e| AgentflowError::Storage(format!("database lock poisoned: {}", e)))
    }

    fn rebuild_index_if_needed(&self) -> Result<()> {
        if !self.jsonl_path.exists() {
            return Ok(());
        }

        let jsonl_lines = self.count_jsonl_lines()?;
        let db_count: i64 = self
            .conn()?
            .query_row("SELECT COUNT(*) FROM runs", [], |row| row.get(0))
            .unwrap_or(0);

        if jsonl_lines as i64 > db_count || db_count == 0 {
            self.rebuild_index()?;
        }
        Ok(())
    }

    fn count_jsonl_lines(&self) -> Result<usize> {
        let reader = BufReader::new(File::open(&self.jsonl_path)?);
        Ok(reader.lines().count())
    }

    /// Rebuild the runs index from the JSONL log, keeping the latest version of each run
    pub fn rebuild_index(&self) -> Result<()> {
        let mut db = self.conn()?;
        db.execute("DELETE FROM runs", [])?;

        if !self.jsonl_path.exists() {
            return Ok(());
        }

        let reader = BufReader::new(File::open(&self.jsonl_path)?);
        let mut runs: HashMap<String, WorkflowRun> = HashMap::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let run: WorkflowRun = serde_json::from_str(&line)?;
            runs.insert(run.id.clone(), run);
        }

        let tx = db.transaction()?;
        for run in runs.values() {
            Self::insert_run_into_db(&tx, run)?;
        }
        tx.commit()?;
        log::debug!("rebuilt run index with {} runs", runs.len());
        Ok(())
    }

    fn insert_run_into_db(db: &Connection, run: &WorkflowRun) -> Result<()> {
        let json_data = serde_json::to_string(run)?;
        db.execute(
            r#"
            INSERT OR REPLACE INTO runs
            (id, workflow_id, status, paused_at_node, created_at, updated_at, json_data)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                run.id,
                run.workflow_id,
                run.status.as_str(),
                run.paused_at_node_id,
                run.created_at,
                run.updated_at,
                json_data,
            ],
        )?;
        Ok(())
    }

    /// Persist a run (new or updated)
    pub fn save_run(&self, run: &WorkflowRun) -> Result<()> {
        let json = serde_json::to_string(run)?;
        let mut file = OpenOptions::new().create(true).append(true).open(&self.jsonl_path)?;
        writeln!(file, "{}", json)?;

        let db = self.conn()?;
        Self::insert_run_into_db(&db, run)
    }

    pub fn get_run(&self, id: &str) -> Result<Option<WorkflowRun>> {
        let json: Option<String> = self
            .conn()?
            .query_row("SELECT json_data FROM runs WHERE id = ?1", [id], |row| row.get(0))
            .optional()?;
        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub fn list_runs(&self) -> Result<Vec<WorkflowRun>> {
        self.query_runs("SELECT json_data FROM runs ORDER BY created_at", [])
    }

    pub fn list_runs_by_status(&self, status: RunStatus) -> Result<Vec<WorkflowRun>> {
        self.query_runs(
            "SELECT json_data FROM runs WHERE status = ?1 ORDER BY created_at",
            [status.as_str()],
        )
    }

    pub fn count_by_status(&self, status: RunStatus) -> Result<usize> {
        let count: i64 = self.conn()?.query_row(
            "SELECT COUNT(*) FROM runs WHERE status = ?1",
            [status.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn query_runs<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<Vec<WorkflowRun>> {
        let db = self.conn()?;
        let mut stmt = db.prepare(sql)?;
        let rows = stmt.query_map(params, |row| row.get::<_, String>(0))?;

        let mut runs = Vec::new();
        for row in rows {
            runs.push(serde_json::from_str(&row?)?);
        }
        Ok(runs)
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Directory for audit JSONL files
    pub fn audit_dir(&self) -> PathBuf {
        self.base_dir.join("audit")
    }

    /// Current holder of an agent claim, if working
    pub fn claim_holder(&self, agent_id: &str) -> Result<Option<String>> {
        let holder: Option<Option<String>> = self
            .conn()?
            .query_row(
                "SELECT holder FROM agent_claims WHERE agent_id = ?1 AND status = 'working'",
                [agent_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(holder.flatten())
    }

    fn job_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(String, String, i64, u32, Option<String>)> {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
    }

    fn decode_job(
        (json, status, run_at, attempts, last_error): (String, String, i64, u32, Option<String>),
    ) -> Result<ContinuationJob> {
        let mut job: ContinuationJob = serde_json::from_str(&json)?;
        job.status = JobStatus::parse(&status)
            .ok_or_else(|| AgentflowError::Storage(format!("unknown job status '{}'", status)))?;
        job.run_at_ms = run_at;
        job.attempts = attempts;
        job.last_error = last_error;
        Ok(job)
    }
}

/// Compute a hash of the project directory path for storage isolation.
pub fn compute_project_hash(project_dir: &Path) -> Result<String> {
    let canonical = project_dir.canonicalize()?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.to_string_lossy().as_bytes());
    let result = hasher.finalize();
    Ok(hex::encode(&result[..8]))
}

#[async_trait]
impl AgentClaims for FlowStore {
    async fn try_claim(&self, agent_id: &str, holder: &str) -> Result<bool> {
        let db = self.conn()?;
        db.execute(
            "INSERT OR IGNORE INTO agent_claims (agent_id, status) VALUES (?1, 'idle')",
            [agent_id],
        )?;
        let changed = db.execute(
            "UPDATE agent_claims SET status = 'working', holder = ?2, claimed_at = ?3 \
             WHERE agent_id = ?1 AND (status = 'idle' OR holder = ?2)",
            params![agent_id, holder, now_ms()],
        )?;
        Ok(changed == 1)
    }

    async fn release(&self, agent_id: &str, holder: &str) -> Result<()> {
        self.conn()?.execute(
            "UPDATE agent_claims SET status = 'idle', holder = NULL, claimed_at = NULL \
             WHERE agent_id = ?1 AND holder = ?2",
            params![agent_id, holder],
        )?;
        Ok(())
    }
}

#[async_trait]
impl ApprovalRuleStore for FlowStore {
    async fn lookup(&self, project_id: &str, agent_id: &str, tool_name: &str) -> Result<Option<ApprovalDecision>> {
        let decision: Option<String> = self
            .conn()?
            .query_row(
                "SELECT decision FROM approval_rules WHERE project_id = ?1 AND agent_id = ?2 AND tool_name = ?3",
                params![project_id, agent_id, tool_name],
                |row| row.get(0),
            )
            .optional()?;
        match decision {
            Some(s) => ApprovalDecision::parse(&s)
                .map(Some)
                .ok_or_else(|| AgentflowError::Storage(format!("unknown approval decision '{}'", s))),
            None => Ok(None),
        }
    }

    async fn upsert(&self, rule: ApprovalRule) -> Result<()> {
        self.conn()?.execute(
            "INSERT OR REPLACE INTO approval_rules (project_id, agent_id, tool_name, decision) VALUES (?1, ?2, ?3, ?4)",
            params![rule.project_id, rule.agent_id, rule.tool_name, rule.decision.as_str()],
        )?;
        Ok(())
    }
}

#[async_trait]
impl JobQueue for FlowStore {
    async fn enqueue(&self, job: ContinuationJob) -> Result<()> {
        let json = serde_json::to_string(&job)?;
        self.conn()?.execute(
            "INSERT OR REPLACE INTO jobs (id, run_id, status, run_at, attempts, last_error, json_data) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                job.id,
                job.workflow_run_id,
                job.status.as_str(),
                job.run_at_ms,
                job.attempts,
                job.last_error,
                json,
            ],
        )?;
        Ok(())
    }

    async fn lease_due(&self, now: i64) -> Result<Vec<ContinuationJob>> {
        let mut db = self.conn()?;
        let tx = db.transaction()?;
        let due = {
            let mut stmt = tx.prepare(
                "SELECT json_data, status, run_at, attempts, last_error, id FROM jobs \
                 WHERE status = 'queued' AND run_at <= ?1 ORDER BY run_at",
            )?;
            let rows = stmt.query_map([now], |row| Ok((Self::job_from_row(row)?, row.get::<_, String>(5)?)))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };

        let mut leased = Vec::new();
        for (row, id) in due {
            let changed = tx.execute(
                "UPDATE jobs SET status = 'leased' WHERE id = ?1 AND status = 'queued'",
                [&id],
            )?;
            if changed == 1 {
                let mut job = Self::decode_job(row)?;
                job.status = JobStatus::Leased;
                leased.push(job);
            }
        }
        tx.commit()?;
        Ok(leased)
    }

    async fn complete(&self, job_id: &str) -> Result<()> {
        let changed = self
            .conn()?
            .execute("UPDATE jobs SET status = 'done' WHERE id = ?1", [job_id])?;
        if changed == 0 {
            return Err(AgentflowError::NotFound(format!("job {}", job_id)));
        }
        Ok(())
    }

    async fn retry(&self, job_id: &str, run_at_ms: i64, error: &str) -> Result<()> {
        let changed = self.conn()?.execute(
            "UPDATE jobs SET status = 'queued', run_at = ?2, attempts = attempts + 1, last_error = ?3 WHERE id = ?1",
            params![job_id, run_at_ms, error],
        )?;
        if changed == 0 {
            return Err(AgentflowError::NotFound(format!("job {}", job_id)));
        }
        Ok(())
    }

    async fn pending(&self) -> Result<Vec<ContinuationJob>> {
        let db = self.conn()?;
        let mut stmt = db.prepare(
            "SELECT json_data, status, run_at, attempts, last_error FROM jobs \
             WHERE status != 'done' ORDER BY run_at",
        )?;
        let rows = stmt.query_map([], Self::job_from_row)?;

        let mut jobs = Vec::new();
        for row in rows {
            jobs.push(Self::decode_job(row?)?);
        }
        Ok(jobs)
    }
}
