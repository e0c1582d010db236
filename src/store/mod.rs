//! Storage layer for agentflow.
//!
//! Persistence for workflow runs uses a dual-storage approach:
//! - **JSONL file**: Append-only log (source of truth)
//! - **SQLite database**: Query index (rebuilt from JSONL)
//!
//! The SQLite side also backs agent claims, approval rules and the job queue.
//!
//! # Example
//!
//! ```ignore
//! use agentflow::store::FlowStore;
//! use std::path::Path;
//!
//! let store = FlowStore::open(Path::new("/path/to/project"))?;
//! store.save_run(&run)?;
//! let paused = store.list_runs_by_status(RunStatus::Paused)?;
//! ```

mod flow_store;

pub use flow_store::{FlowStore, compute_project_hash};
