//! Run manager - lifecycle of workflow runs and their continuation jobs

mod run_manager;

pub use run_manager::{ApprovalDecisionInput, RunManager};
