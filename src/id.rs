//! ID generation utilities for agentflow
//!
//! Provides functions for generating identifiers for sessions, runs, actions and jobs.

use rand::Rng;

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn random_suffix() -> String {
    let random: u16 = rand::rng().random();
    format!("{:04x}", random)
}

/// Generate a unique session ID
///
/// Format: `ses-{timestamp_ms}-{random_hex}`
pub fn generate_session_id() -> String {
    format!("ses-{}-{}", now_ms(), random_suffix())
}

/// Generate a unique workflow run ID
///
/// Format: `run-{timestamp_ms}-{random_hex}`
/// Example: `run-1738300800123-a1b2`
pub fn generate_run_id() -> String {
    format!("run-{}-{}", now_ms(), random_suffix())
}

/// Generate an action record ID
///
/// Format: `act-{session_suffix}-{sequence:04}`
pub fn generate_action_id(session_id: &str, sequence: u32) -> String {
    let suffix = session_id.rsplit('-').next().unwrap_or(session_id);
    format!("act-{}-{:04}", suffix, sequence)
}

/// Generate a continuation job ID
///
/// Format: `job-{run_id}-{random_hex}`
pub fn generate_job_id(run_id: &str) -> String {
    format!("job-{}-{}", run_id, random_suffix())
}
