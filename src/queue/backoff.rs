//! Retry backoff for runs that failed on a provider error.
//!
//! The delay doubles per attempt (2^attempt × base) and is capped, the same
//! shape as the API rate-limit backoff.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Retry configuration for the continuation worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RetryPolicy {
    /// Attempts allowed after the first failure
    pub max_attempts: u32,
    /// Delay before the first retry (ms)
    pub base_backoff_ms: u64,
    /// Upper bound on any single delay (ms)
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff_ms: 5_000,
            max_backoff_ms: 120_000,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self {
            max_attempts,
            base_backoff_ms,
            max_backoff_ms,
        }
    }

    /// Delay before retry number `attempt` (0-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.min(20));
        let ms = self.base_backoff_ms.saturating_mul(factor).min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }

    /// Whether a run that already used `attempts` retries may try again
    pub fn allows(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }

    /// Absolute time of the next retry, or `None` once attempts are exhausted
    pub fn next_run_at(&self, run_id: &str, attempts: u32, now_ms: i64) -> Option<i64> {
        if !self.allows(attempts) {
            tracing::warn!(run_id = %run_id, attempts, "Retries exhausted");
            return None;
        }
        let delay = self.delay_for(attempts);
        tracing::warn!(
            run_id = %run_id,
            attempt = attempts + 1,
            retry_after_ms = delay.as_millis() as u64,
            "Provider failure, scheduling retry"
        );
        Some(now_ms.saturating_add(delay.as_millis() as i64))
    }
}
