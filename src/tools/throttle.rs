//! Per-session spacing of external tool calls

use std::time::Duration;

use crate::id::now_ms;

/// Enforces a minimum interval between consecutive tool calls of one session.
///
/// Built from the session's effective limits. Timestamps are millisecond
/// truncated, so a non-zero wait is padded by 1ms to keep the real gap at or
/// above the interval.
#[derive(Debug, Clone, Copy)]
pub struct ToolThrottle {
    min_interval_ms: u64,
}

impl ToolThrottle {
    pub fn new(min_interval_ms: u64) -> Self {
        Self { min_interval_ms }
    }

    /// Remaining wait if the previous call started at `last_call_at`
    pub fn remaining(&self, last_call_at: Option<i64>, now: i64) -> Option<Duration> {
        let last = last_call_at?;
        if self.min_interval_ms == 0 {
            return None;
        }
        let ready_at = last + self.min_interval_ms as i64;
        if now <= ready_at {
            Some(Duration::from_millis((ready_at - now) as u64 + 1))
        } else {
            None
        }
    }

    /// Wait until a call is allowed; returns the timestamp the call may start at
    pub async fn acquire(&self, last_call_at: Option<i64>) -> i64 {
        if let Some(wait) = self.remaining(last_call_at, now_ms()) {
            log::debug!("tool throttle: waiting {}ms", wait.as_millis());
            tokio::time::sleep(wait).await;
        }
        now_ms()
    }
}
