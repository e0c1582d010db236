//! Safety governor - pure policy deciding whether a session may continue
//!
//! Checks run in a fixed priority order: duration, action count, tokens,
//! consecutive errors. The first limit hit wins.

use serde::{Deserialize, Serialize};

use crate::domain::{AbortReason, AgentSession};
use crate::id::now_ms;

/// Per-session limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SafetyLimits {
    #[serde(default = "default_max_actions")]
    pub max_actions_per_session: u32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens_per_session: u64,
    #[serde(default = "default_max_duration_ms")]
    pub max_duration_ms: u64,
    #[serde(default = "default_max_consecutive_errors")]
    pub max_consecutive_errors: u32,
    #[serde(default = "default_tool_call_min_interval_ms")]
    pub tool_call_min_interval_ms: u64,
}

fn default_max_actions() -> u32 {
    25
}

fn default_max_tokens() -> u64 {
    200_000
}

fn default_max_duration_ms() -> u64 {
    10 * 60 * 1000
}

fn default_max_consecutive_errors() -> u32 {
    3
}

fn default_tool_call_min_interval_ms() -> u64 {
    500
}

impl Default for SafetyLimits {
    fn default() -> Self {
        Self {
            max_actions_per_session: default_max_actions(),
            max_tokens_per_session: default_max_tokens(),
            max_duration_ms: default_max_duration_ms(),
            max_consecutive_errors: default_max_consecutive_errors(),
            tool_call_min_interval_ms: default_tool_call_min_interval_ms(),
        }
    }
}

impl SafetyLimits {
    pub fn with_max_actions(mut self, max: u32) -> Self {
        self.max_actions_per_session = max;
        self
    }

    pub fn with_max_tokens(mut self, max: u64) -> Self {
        self.max_tokens_per_session = max;
        self
    }

    pub fn with_max_duration_ms(mut self, max: u64) -> Self {
        self.max_duration_ms = max;
        self
    }

    pub fn with_max_consecutive_errors(mut self, max: u32) -> Self {
        self.max_consecutive_errors = max;
        self
    }

    pub fn with_tool_interval_ms(mut self, interval: u64) -> Self {
        self.tool_call_min_interval_ms = interval;
        self
    }
}

/// Governor decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Continue,
    Abort(AbortReason),
}

/// Evaluate a session against its limits at time `now`
pub fn evaluate(session: &AgentSession, limits: &SafetyLimits, now: i64) -> Verdict {
    if session.elapsed_ms(now) >= limits.max_duration_ms as i64 {
        return Verdict::Abort(AbortReason::DurationExceeded);
    }
    if session.action_count >= limits.max_actions_per_session {
        return Verdict::Abort(AbortReason::MaxActionsExceeded);
    }
    if session.total_tokens >= limits.max_tokens_per_session {
        return Verdict::Abort(AbortReason::MaxTokensExceeded);
    }
    if session.consecutive_errors >= limits.max_consecutive_errors {
        return Verdict::Abort(AbortReason::TooManyErrors);
    }
    Verdict::Continue
}

/// Limits bound to the wall clock
#[derive(Debug, Clone, Default)]
pub struct SafetyGovernor {
    limits: SafetyLimits,
}

impl SafetyGovernor {
    pub fn new(limits: SafetyLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &SafetyLimits {
        &self.limits
    }

    pub fn evaluate(&self, session: &AgentSession) -> Verdict {
        let verdict = evaluate(session, &self.limits, now_ms());
        if let Verdict::Abort(reason) = verdict {
            log::warn!(
                "session {} (agent {}) stopped by safety governor: {}",
                session.session_id,
                session.agent_id,
                reason
            );
        }
        verdict
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_at(start: i64) -> AgentSession {
        let mut session = AgentSession::new("agent", "proj");
        session.started_at = start;
        session
    }

    #[test]
    fn test_fresh_session_continues() {
        let session = session_at(1_000);
        assert_eq!(evaluate(&session, &SafetyLimits::default(), 1_001), Verdict::Continue);
    }

    #[test]
    fn test_duration_limit_is_inclusive() {
        let session = session_at(0);
        let limits = SafetyLimits::default().with_max_duration_ms(1_000);
        assert_eq!(evaluate(&session, &limits, 999), Verdict::Continue);
        assert_eq!(
            evaluate(&session, &limits, 1_000),
            Verdict::Abort(AbortReason::DurationExceeded)
        );
    }

    #[test]
    fn test_max_actions() {
        let mut session = session_at(0);
        session.action_count = 3;
        let limits = SafetyLimits::default().with_max_actions(3);
        assert_eq!(
            evaluate(&session, &limits, 1),
            Verdict::Abort(AbortReason::MaxActionsExceeded)
        );
    }

    #[test]
    fn test_max_tokens() {
        let mut session = session_at(0);
        session.total_tokens = 500;
        let limits = SafetyLimits::default().with_max_tokens(500);
        assert_eq!(
            evaluate(&session, &limits, 1),
            Verdict::Abort(AbortReason::MaxTokensExceeded)
        );
    }

    #[test]
    fn test_consecutive_errors() {
        let mut session = session_at(0);
        session.consecutive_errors = 2;
        let limits = SafetyLimits::default().with_max_consecutive_errors(2);
        assert_eq!(
            evaluate(&session, &limits, 1),
            Verdict::Abort(AbortReason::TooManyErrors)
        );
    }

    #[test]
    fn test_priority_order() {
        let mut session = session_at(0);
        session.action_count = 10;
        session.total_tokens = 10_000;
        session.consecutive_errors = 10;
        let limits = SafetyLimits::default()
            .with_max_actions(1)
            .with_max_tokens(1)
            .with_max_consecutive_errors(1)
            .with_max_duration_ms(5);

        assert_eq!(
            evaluate(&session, &limits, 10),
            Verdict::Abort(AbortReason::DurationExceeded)
        );
        assert_eq!(
            evaluate(&session, &limits, 1),
            Verdict::Abort(AbortReason::MaxActionsExceeded)
        );

        session.action_count = 0;
        assert_eq!(
            evaluate(&session, &limits, 1),
            Verdict::Abort(AbortReason::MaxTokensExceeded)
        );
    }

    #[test]
    fn test_suspended_time_not_charged() {
        let mut session = session_at(0);
        session.suspended_ms = 5_000;
        let limits = SafetyLimits::default().with_max_duration_ms(1_000);
        assert_eq!(evaluate(&session, &limits, 5_500), Verdict::Continue);
    }

    #[test]
    fn test_limits_yaml_kebab_case() {
        let limits: SafetyLimits =
            serde_yaml::from_str("max-actions-per-session: 3\ntool-call-min-interval-ms: 50\n").unwrap();
        assert_eq!(limits.max_actions_per_session, 3);
        assert_eq!(limits.tool_call_min_interval_ms, 50);
        assert_eq!(limits.max_consecutive_errors, 3);
    }
}
