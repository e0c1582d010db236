//! Agent session - one bounded execution attempt of an agent's tool loop
//!
//! A session is created when the loop starts, mutated only by the loop, and
//! frozen once its status leaves `Running`.

use serde::{Deserialize, Serialize};

use crate::domain::action::ActionRecord;
use crate::error::{AgentflowError, Result};
use crate::id::{generate_action_id, generate_session_id, now_ms};

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Running,
    Completed,
    Error,
    Aborted,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::Running)
    }
}

/// Why the safety governor stopped a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    DurationExceeded,
    MaxActionsExceeded,
    MaxTokensExceeded,
    TooManyErrors,
}

impl AbortReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DurationExceeded => "duration_exceeded",
            Self::MaxActionsExceeded => "max_actions_exceeded",
            Self::MaxTokensExceeded => "max_tokens_exceeded",
            Self::TooManyErrors => "too_many_errors",
        }
    }
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Running state of one agent session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSession {
    pub session_id: String,
    pub agent_id: String,
    pub project_id: String,
    pub started_at: i64,

    pub action_count: u32,
    pub total_tokens: u64,
    pub total_cost_usd: f64,

    pub status: SessionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<AbortReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_response: Option<String>,

    /// Failed tool records since the last success
    #[serde(default)]
    pub consecutive_errors: u32,
    /// Anchor for the per-session tool rate limit
    #[serde(default)]
    pub last_tool_call_at: Option<i64>,
    /// Time spent parked on an approval; not charged to the duration limit
    #[serde(default)]
    pub suspended_ms: i64,
    #[serde(default)]
    pub ended_at: Option<i64>,

    #[serde(default)]
    pub actions: Vec<ActionRecord>,
}

impl AgentSession {
    pub fn new(agent_id: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            session_id: generate_session_id(),
            agent_id: agent_id.into(),
            project_id: project_id.into(),
            started_at: now_ms(),
            action_count: 0,
            total_tokens: 0,
            total_cost_usd: 0.0,
            status: SessionStatus::Running,
            abort_reason: None,
            error: None,
            final_response: None,
            consecutive_errors: 0,
            last_tool_call_at: None,
            suspended_ms: 0,
            ended_at: None,
            actions: Vec::new(),
        }
    }

    /// Active running time at `now`, excluding approval waits
    pub fn elapsed_ms(&self, now: i64) -> i64 {
        (now - self.started_at - self.suspended_ms).max(0)
    }

    /// Append a record and update counters.
    ///
    /// Assigns the record's id, session and sequence. Fails once the session
    /// has reached a terminal state.
    pub fn append(&mut self, mut record: ActionRecord) -> Result<&ActionRecord> {
        self.ensure_running()?;

        let sequence = self.action_count + 1;
        record.id = generate_action_id(&self.session_id, sequence);
        record.session_id = self.session_id.clone();
        record.sequence = sequence;

        self.action_count = sequence;
        self.total_tokens += record.tokens_used;
        self.total_cost_usd += record.cost_usd;
        if record.is_failure() {
            self.consecutive_errors += 1;
        } else {
            self.consecutive_errors = 0;
        }

        self.actions.push(record);
        let index = self.actions.len() - 1;
        Ok(&self.actions[index])
    }

    pub fn complete(&mut self, response: impl Into<String>) -> Result<()> {
        self.ensure_running()?;
        self.status = SessionStatus::Completed;
        self.final_response = Some(response.into());
        self.ended_at = Some(now_ms());
        Ok(())
    }

    pub fn abort(&mut self, reason: AbortReason) -> Result<()> {
        self.ensure_running()?;
        self.status = SessionStatus::Aborted;
        self.abort_reason = Some(reason);
        self.ended_at = Some(now_ms());
        Ok(())
    }

    pub fn fail(&mut self, message: impl Into<String>) -> Result<()> {
        self.ensure_running()?;
        self.status = SessionStatus::Error;
        self.error = Some(message.into());
        self.ended_at = Some(now_ms());
        Ok(())
    }

    /// Wall-clock duration, or time so far while still running
    pub fn duration_ms(&self) -> i64 {
        self.ended_at.unwrap_or_else(now_ms) - self.started_at
    }

    fn ensure_running(&self) -> Result<()> {
        if self.status.is_terminal() {
            return Err(AgentflowError::InvalidState(format!(
                "session {} is {:?}",
                self.session_id, self.status
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::action::ActionErrorKind;
    use serde_json::json;

    #[test]
    fn test_new_session_is_running() {
        let session = AgentSession::new("agent-1", "proj-1");
        assert_eq!(session.status, SessionStatus::Running);
        assert_eq!(session.action_count, 0);
        assert!(session.session_id.starts_with("ses-"));
    }

    #[test]
    fn test_append_updates_counters() {
        let mut session = AgentSession::new("a", "p");
        session
            .append(ActionRecord::tool_call("t", json!({})).with_output(json!(1)).with_usage(100, 0.5))
            .unwrap();
        session.append(ActionRecord::model_call(50, 0.25, 10)).unwrap();

        assert_eq!(session.action_count, 2);
        assert_eq!(session.total_tokens, 150);
        assert!((session.total_cost_usd - 0.75).abs() < f64::EPSILON);
        assert_eq!(session.actions[0].sequence, 1);
        assert_eq!(session.actions[1].sequence, 2);
        assert_eq!(session.actions[1].session_id, session.session_id);
    }

    #[test]
    fn test_consecutive_errors_reset_on_success() {
        let mut session = AgentSession::new("a", "p");
        let failed = || ActionRecord::tool_call("t", json!({})).with_error(ActionErrorKind::Tool, "boom");

        session.append(failed()).unwrap();
        session.append(failed()).unwrap();
        assert_eq!(session.consecutive_errors, 2);

        session
            .append(ActionRecord::tool_call("t", json!({})).with_output(json!("ok")))
            .unwrap();
        assert_eq!(session.consecutive_errors, 0);
    }

    #[test]
    fn test_terminal_session_is_frozen() {
        let mut session = AgentSession::new("a", "p");
        session.abort(AbortReason::MaxActionsExceeded).unwrap();

        assert!(session.append(ActionRecord::model_call(1, 0.0, 1)).is_err());
        assert!(session.complete("late").is_err());
        assert_eq!(session.abort_reason, Some(AbortReason::MaxActionsExceeded));
    }

    #[test]
    fn test_elapsed_excludes_suspension() {
        let mut session = AgentSession::new("a", "p");
        session.started_at = 1_000;
        session.suspended_ms = 400;
        assert_eq!(session.elapsed_ms(2_000), 600);
    }

    #[test]
    fn test_abort_reason_strings() {
        assert_eq!(AbortReason::DurationExceeded.to_string(), "duration_exceeded");
        assert_eq!(
            serde_json::to_value(AbortReason::MaxActionsExceeded).unwrap(),
            json!("max_actions_exceeded")
        );
    }
}
