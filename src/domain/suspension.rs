//! Pause/resume vocabulary shared by handlers, the executor and the run manager
//!
//! A handler either continues with a `NodeOutput` or suspends with a typed
//! reason; approval and delay pauses are distinct variants.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::output::NodeOutput;

/// Why a run is parked and what is needed to continue it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Suspension {
    /// Waiting for a human decision
    Approval {
        approver_role: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_hours: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        /// Tool awaiting approval when an agent session paused mid-loop
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_name: Option<String>,
        /// Serialized agent loop state to restore on resume
        #[serde(default, skip_serializing_if = "Option::is_none")]
        checkpoint: Option<Value>,
        requested_at: i64,
    },
    /// Waiting for a point in time
    Delay { resume_at: i64, delay_ms: u64 },
}

impl Suspension {
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Approval { .. } => "approval",
            Self::Delay { .. } => "delay",
        }
    }

    /// Deadline after which an unanswered approval may be expired
    pub fn approval_deadline(&self) -> Option<i64> {
        match self {
            Self::Approval {
                timeout_hours: Some(hours),
                requested_at,
                ..
            } => Some(requested_at + i64::from(*hours) * 3_600_000),
            _ => None,
        }
    }
}

/// Event that lets a paused node continue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResumeSignal {
    /// A delay elapsed
    Timer,
    /// A human decided on a pending approval
    Approval {
        approved: bool,
        #[serde(default)]
        decided_by: Option<String>,
        #[serde(default)]
        comment: Option<String>,
    },
}

/// Handler result: keep going or park the run
#[derive(Debug, Clone, PartialEq)]
pub enum NodeExecution {
    Continue(NodeOutput),
    Suspend(Suspension),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suspension_tagging() {
        let delay = Suspension::Delay {
            resume_at: 1_000,
            delay_ms: 300_000,
        };
        let value = serde_json::to_value(&delay).unwrap();
        assert_eq!(value["reason"], "delay");
        assert_eq!(value["delay_ms"], 300_000);
        assert_eq!(delay.reason(), "delay");
    }

    #[test]
    fn test_approval_deadline() {
        let approval = Suspension::Approval {
            approver_role: "manager".into(),
            timeout_hours: Some(2),
            message: None,
            tool_name: None,
            checkpoint: None,
            requested_at: 1_000,
        };
        assert_eq!(approval.approval_deadline(), Some(1_000 + 7_200_000));
        assert_eq!(approval.reason(), "approval");
    }

    #[test]
    fn test_resume_signal_roundtrip() {
        let signal = ResumeSignal::Approval {
            approved: false,
            decided_by: Some("lee".into()),
            comment: Some("not now".into()),
        };
        let json = serde_json::to_string(&signal).unwrap();
        let restored: ResumeSignal = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, signal);
    }
}
