use async_trait::async_trait;
use serde_json::json;

use crate::domain::{FailureKind, NodeExecution, NodeFailure, NodeKind, NodeOutput, NodeType, ResumeSignal, Suspension};
use crate::error::Result;
use crate::id::now_ms;
use crate::workflow::registry::{NodeHandler, NodeInput};

/// Human approval gate inside a workflow
#[derive(Debug, Default)]
pub struct ApprovalHandler;

#[async_trait]
impl NodeHandler for ApprovalHandler {
    fn node_type(&self) -> NodeType {
        NodeType::Approval
    }

    #[tracing::instrument(level = "debug", skip(self, input), fields(node_id = %input.node.id))]
    async fn execute(&self, input: NodeInput<'_>) -> Result<NodeExecution> {
        let NodeKind::Approval(config) = &input.node.config else {
            return Err(input.config_mismatch(NodeType::Approval));
        };

        match input.resume {
            Some(ResumeSignal::Approval {
                approved: true,
                decided_by,
                comment,
            }) => Ok(NodeExecution::Continue(NodeOutput::completed(
                &input.node.id,
                NodeType::Approval,
                json!({ "approved": true, "decided_by": decided_by, "comment": comment }),
            ))),
            Some(ResumeSignal::Approval {
                approved: false,
                decided_by,
                comment,
            }) => {
                let who = decided_by.as_deref().unwrap_or("approver");
                let message = match comment {
                    Some(comment) => format!("rejected by {}: {}", who, comment),
                    None => format!("rejected by {}", who),
                };
                Ok(NodeExecution::Continue(NodeOutput::failed(
                    &input.node.id,
                    NodeType::Approval,
                    NodeFailure::new(FailureKind::Rejected, message),
                )))
            }
            _ => Ok(NodeExecution::Suspend(Suspension::Approval {
                approver_role: config.approver_role.clone(),
                timeout_hours: config.timeout_hours,
                message: config.message.clone(),
                tool_name: None,
                checkpoint: None,
                requested_at: now_ms(),
            })),
        }
    }
}
