use async_trait::async_trait;
use serde_json::json;

use crate::domain::{NodeExecution, NodeKind, NodeOutput, NodeType, ResumeSignal, Suspension};
use crate::error::Result;
use crate::id::now_ms;
use crate::workflow::registry::{NodeHandler, NodeInput};

/// Parks the run until `now + duration`; completes when resumed by the timer
#[derive(Debug, Default)]
pub struct DelayHandler;

#[async_trait]
impl NodeHandler for DelayHandler {
    fn node_type(&self) -> NodeType {
        NodeType::Delay
    }

    async fn execute(&self, input: NodeInput<'_>) -> Result<NodeExecution> {
        let NodeKind::Delay(config) = &input.node.config else {
            return Err(input.config_mismatch(NodeType::Delay));
        };
        let delay_ms = config.delay_ms();

        if matches!(input.resume, Some(ResumeSignal::Timer)) || delay_ms == 0 {
            return Ok(NodeExecution::Continue(NodeOutput::completed(
                &input.node.id,
                NodeType::Delay,
                json!({ "delayed_ms": delay_ms }),
            )));
        }

        let resume_at = now_ms().saturating_add(i64::try_from(delay_ms).unwrap_or(i64::MAX));
        log::info!("node {} delaying {}ms until {}", input.node.id, delay_ms, resume_at);
        Ok(NodeExecution::Suspend(Suspension::Delay { resume_at, delay_ms }))
    }
}
