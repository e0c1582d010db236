use async_trait::async_trait;
use serde_json::json;

use crate::domain::{NodeExecution, NodeKind, NodeOutput, NodeType};
use crate::error::Result;
use crate::workflow::registry::{NodeHandler, NodeInput};

/// Completes immediately, echoing the run variables
#[derive(Debug, Default)]
pub struct TriggerHandler;

#[async_trait]
impl NodeHandler for TriggerHandler {
    fn node_type(&self) -> NodeType {
        NodeType::Trigger
    }

    async fn execute(&self, input: NodeInput<'_>) -> Result<NodeExecution> {
        let NodeKind::Trigger(config) = &input.node.config else {
            return Err(input.config_mismatch(NodeType::Trigger));
        };

        let mut data = json!(input.context.variables);
        if let Some(source) = &config.source {
            data["_source"] = json!(source);
        }
        Ok(NodeExecution::Continue(NodeOutput::completed(
            &input.node.id,
            NodeType::Trigger,
            data,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{TriggerConfig, WorkflowNode, WorkflowRunContext};
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn test_echoes_variables() {
        let node = WorkflowNode::new("start", NodeKind::Trigger(TriggerConfig::default()));
        let ctx = WorkflowRunContext::new("wf", "run", "p").with_variable("ticket", "urgent: printer on fire");
        let upstream = BTreeMap::new();

        let NodeExecution::Continue(out) = TriggerHandler
            .execute(NodeInput::new(&node, &upstream, &ctx))
            .await
            .unwrap()
        else {
            panic!("trigger must not suspend");
        };
        assert!(out.is_completed());
        assert_eq!(out.data["ticket"], "urgent: printer on fire");
        assert!(out.data.get("_source").is_none());
    }
}
