//! Built-in node handlers, one per node type

mod agent;
mod approval;
mod condition;
mod delay;
mod output;
mod trigger;

pub use agent::AgentHandler;
pub use approval::ApprovalHandler;
pub use condition::ConditionHandler;
pub use delay::DelayHandler;
pub use output::{EmailSender, OutputHandler};
pub use trigger::TriggerHandler;

use serde_json::{Map, Value, json};

use super::registry::NodeInput;

/// Template context for prompts and output messages.
///
/// Run variables appear both at the top level and under `variables`;
/// predecessor outputs under `upstream.<node_id>`.
pub(crate) fn template_context(input: &NodeInput<'_>) -> Value {
    let mut root = Map::new();
    for (key, value) in &input.context.variables {
        root.insert(key.clone(), Value::String(value.clone()));
    }
    root.insert("variables".into(), json!(input.context.variables));
    root.insert(
        "run".into(),
        json!({
            "workflow_id": input.context.workflow_id,
            "run_id": input.context.workflow_run_id,
            "project_id": input.context.project_id,
        }),
    );

    let upstream: Map<String, Value> = input
        .upstream
        .iter()
        .map(|(id, output)| {
            (
                id.clone(),
                json!({
                    "status": output.status,
                    "data": output.data,
                    "response": output.response,
                }),
            )
        })
        .collect();
    root.insert("upstream".into(), Value::Object(upstream));
    Value::Object(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NodeKind, NodeOutput, NodeType, TriggerConfig, WorkflowNode, WorkflowRunContext};
    use std::collections::BTreeMap;

    #[test]
    fn test_template_context_shape() {
        let node = WorkflowNode::new("out", NodeKind::Trigger(TriggerConfig::default()));
        let mut upstream = BTreeMap::new();
        upstream.insert(
            "agent_1".to_string(),
            NodeOutput::completed("agent_1", NodeType::Agent, json!({"tokens": 5})).with_response("done"),
        );
        let ctx = WorkflowRunContext::new("wf", "run-1", "proj").with_variable("ticket", "T-9");

        let value = template_context(&NodeInput::new(&node, &upstream, &ctx));
        assert_eq!(value["ticket"], "T-9");
        assert_eq!(value["variables"]["ticket"], "T-9");
        assert_eq!(value["run"]["run_id"], "run-1");
        assert_eq!(value["upstream"]["agent_1"]["response"], "done");
        assert_eq!(value["upstream"]["agent_1"]["status"], "completed");
    }
}
