use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::domain::{ConditionConfig, FailureKind, NodeExecution, NodeFailure, NodeKind, NodeOutput, NodeType};
use crate::error::Result;
use crate::llm::{CompletionRequest, LlmClient};
use crate::prompt::PromptRenderer;
use crate::workflow::registry::{NodeHandler, NodeInput};

use super::template_context;

const EVAL_SYSTEM_PROMPT: &str = "You evaluate a yes/no condition for a workflow. Reply with YES or NO first.";

/// Evaluates a predicate over upstream outputs; the boolean selects the
/// "true" or "false" branch
pub struct ConditionHandler<L: LlmClient> {
    llm: Arc<L>,
    renderer: Arc<PromptRenderer>,
}

impl<L: LlmClient> ConditionHandler<L> {
    pub fn new(llm: Arc<L>, renderer: Arc<PromptRenderer>) -> Self {
        Self { llm, renderer }
    }

    async fn llm_eval(&self, prompt: &str, model: Option<&str>, input: &NodeInput<'_>) -> Result<std::result::Result<bool, NodeFailure>> {
        let rendered = self.renderer.render_json(prompt, &template_context(input))?;
        let mut request = CompletionRequest::new(EVAL_SYSTEM_PROMPT)
            .with_user_message(rendered)
            .with_max_tokens(16);
        if let Some(model) = model {
            request = request.with_model(model);
        }

        match self.llm.complete(request).await {
            Ok(response) => Ok(Ok(is_affirmative(&response.content))),
            Err(e) => Ok(Err(NodeFailure::new(
                FailureKind::Provider,
                format!("condition model call failed: {}", e),
            ))),
        }
    }
}

/// True iff the trimmed reply starts with "YES" (any case)
pub fn is_affirmative(reply: &str) -> bool {
    reply.trim().to_uppercase().starts_with("YES")
}

/// Case-sensitive substring match on the serialized upstream data
pub fn upstream_contains(upstream: &BTreeMap<String, NodeOutput>, needle: &str) -> bool {
    let data: BTreeMap<&str, &Value> = upstream.iter().map(|(id, o)| (id.as_str(), &o.data)).collect();
    serde_json::to_string(&data)
        .map(|s| s.contains(needle))
        .unwrap_or(false)
}

/// Resolve a dot path against upstream data.
///
/// A leading segment naming an upstream node scopes the lookup to that
/// node; otherwise every upstream output is tried in id order.
pub fn lookup_path<'a>(upstream: &'a BTreeMap<String, NodeOutput>, path: &str) -> Option<&'a Value> {
    let segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
    let (first, rest) = segments.split_first()?;

    if let Some(output) = upstream.get(*first) {
        if let Some(found) = walk(&output.data, rest) {
            return Some(found);
        }
    }
    upstream.values().find_map(|o| walk(&o.data, &segments))
}

fn walk<'a>(value: &'a Value, segments: &[&str]) -> Option<&'a Value> {
    segments.iter().try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(*segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn value_as_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl<L: LlmClient + 'static> NodeHandler for ConditionHandler<L> {
    fn node_type(&self) -> NodeType {
        NodeType::Condition
    }

    async fn execute(&self, input: NodeInput<'_>) -> Result<NodeExecution> {
        let NodeKind::Condition(config) = &input.node.config else {
            return Err(input.config_mismatch(NodeType::Condition));
        };

        let (mode, result) = match config {
            ConditionConfig::Contains { value } => ("contains", upstream_contains(input.upstream, value)),
            ConditionConfig::JsonPath { path, expected } => {
                let matched = lookup_path(input.upstream, path).is_some_and(|v| value_as_string(v) == *expected);
                ("json_path", matched)
            }
            ConditionConfig::LlmEval { prompt, model } => match self.llm_eval(prompt, model.as_deref(), &input).await? {
                Ok(result) => ("llm_eval", result),
                Err(failure) => {
                    return Ok(NodeExecution::Continue(NodeOutput::failed(
                        &input.node.id,
                        NodeType::Condition,
                        failure,
                    )));
                }
            },
        };

        log::debug!("condition {} ({}) evaluated to {}", input.node.id, mode, result);
        Ok(NodeExecution::Continue(NodeOutput::completed(
            &input.node.id,
            NodeType::Condition,
            json!({ "result": result, "mode": mode }),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NodeStatus, WorkflowNode, WorkflowRunContext};
    use crate::llm::{CompletionResponse, MockLlmClient, Usage};

    fn upstream(data: Value) -> BTreeMap<String, NodeOutput> {
        let mut map = BTreeMap::new();
        map.insert("start".to_string(), NodeOutput::completed("start", NodeType::Trigger, data));
        map
    }

    fn handler(mock: MockLlmClient) -> ConditionHandler<MockLlmClient> {
        ConditionHandler::new(Arc::new(mock), Arc::new(PromptRenderer::new()))
    }

    async fn evaluate(handler: &ConditionHandler<MockLlmClient>, config: ConditionConfig, data: Value) -> NodeOutput {
        let node = WorkflowNode::new("check", NodeKind::Condition(config));
        let upstream = upstream(data);
        let ctx = WorkflowRunContext::new("wf", "run", "p").with_variable("topic", "billing");
        match handler.execute(NodeInput::new(&node, &upstream, &ctx)).await.unwrap() {
            NodeExecution::Continue(out) => out,
            NodeExecution::Suspend(s) => panic!("condition suspended: {:?}", s),
        }
    }

    #[tokio::test]
    async fn test_contains_is_case_sensitive() {
        let h = handler(MockLlmClient::new(vec![]));
        let data = json!({"ticket": "URGENT: server down"});

        let out = evaluate(&h, ConditionConfig::Contains { value: "URGENT".into() }, data.clone()).await;
        assert_eq!(out.data["result"], true);

        let out = evaluate(&h, ConditionConfig::Contains { value: "urgent".into() }, data).await;
        assert_eq!(out.data["result"], false);
    }

    #[tokio::test]
    async fn test_json_path() {
        let h = handler(MockLlmClient::new(vec![]));
        let data = json!({"result": {"status": "ok", "items": [{"n": 3}]}});

        let cfg = |path: &str, expected: &str| ConditionConfig::JsonPath {
            path: path.into(),
            expected: expected.into(),
        };
        assert_eq!(evaluate(&h, cfg("result.status", "ok"), data.clone()).await.data["result"], true);
        assert_eq!(evaluate(&h, cfg("start.result.status", "ok"), data.clone()).await.data["result"], true);
        assert_eq!(evaluate(&h, cfg("result.items.0.n", "3"), data.clone()).await.data["result"], true);
        assert_eq!(evaluate(&h, cfg("result.missing", "ok"), data).await.data["result"], false);
    }

    #[tokio::test]
    async fn test_llm_eval() {
        let mock = MockLlmClient::new(vec![
            CompletionResponse::text("  yes, it is about billing", Usage::default()),
            CompletionResponse::text("No.", Usage::default()),
        ]);
        let h = handler(mock);
        let cfg = || ConditionConfig::LlmEval {
            prompt: "Is this about {{topic}}?".into(),
            model: None,
        };

        assert_eq!(evaluate(&h, cfg(), json!({})).await.data["result"], true);
        assert_eq!(evaluate(&h, cfg(), json!({})).await.data["result"], false);
        let sent = h.llm.requests();
        assert_eq!(sent[0].messages[0].text(), "Is this about billing?");
    }

    #[tokio::test]
    async fn test_llm_eval_provider_failure() {
        let h = handler(MockLlmClient::failing("overloaded"));
        let out = evaluate(
            &h,
            ConditionConfig::LlmEval {
                prompt: "?".into(),
                model: None,
            },
            json!({}),
        )
        .await;
        assert_eq!(out.status, NodeStatus::Failed);
        assert_eq!(out.failure.unwrap().kind, FailureKind::Provider);
    }

    #[test]
    fn test_is_affirmative() {
        assert!(is_affirmative("YES"));
        assert!(is_affirmative("\n yes please"));
        assert!(!is_affirmative("Maybe yes"));
        assert!(!is_affirmative(""));
    }
}
