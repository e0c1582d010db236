use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::domain::{FailureKind, NodeExecution, NodeFailure, NodeKind, NodeOutput, NodeType, OutputChannel};
use crate::error::{AgentflowError, Result};
use crate::prompt::PromptRenderer;
use crate::workflow::registry::{NodeHandler, NodeInput};

use super::template_context;

/// Outbound mail capability supplied by the host
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()>;
}

/// Renders the node template and delivers it to its channel
pub struct OutputHandler {
    renderer: Arc<PromptRenderer>,
    http: reqwest::Client,
    email: Option<Arc<dyn EmailSender>>,
}

impl OutputHandler {
    pub fn new(renderer: Arc<PromptRenderer>, webhook_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(webhook_timeout).build()?;
        Ok(Self {
            renderer,
            http,
            email: None,
        })
    }

    pub fn with_email(mut self, sender: Arc<dyn EmailSender>) -> Self {
        self.email = Some(sender);
        self
    }

    async fn deliver(&self, channel: &OutputChannel, message: &str, input: &NodeInput<'_>) -> std::result::Result<(), String> {
        match channel {
            OutputChannel::Log => {
                log::info!("[{}] {}", input.node.id, message);
                Ok(())
            }
            OutputChannel::Webhook { url } => {
                let url = url.as_deref().ok_or("webhook destination missing")?;
                let body = json!({
                    "workflow_id": input.context.workflow_id,
                    "workflow_run_id": input.context.workflow_run_id,
                    "node_id": input.node.id,
                    "message": message,
                });
                let response = self
                    .http
                    .post(url)
                    .json(&body)
                    .send()
                    .await
                    .map_err(|e| format!("webhook request failed: {}", e))?;
                if !response.status().is_success() {
                    return Err(format!("webhook returned {}", response.status()));
                }
                Ok(())
            }
            OutputChannel::Email { to, subject } => {
                let to = to.as_deref().ok_or("email recipient missing")?;
                let sender = self.email.as_ref().ok_or("no email sender configured")?;
                let subject = subject.as_deref().unwrap_or("Workflow notification");
                sender
                    .send(to, subject, message)
                    .await
                    .map_err(|e| format!("email delivery failed: {}", e))
            }
        }
    }
}

#[async_trait]
impl NodeHandler for OutputHandler {
    fn node_type(&self) -> NodeType {
        NodeType::Output
    }

    async fn execute(&self, input: NodeInput<'_>) -> Result<NodeExecution> {
        let NodeKind::Output(config) = &input.node.config else {
            return Err(input.config_mismatch(NodeType::Output));
        };

        let message = match self.renderer.render_json(&config.template, &template_context(&input)) {
            Ok(message) => message,
            Err(AgentflowError::Template(e)) => {
                return Ok(NodeExecution::Continue(NodeOutput::failed(
                    &input.node.id,
                    NodeType::Output,
                    NodeFailure::new(FailureKind::Configuration, e),
                )));
            }
            Err(e) => return Err(e),
        };

        let channel = config.destination.name();
        let output = match self.deliver(&config.destination, &message, &input).await {
            Ok(()) => NodeOutput::completed(
                &input.node.id,
                NodeType::Output,
                json!({ "channel": channel, "message": message }),
            ),
            Err(reason) => {
                log::warn!("output {} delivery via {} failed: {}", input.node.id, channel, reason);
                NodeOutput::failed(
                    &input.node.id,
                    NodeType::Output,
                    NodeFailure::new(FailureKind::Delivery, reason),
                )
            }
        };
        Ok(NodeExecution::Continue(output.with_response(message)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NodeStatus, OutputConfig, WorkflowNode, WorkflowRunContext};
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Outbox {
        sent: Mutex<Vec<(String, String, String)>>,
    }

    #[async_trait]
    impl EmailSender for Outbox {
        async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push((to.to_string(), subject.to_string(), body.to_string()));
            Ok(())
        }
    }

    fn handler() -> OutputHandler {
        OutputHandler::new(Arc::new(PromptRenderer::new()), Duration::from_secs(1)).unwrap()
    }

    async fn run(handler: &OutputHandler, destination: OutputChannel) -> NodeOutput {
        let node = WorkflowNode::new(
            "notify",
            NodeKind::Output(OutputConfig {
                template: "Ticket {{ticket}}: {{upstream.triage.response}}".into(),
                destination,
            }),
        );
        let mut upstream = BTreeMap::new();
        upstream.insert(
            "triage".to_string(),
            NodeOutput::completed("triage", NodeType::Agent, json!({})).with_response("escalated"),
        );
        let ctx = WorkflowRunContext::new("wf", "run-1", "p").with_variable("ticket", "T-7");

        match handler.execute(NodeInput::new(&node, &upstream, &ctx)).await.unwrap() {
            NodeExecution::Continue(out) => out,
            NodeExecution::Suspend(s) => panic!("output suspended: {:?}", s),
        }
    }

    #[tokio::test]
    async fn test_log_channel_renders() {
        let out = run(&handler(), OutputChannel::Log).await;
        assert!(out.is_completed());
        assert_eq!(out.data["message"], "Ticket T-7: escalated");
        assert_eq!(out.data["channel"], "log");
    }

    #[tokio::test]
    async fn test_webhook_without_url_fails() {
        let out = run(&handler(), OutputChannel::Webhook { url: None }).await;
        assert_eq!(out.status, NodeStatus::Failed);
        let failure = out.failure.unwrap();
        assert_eq!(failure.kind, FailureKind::Delivery);
        assert!(failure.message.contains("missing"));
    }

    #[tokio::test]
    async fn test_webhook_unreachable_fails() {
        let out = run(
            &handler(),
            OutputChannel::Webhook {
                url: Some("http://127.0.0.1:9/hook".into()),
            },
        )
        .await;
        assert_eq!(out.status, NodeStatus::Failed);
    }

    #[tokio::test]
    async fn test_email_uses_sender() {
        let outbox = Arc::new(Outbox::default());
        let handler = handler().with_email(outbox.clone());
        let out = run(
            &handler,
            OutputChannel::Email {
                to: Some("ops@example.com".into()),
                subject: None,
            },
        )
        .await;

        assert!(out.is_completed());
        let sent = outbox.sent.lock().unwrap();
        assert_eq!(sent[0].0, "ops@example.com");
        assert_eq!(sent[0].2, "Ticket T-7: escalated");
    }

    #[tokio::test]
    async fn test_email_without_sender_fails() {
        let out = run(
            &handler(),
            OutputChannel::Email {
                to: Some("ops@example.com".into()),
                subject: None,
            },
        )
        .await;
        assert_eq!(out.failure.unwrap().kind, FailureKind::Delivery);
    }
}
