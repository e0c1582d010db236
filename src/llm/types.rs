//! LLM types for model communication
//!
//! This module defines the message types for LLM requests and responses. Messages
//! carry either plain text or content blocks so that tool_use / tool_result turns
//! can be replayed as conversation history.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Role in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A single content block inside a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        is_error: bool,
    },
}

/// Message body: plain text or a list of blocks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

/// A message in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

impl Message {
    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(content.into()),
        }
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Text(content.into()),
        }
    }

    /// Assistant turn that requested tools, replayed with its text and tool_use blocks
    pub fn assistant_turn(text: &str, calls: &[ToolCall]) -> Self {
        let mut blocks = Vec::with_capacity(calls.len() + 1);
        if !text.is_empty() {
            blocks.push(ContentBlock::Text {
                text: text.to_string(),
            });
        }
        blocks.extend(calls.iter().map(|c| ContentBlock::ToolUse {
            id: c.id.clone(),
            name: c.name.clone(),
            input: c.input.clone(),
        }));
        Self {
            role: Role::Assistant,
            content: MessageContent::Blocks(blocks),
        }
    }

    /// User turn carrying tool results back to the model
    pub fn tool_results(results: &[ToolResult]) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Blocks(
                results
                    .iter()
                    .map(|r| ContentBlock::ToolResult {
                        tool_use_id: r.tool_use_id.clone(),
                        content: r.content.clone(),
                        is_error: r.is_error,
                    })
                    .collect(),
            ),
        }
    }

    /// Concatenated text of the message, ignoring tool blocks
    pub fn text(&self) -> String {
        match &self.content {
            MessageContent::Text(t) => t.clone(),
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// Tool definition as presented to the LLM
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

impl ToolDefinition {
    /// Create a new tool definition
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }

    /// Convert to Anthropic API schema format
    pub fn to_anthropic_schema(&self) -> Value {
        serde_json::json!({
            "name": self.name,
            "description": self.description,
            "input_schema": self.input_schema
        })
    }
}

/// A tool call from the LLM
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: Value,
}

impl ToolCall {
    /// Create a new tool call
    pub fn new(id: impl Into<String>, name: impl Into<String>, input: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            input,
        }
    }
}

/// Result of a tool execution, fed back to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_use_id: String,
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    /// Create a successful tool result
    pub fn success(tool_use_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_use_id: tool_use_id.into(),
            content: content.into(),
            is_error: false,
        }
    }

    /// Create an error tool result
    pub fn error(tool_use_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_use_id: tool_use_id.into(),
            content: content.into(),
            is_error: true,
        }
    }
}

/// Request to the LLM for completion
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub system: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl CompletionRequest {
    /// Create a new completion request with a system prompt
    pub fn new(system: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            ..Default::default()
        }
    }

    /// Add a message to the request
    pub fn with_message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    /// Add a user message
    pub fn with_user_message(self, content: impl Into<String>) -> Self {
        self.with_message(Message::user(content))
    }

    /// Replace the message history
    pub fn with_messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = messages;
        self
    }

    /// Add tools to the request
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    /// Set max tokens
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// Response from the LLM
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub stop_reason: StopReason,
    pub usage: Usage,
}

impl CompletionResponse {
    /// A text-only response
    pub fn text(content: impl Into<String>, usage: Usage) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
            stop_reason: StopReason::EndTurn,
            usage,
        }
    }

    /// A response requesting a single tool call
    pub fn tool_use(call: ToolCall, usage: Usage) -> Self {
        Self {
            content: String::new(),
            tool_calls: vec![call],
            stop_reason: StopReason::ToolUse,
            usage,
        }
    }

    /// Whether the model asked for any tool invocation
    pub fn requests_tools(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Reason why the LLM stopped generating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    #[default]
    EndTurn,
    ToolUse,
    MaxTokens,
    StopSequence,
}

/// Token usage statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl Usage {
    /// Create new usage stats
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    /// Calculate total tokens
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    /// Accumulate usage from another instance
    pub fn add(&mut self, other: &Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }

    /// Calculate cost in USD based on model
    pub fn cost_usd(&self, model: &str) -> f64 {
        let (input_rate, output_rate) = match model {
            m if m.contains("opus") => (0.015, 0.075),
            m if m.contains("sonnet") => (0.003, 0.015),
            m if m.contains("haiku") => (0.00025, 0.00125),
            _ => (0.003, 0.015),
        };

        (self.input_tokens as f64 / 1000.0 * input_rate)
            + (self.output_tokens as f64 / 1000.0 * output_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_role_serialization() {
        assert_eq!(serde_json::to_string(&Role::User).unwrap(), "\"user\"");
        assert_eq!(
            serde_json::to_string(&Role::Assistant).unwrap(),
            "\"assistant\""
        );
    }

    #[test]
    fn test_text_message_serializes_as_string() {
        let msg = Message::user("Hello");
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["role"], "user");
        assert_eq!(value["content"], "Hello");
    }

    #[test]
    fn test_assistant_turn_blocks() {
        let call = ToolCall::new("call_1", "http_request", json!({"url": "https://example.com"}));
        let msg = Message::assistant_turn("Fetching", &[call]);
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["content"][0]["type"], "text");
        assert_eq!(value["content"][1]["type"], "tool_use");
        assert_eq!(value["content"][1]["name"], "http_request");
        assert_eq!(msg.text(), "Fetching");
    }

    #[test]
    fn test_assistant_turn_without_text() {
        let call = ToolCall::new("call_1", "current_time", json!({}));
        let msg = Message::assistant_turn("", &[call]);
        match msg.content {
            MessageContent::Blocks(blocks) => assert_eq!(blocks.len(), 1),
            MessageContent::Text(_) => panic!("expected blocks"),
        }
    }

    #[test]
    fn test_tool_results_message() {
        let msg = Message::tool_results(&[ToolResult::error("call_1", "boom")]);
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["role"], "user");
        assert_eq!(value["content"][0]["type"], "tool_result");
        assert_eq!(value["content"][0]["is_error"], true);
    }

    #[test]
    fn test_message_roundtrip_with_blocks() {
        let call = ToolCall::new("call_9", "lookup", json!({"q": "x"}));
        let msg = Message::assistant_turn("thinking", &[call]);
        let json = serde_json::to_string(&msg).unwrap();
        let restored: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, msg);
    }

    #[test]
    fn test_completion_request_builder() {
        let req = CompletionRequest::new("You are a helpful assistant")
            .with_user_message("Hello")
            .with_max_tokens(1000)
            .with_model("claude-3-haiku");

        assert_eq!(req.system, "You are a helpful assistant");
        assert_eq!(req.messages.len(), 1);
        assert_eq!(req.messages[0].text(), "Hello");
        assert_eq!(req.max_tokens, Some(1000));
        assert_eq!(req.model.as_deref(), Some("claude-3-haiku"));
    }

    #[test]
    fn test_completion_response_requests_tools() {
        let resp = CompletionResponse::tool_use(
            ToolCall::new("c", "t", json!({})),
            Usage::new(10, 5),
        );
        assert!(resp.requests_tools());
        assert!(!CompletionResponse::text("done", Usage::default()).requests_tools());
    }

    #[test]
    fn test_usage_total_and_add() {
        let mut usage = Usage::new(100, 50);
        usage.add(&Usage::new(200, 100));
        assert_eq!(usage.total(), 450);
    }

    #[test]
    fn test_usage_cost_sonnet() {
        let usage = Usage::new(1000, 1000);
        let cost = usage.cost_usd("claude-sonnet-4-20250514");
        assert!((cost - 0.018).abs() < 0.0001);
    }

    #[test]
    fn test_usage_cost_haiku() {
        let usage = Usage::new(1000, 1000);
        let cost = usage.cost_usd("claude-3-haiku-20240307");
        assert!((cost - 0.0015).abs() < 0.0001);
    }
}
