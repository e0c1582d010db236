//! LLM Client Layer - Anthropic API integration and tool parsing
//!
//! This module provides:
//! - Message types for LLM communication
//! - LlmClient trait for API abstraction
//! - AnthropicClient implementation
//! - Tool call parsing and schema validation

pub mod anthropic;
pub mod client;
pub mod tool_parser;
pub mod types;

pub use anthropic::{AnthropicClient, AnthropicConfig};
pub use client::{LlmClient, LlmError, MockLlmClient};
pub use tool_parser::{parse_response, validate_tool_input};
pub use types::{
    CompletionRequest, CompletionResponse, ContentBlock, Message, MessageContent, Role, StopReason, ToolCall,
    ToolDefinition, ToolResult, Usage,
};
