//! Tool parser for extracting tool calls from Anthropic API responses
//!
//! This module provides utilities for parsing tool_use content blocks from
//! Anthropic API responses and validating tool call inputs against a tool's
//! JSON schema (the subset agent tools use: object type, required fields,
//! primitive property types, enums and `additionalProperties: false`).

use serde_json::Value;

use crate::llm::types::{CompletionResponse, StopReason, ToolCall, Usage};

/// Parse a raw Anthropic API response into a CompletionResponse
///
/// Handles both text and tool_use content blocks from the response.
pub fn parse_response(response: &Value) -> CompletionResponse {
    let mut content = String::new();
    let mut tool_calls = Vec::new();

    if let Some(content_blocks) = response.get("content").and_then(|c| c.as_array()) {
        for block in content_blocks {
            match block.get("type").and_then(|t| t.as_str()) {
                Some("text") => {
                    if let Some(text) = block.get("text").and_then(|t| t.as_str()) {
                        if !content.is_empty() {
                            content.push('\n');
                        }
                        content.push_str(text);
                    }
                }
                Some("tool_use") => {
                    if let Some(call) = parse_tool_use_block(block) {
                        tool_calls.push(call);
                    }
                }
                _ => {} // Skip unknown block types
            }
        }
    }

    let stop_reason = response
        .get("stop_reason")
        .and_then(|s| s.as_str())
        .map(parse_stop_reason)
        .unwrap_or(StopReason::EndTurn);

    let usage = response.get("usage").map(parse_usage).unwrap_or_default();

    CompletionResponse {
        content,
        tool_calls,
        stop_reason,
        usage,
    }
}

/// Parse a single tool_use content block into a ToolCall
fn parse_tool_use_block(block: &Value) -> Option<ToolCall> {
    let id = block.get("id").and_then(|v| v.as_str())?.to_string();
    let name = block.get("name").and_then(|v| v.as_str())?.to_string();
    let input = block
        .get("input")
        .cloned()
        .unwrap_or(Value::Object(Default::default()));

    Some(ToolCall { id, name, input })
}

fn parse_stop_reason(reason: &str) -> StopReason {
    match reason {
        "end_turn" => StopReason::EndTurn,
        "tool_use" => StopReason::ToolUse,
        "max_tokens" => StopReason::MaxTokens,
        "stop_sequence" => StopReason::StopSequence,
        _ => StopReason::EndTurn,
    }
}

fn parse_usage(usage: &Value) -> Usage {
    Usage {
        input_tokens: usage.get("input_tokens").and_then(|v| v.as_u64()).unwrap_or(0),
        output_tokens: usage.get("output_tokens").and_then(|v| v.as_u64()).unwrap_or(0),
    }
}

/// Validate a tool input against its schema.
///
/// Covers the JSON Schema subset tool catalogs use: `type`, `required`,
/// `enum`, `properties` and `additionalProperties`, recursing into nested
/// objects and array `items`. Nested fields are reported by dotted path.
/// Returns the list of violations; an empty list means the input is valid.
pub fn validate_tool_input(input: &Value, schema: &Value) -> Vec<String> {
    let mut violations = Vec::new();

    if schema.get("type").and_then(|t| t.as_str()) == Some("object") && !input.is_object() {
        violations.push(format!("expected an object, got {}", type_name(input)));
        return violations;
    }

    check_object("", input, schema, &mut violations);
    violations
}

fn check_object(prefix: &str, input: &Value, schema: &Value, violations: &mut Vec<String>) {
    if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
        for field in required.iter().filter_map(|r| r.as_str()) {
            if input.get(field).is_none_or(|v| v.is_null()) {
                violations.push(format!("missing required field: {}{}", prefix, field));
            }
        }
    }

    let properties = schema.get("properties").and_then(|p| p.as_object());

    if let Some(fields) = input.as_object() {
        for (name, value) in fields {
            let path = format!("{}{}", prefix, name);
            match properties.and_then(|props| props.get(name)) {
                Some(prop_schema) => check_property(&path, value, prop_schema, violations),
                None => {
                    if schema.get("additionalProperties") == Some(&Value::Bool(false)) {
                        violations.push(format!("unexpected field: {}", path));
                    }
                }
            }
        }
    }
}

fn check_property(name: &str, value: &Value, schema: &Value, violations: &mut Vec<String>) {
    if value.is_null() {
        return;
    }

    if let Some(expected) = schema.get("type").and_then(|t| t.as_str())
        && !matches_type(value, expected)
    {
        violations.push(format!(
            "field '{}' should be {}, got {}",
            name,
            expected,
            type_name(value)
        ));
        return;
    }

    if let Some(allowed) = schema.get("enum").and_then(|e| e.as_array())
        && !allowed.contains(value)
    {
        violations.push(format!("field '{}' is not one of the allowed values", name));
    }

    match value {
        Value::Object(_) => check_object(&format!("{}.", name), value, schema, violations),
        Value::Array(items) => {
            if let Some(item_schema) = schema.get("items") {
                for (i, item) in items.iter().enumerate() {
                    check_property(&format!("{}[{}]", name, i), item, item_schema, violations);
                }
            }
        }
        _ => {}
    }
}

fn matches_type(value: &Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn url_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": { "type": "string" },
                "method": { "type": "string", "enum": ["GET", "POST"] },
                "retries": { "type": "integer" }
            },
            "required": ["url"],
            "additionalProperties": false
        })
    }

    #[test]
    fn test_parse_response_text_only() {
        let response = json!({
            "content": [{"type": "text", "text": "Hello, world!"}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 10, "output_tokens": 5}
        });

        let parsed = parse_response(&response);
        assert_eq!(parsed.content, "Hello, world!");
        assert!(parsed.tool_calls.is_empty());
        assert_eq!(parsed.stop_reason, StopReason::EndTurn);
        assert_eq!(parsed.usage.total(), 15);
    }

    #[test]
    fn test_parse_response_with_tool_use() {
        let response = json!({
            "content": [
                {"type": "text", "text": "Let me check."},
                {"type": "tool_use", "id": "toolu_1", "name": "http_request", "input": {"url": "https://x"}}
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 20, "output_tokens": 8}
        });

        let parsed = parse_response(&response);
        assert_eq!(parsed.tool_calls.len(), 1);
        assert_eq!(parsed.tool_calls[0].name, "http_request");
        assert_eq!(parsed.tool_calls[0].input["url"], "https://x");
        assert_eq!(parsed.stop_reason, StopReason::ToolUse);
    }

    #[test]
    fn test_parse_tool_use_without_id_is_skipped() {
        let response = json!({
            "content": [{"type": "tool_use", "name": "x", "input": {}}]
        });
        assert!(parse_response(&response).tool_calls.is_empty());
    }

    #[test]
    fn test_validate_ok() {
        let violations = validate_tool_input(&json!({"url": "https://a", "method": "GET"}), &url_schema());
        assert!(violations.is_empty());
    }

    #[test]
    fn test_validate_missing_required() {
        let violations = validate_tool_input(&json!({"method": "GET"}), &url_schema());
        assert_eq!(violations, vec!["missing required field: url".to_string()]);
    }

    #[test]
    fn test_validate_wrong_type() {
        let violations = validate_tool_input(&json!({"url": 42}), &url_schema());
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("should be string"));
    }

    #[test]
    fn test_validate_integer_rejects_float() {
        let violations = validate_tool_input(&json!({"url": "u", "retries": 1.5}), &url_schema());
        assert_eq!(violations.len(), 1);
    }

    #[test]
    fn test_validate_enum() {
        let violations = validate_tool_input(&json!({"url": "u", "method": "DELETE"}), &url_schema());
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("allowed values"));
    }

    #[test]
    fn test_validate_additional_properties() {
        let violations = validate_tool_input(&json!({"url": "u", "extra": true}), &url_schema());
        assert_eq!(violations, vec!["unexpected field: extra".to_string()]);
    }

    #[test]
    fn test_validate_non_object_input() {
        let violations = validate_tool_input(&json!("just a string"), &url_schema());
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("expected an object"));
    }

    #[test]
    fn test_validate_nested_objects_and_items() {
        let schema = json!({
            "type": "object",
            "properties": {
                "headers": {
                    "type": "object",
                    "properties": { "accept": { "type": "string" } },
                    "required": ["accept"]
                },
                "tags": { "type": "array", "items": { "type": "string" } }
            }
        });

        assert!(validate_tool_input(&json!({"headers": {"accept": "json"}, "tags": ["a"]}), &schema).is_empty());

        let violations = validate_tool_input(&json!({"headers": {"accept": 1}, "tags": ["a", 2]}), &schema);
        assert_eq!(violations.len(), 2);
        assert!(violations[0].contains("'headers.accept' should be string"));
        assert!(violations[1].contains("'tags[1]' should be string"));

        let violations = validate_tool_input(&json!({"headers": {}}), &schema);
        assert_eq!(violations, vec!["missing required field: headers.accept".to_string()]);
    }

    #[test]
    fn test_validate_empty_schema_accepts_anything() {
        assert!(validate_tool_input(&json!({"anything": 1}), &json!({})).is_empty());
    }
}
