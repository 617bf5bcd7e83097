use serde::{Deserialize, Serialize};
use serde_json::Value;

use switchboard_common::types::{
    CanonicalRequest, CanonicalResponse, ContentBlock, Message, Role, StopReason, ToolDefinition,
    Usage,
};
use switchboard_common::GatewayError;

pub const ANTHROPIC_VERSION: &str = "2023-06-01";

// ---------------------------------------------------------------------------
// Request wire types
// ---------------------------------------------------------------------------

/// The canonical shape is already Messages-shaped, but the wire body still
/// differs: system is a top-level field and tool_result content must be a
/// string.
#[derive(Debug, Serialize)]
pub struct MessagesBody {
    pub model: String,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<WireTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,
}

#[derive(Debug, Serialize)]
pub struct WireMessage {
    pub role: String,
    pub content: Vec<WireBlock>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireBlock {
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
        #[serde(skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
}

#[derive(Debug, Serialize)]
pub struct WireTool {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

// ---------------------------------------------------------------------------
// Response wire types
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ResponseBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
}

#[derive(Deserialize)]
struct WireUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

// ---------------------------------------------------------------------------
// Conversion
// ---------------------------------------------------------------------------

fn to_wire_message(msg: &Message) -> WireMessage {
    let role = match msg.role {
        Role::Assistant => "assistant",
        // Canonical system turns inside the array become user turns here;
        // the top-level system field carries the real system prompt.
        Role::User | Role::System => "user",
    };

    let content = msg
        .content
        .blocks()
        .into_iter()
        .map(|block| match block {
            ContentBlock::Text { text } => WireBlock::Text { text },
            ContentBlock::ToolUse { id, name, input } => WireBlock::ToolUse { id, name, input },
            ContentBlock::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => WireBlock::ToolResult {
                tool_use_id,
                content: ContentBlock::tool_result_text(&content),
                is_error,
            },
        })
        .collect();

    WireMessage {
        role: role.to_string(),
        content,
    }
}

pub fn build_messages_body(
    request: &CanonicalRequest,
    model: &str,
    tools: &[ToolDefinition],
    stream: bool,
) -> MessagesBody {
    MessagesBody {
        model: model.to_string(),
        max_tokens: request.max_tokens.unwrap_or(4096),
        system: request.system_text(),
        messages: request.messages.iter().map(to_wire_message).collect(),
        tools: tools
            .iter()
            .map(|t| WireTool {
                name: t.name.clone(),
                description: t.description.clone(),
                input_schema: t.input_schema.clone(),
            })
            .collect(),
        temperature: request.temperature,
        top_p: request.top_p,
        stream,
    }
}

pub fn parse_messages_response(
    raw: &[u8],
    requested_model: &str,
) -> Result<CanonicalResponse, GatewayError> {
    let resp: MessagesResponse = serde_json::from_slice(raw)
        .map_err(|e| GatewayError::MalformedResponse(format!("messages response: {}", e)))?;

    let content: Vec<ContentBlock> = resp
        .content
        .into_iter()
        .map(|block| match block {
            ResponseBlock::Text { text } => ContentBlock::Text { text },
            ResponseBlock::ToolUse { id, name, input } => {
                ContentBlock::ToolUse { id, name, input }
            }
        })
        .collect();

    let stop_reason = match resp.stop_reason.as_deref() {
        Some("tool_use") => StopReason::ToolUse,
        Some("max_tokens") => StopReason::MaxTokens,
        Some("content_filter") => StopReason::ContentFilter,
        _ => StopReason::EndTurn,
    };

    let usage = resp
        .usage
        .map(|u| Usage {
            input_tokens: u.input_tokens,
            output_tokens: u.output_tokens,
        })
        .unwrap_or_default();

    Ok(CanonicalResponse::new(
        requested_model,
        content,
        stop_reason,
        usage,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_lifted_to_top_level() {
        let request: CanonicalRequest = serde_json::from_str(
            r#"{"model": "m", "system": "Be terse.",
                "messages": [{"role": "user", "content": "hi"}]}"#,
        )
        .unwrap();
        let body = build_messages_body(&request, "claude-sonnet", &[], false);
        assert_eq!(body.system.as_deref(), Some("Be terse."));
        assert_eq!(body.messages.len(), 1);
        assert_eq!(body.messages[0].role, "user");
    }

    #[test]
    fn test_structured_tool_result_stringified() {
        let request: CanonicalRequest = serde_json::from_str(
            r#"{"model": "m", "messages": [
                {"role": "assistant", "content": [
                    {"type": "tool_use", "id": "toolu_1", "name": "Read", "input": {}}]},
                {"role": "user", "content": [
                    {"type": "tool_result", "tool_use_id": "toolu_1", "content": {"lines": 3}}]}
            ]}"#,
        )
        .unwrap();
        let body = build_messages_body(&request, "m", &[], false);
        match &body.messages[1].content[0] {
            WireBlock::ToolResult { content, .. } => assert_eq!(content, r#"{"lines":3}"#),
            other => panic!("Expected tool_result, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_tool_use_response() {
        let raw = br#"{
            "content": [
                {"type": "text", "text": "Checking."},
                {"type": "tool_use", "id": "toolu_abc", "name": "Grep", "input": {"pattern": "x"}}
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 100, "output_tokens": 50}
        }"#;
        let resp = parse_messages_response(raw, "requested").unwrap();
        assert_eq!(resp.model, "requested");
        assert_eq!(resp.stop_reason, StopReason::ToolUse);
        assert_eq!(resp.content.len(), 2);
        assert_eq!(resp.usage.input_tokens, 100);
    }

    #[test]
    fn test_unknown_stop_reason_maps_to_end_turn() {
        let raw = br#"{"content": [{"type": "text", "text": "x"}], "stop_reason": "stop_sequence"}"#;
        let resp = parse_messages_response(raw, "m").unwrap();
        assert_eq!(resp.stop_reason, StopReason::EndTurn);
        assert_eq!(resp.usage, Usage::default());
    }
}
