//! Shim for the alternate "Responses" input shape.
//!
//! The `/responses` surface carries an `input` field in place of `messages`.
//! The shim rewrites it into the canonical shape so the rest of the pipeline
//! sees one request format.

use serde_json::Value;

use switchboard_common::types::{
    CanonicalRequest, ContentBlock, Message, MessageContent, Role, SystemPrompt,
};
use switchboard_common::GatewayError;

/// Map a Responses-shape body to a canonical request.
///
/// A string `input` becomes a single user message. An array `input` is
/// filtered entry by entry: a valid role plus content, tool_calls, or a
/// tool_call_id is required; anything else is dropped. Zero surviving
/// messages is a distinguished error.
pub fn responses_to_canonical(body: &Value) -> Result<CanonicalRequest, GatewayError> {
    let model = body
        .get("model")
        .and_then(Value::as_str)
        .ok_or_else(|| GatewayError::InvalidRequest("missing model".into()))?
        .to_string();

    let input = body
        .get("input")
        .ok_or_else(|| GatewayError::InvalidRequest("missing input".into()))?;

    let messages = match input {
        Value::String(text) => vec![Message::user(text.clone())],
        Value::Array(entries) => {
            let mut messages = Vec::new();
            for entry in entries {
                if let Some(msg) = salvage_entry(entry) {
                    messages.push(msg);
                } else {
                    tracing::debug!("Dropping unusable responses input entry");
                }
            }
            messages
        }
        _ => Vec::new(),
    };

    if messages.is_empty() {
        return Err(GatewayError::InvalidRequest(
            "responses input contained no usable messages".into(),
        ));
    }

    Ok(CanonicalRequest {
        model,
        system: body
            .get("instructions")
            .and_then(Value::as_str)
            .map(|s| SystemPrompt::Text(s.to_string())),
        messages,
        tools: Vec::new(),
        temperature: body.get("temperature").and_then(Value::as_f64),
        top_p: body.get("top_p").and_then(Value::as_f64),
        max_tokens: body
            .get("max_output_tokens")
            .or_else(|| body.get("max_tokens"))
            .and_then(Value::as_u64)
            .map(|n| n as u32),
        stream: body.get("stream").and_then(Value::as_bool).unwrap_or(false),
        metadata: body.get("metadata").cloned(),
    })
}

/// Extract one canonical message from an input entry, or None if there is
/// no valid role or no salvageable payload.
fn salvage_entry(entry: &Value) -> Option<Message> {
    let role = match entry.get("role").and_then(Value::as_str) {
        Some("user") => Role::User,
        Some("assistant") => Role::Assistant,
        Some("system") | Some("developer") => Role::System,
        Some("tool") => {
            // Tool outputs become user-side tool_result blocks.
            let tool_call_id = entry.get("tool_call_id").and_then(Value::as_str)?;
            let content = flatten_content(entry.get("content")?)?;
            return Some(Message {
                role: Role::User,
                content: MessageContent::Blocks(vec![ContentBlock::ToolResult {
                    tool_use_id: tool_call_id.to_string(),
                    content: Value::String(content),
                    is_error: None,
                }]),
            });
        }
        _ => return None,
    };

    // Assistant entries may carry tool_calls instead of content.
    if role == Role::Assistant {
        if let Some(calls) = entry.get("tool_calls").and_then(Value::as_array) {
            let mut blocks = Vec::new();
            if let Some(text) = entry.get("content").and_then(|c| flatten_content(c)) {
                if !text.is_empty() {
                    blocks.push(ContentBlock::text(text));
                }
            }
            for call in calls {
                let function = call.get("function")?;
                let name = function.get("name").and_then(Value::as_str)?;
                let input = function
                    .get("arguments")
                    .and_then(Value::as_str)
                    .and_then(|a| serde_json::from_str(a).ok())
                    .unwrap_or(Value::Object(serde_json::Map::new()));
                blocks.push(ContentBlock::ToolUse {
                    id: call
                        .get("id")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    name: name.to_string(),
                    input,
                });
            }
            if !blocks.is_empty() {
                return Some(Message {
                    role,
                    content: MessageContent::Blocks(blocks),
                });
            }
        }
    }

    let content = flatten_content(entry.get("content")?)?;
    Some(Message {
        role,
        content: MessageContent::Text(content),
    })
}

/// Flatten a content value to a single string. Arrays of
/// `{type: text|input_text, text|input_text}` parts join with blank lines.
fn flatten_content(content: &Value) -> Option<String> {
    match content {
        Value::String(s) => Some(s.clone()),
        Value::Array(parts) => {
            let texts: Vec<&str> = parts
                .iter()
                .filter(|p| {
                    matches!(
                        p.get("type").and_then(Value::as_str),
                        Some("text") | Some("input_text") | Some("output_text") | None
                    )
                })
                .filter_map(|p| {
                    p.get("text")
                        .or_else(|| p.get("input_text"))
                        .and_then(Value::as_str)
                })
                .collect();
            if texts.is_empty() {
                None
            } else {
                Some(texts.join("\n\n"))
            }
        }
        _ => None,
    }
}
