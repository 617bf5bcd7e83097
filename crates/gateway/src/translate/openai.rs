use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use switchboard_common::types::{
    CanonicalRequest, CanonicalResponse, ContentBlock, Message, Role, StopReason, ToolDefinition,
    Usage,
};
use switchboard_common::GatewayError;

// ---------------------------------------------------------------------------
// Request wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct ChatBody {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Azure Responses uses this in place of `max_tokens`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_completion_tokens: Option<u32>,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ChatTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ChatToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatTool {
    pub r#type: String,
    pub function: ChatFunction,
}

#[derive(Debug, Serialize)]
pub struct ChatFunction {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatToolCall {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default = "function_type")]
    pub r#type: String,
    pub function: ChatToolCallFunction,
}

fn function_type() -> String {
    "function".into()
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatToolCallFunction {
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

// ---------------------------------------------------------------------------
// Response wire types
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ChatToolCall>,
}

#[derive(Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

// ---------------------------------------------------------------------------
// Canonical → wire
// ---------------------------------------------------------------------------

/// Translate canonical messages to the chat-completions message sequence.
///
/// Text blocks within one canonical message are joined with newlines into a
/// single string content. Assistant tool_use blocks become `tool_calls`;
/// user tool_result blocks become standalone `tool` role messages. A
/// tool_result whose id was never emitted as a tool_call is dropped.
pub fn to_wire_messages(system: Option<&str>, messages: &[Message]) -> Vec<ChatMessage> {
    let mut wire = Vec::new();

    if let Some(system) = system {
        wire.push(ChatMessage {
            role: "system".into(),
            content: Some(system.to_string()),
            tool_calls: None,
            tool_call_id: None,
        });
    }

    let mut emitted_tool_ids: HashSet<String> = HashSet::new();

    for msg in messages {
        match msg.role {
            Role::System => {
                let text = msg.content.plain_text();
                if !text.is_empty() {
                    wire.push(ChatMessage {
                        role: "system".into(),
                        content: Some(text),
                        tool_calls: None,
                        tool_call_id: None,
                    });
                }
            }
            Role::User => {
                let mut text_parts: Vec<String> = Vec::new();

                for block in msg.content.blocks() {
                    match block {
                        ContentBlock::Text { text } => text_parts.push(text),
                        ContentBlock::ToolResult {
                            tool_use_id,
                            content,
                            ..
                        } => {
                            if !emitted_tool_ids.contains(&tool_use_id) {
                                tracing::debug!(
                                    tool_use_id = %tool_use_id,
                                    "Dropping orphan tool_result with no matching tool_use"
                                );
                                continue;
                            }
                            // Flush accumulated text first so ordering holds.
                            if !text_parts.is_empty() {
                                wire.push(ChatMessage {
                                    role: "user".into(),
                                    content: Some(text_parts.join("\n")),
                                    tool_calls: None,
                                    tool_call_id: None,
                                });
                                text_parts = Vec::new();
                            }
                            wire.push(ChatMessage {
                                role: "tool".into(),
                                content: Some(ContentBlock::tool_result_text(&content)),
                                tool_calls: None,
                                tool_call_id: Some(tool_use_id),
                            });
                        }
                        ContentBlock::ToolUse { .. } => {}
                    }
                }

                if !text_parts.is_empty() {
                    wire.push(ChatMessage {
                        role: "user".into(),
                        content: Some(text_parts.join("\n")),
                        tool_calls: None,
                        tool_call_id: None,
                    });
                }
            }
            Role::Assistant => {
                let mut text_parts = Vec::new();
                let mut tool_calls = Vec::new();

                for block in msg.content.blocks() {
                    match block {
                        ContentBlock::Text { text } => text_parts.push(text),
                        ContentBlock::ToolUse { id, name, input } => {
                            emitted_tool_ids.insert(id.clone());
                            tool_calls.push(ChatToolCall {
                                id: Some(id),
                                r#type: "function".into(),
                                function: ChatToolCallFunction {
                                    name,
                                    arguments: serde_json::to_string(&input)
                                        .unwrap_or_default(),
                                },
                            });
                        }
                        ContentBlock::ToolResult { .. } => {}
                    }
                }

                wire.push(ChatMessage {
                    role: "assistant".into(),
                    content: if text_parts.is_empty() {
                        None
                    } else {
                        Some(text_parts.join("\n"))
                    },
                    tool_calls: if tool_calls.is_empty() {
                        None
                    } else {
                        Some(tool_calls)
                    },
                    tool_call_id: None,
                });
            }
        }
    }

    wire
}

pub fn to_wire_tools(tools: &[ToolDefinition]) -> Vec<ChatTool> {
    tools
        .iter()
        .map(|t| ChatTool {
            r#type: "function".into(),
            function: ChatFunction {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.input_schema.clone(),
            },
        })
        .collect()
}

/// Build the full chat-completions body for a canonical request.
///
/// `use_max_completion_tokens` switches the token-limit field name for the
/// Azure Responses surface.
pub fn build_chat_body(
    request: &CanonicalRequest,
    model: &str,
    tools: &[ToolDefinition],
    stream: bool,
    use_max_completion_tokens: bool,
) -> ChatBody {
    let system = request.system_text();
    ChatBody {
        model: model.to_string(),
        max_tokens: if use_max_completion_tokens {
            None
        } else {
            request.max_tokens
        },
        max_completion_tokens: if use_max_completion_tokens {
            request.max_tokens
        } else {
            None
        },
        messages: to_wire_messages(system.as_deref(), &request.messages),
        tools: to_wire_tools(tools),
        temperature: request.temperature,
        top_p: request.top_p,
        stream,
    }
}

// ---------------------------------------------------------------------------
// Wire → canonical
// ---------------------------------------------------------------------------

/// Whether a content string is a whole-string JSON object shaped like a
/// tool call — local models leak these into the text channel.
fn looks_like_tool_call_json(text: &str) -> bool {
    let trimmed = text.trim();
    if !trimmed.starts_with('{') {
        return false;
    }
    let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(trimmed) else {
        return false;
    };
    obj.contains_key("function")
        || obj.get("type").and_then(Value::as_str) == Some("function")
}

fn mint_tool_use_id() -> String {
    format!("toolu_{}", Uuid::new_v4().simple())
}

/// Translate a chat-completions response body to the canonical shape.
///
/// Only choice 0 is used; missing or empty `choices` is a distinguished
/// error. The canonical `model` always echoes the caller-requested model.
pub fn parse_chat_response(
    raw: &[u8],
    requested_model: &str,
) -> Result<CanonicalResponse, GatewayError> {
    let resp: ChatResponse = serde_json::from_slice(raw)
        .map_err(|e| GatewayError::MalformedResponse(format!("chat response: {}", e)))?;
    from_wire_response(resp, requested_model)
}

fn from_wire_response(
    resp: ChatResponse,
    requested_model: &str,
) -> Result<CanonicalResponse, GatewayError> {
    let choice = resp
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| GatewayError::MalformedResponse("no_choices".into()))?;

    let has_tool_calls = !choice.message.tool_calls.is_empty();
    let mut content = Vec::new();

    match choice.message.content {
        Some(text) if looks_like_tool_call_json(&text) => {
            if has_tool_calls {
                // JSON leakage alongside real tool_calls: suppress the text.
                tracing::debug!("Suppressing tool-call JSON leaked into content");
            } else {
                // A tool hallucination with no actual calls: empty the text.
                tracing::debug!("Emptying malformed tool-call JSON content");
                content.push(ContentBlock::text(""));
            }
        }
        Some(text) => {
            if !text.is_empty() || !has_tool_calls {
                content.push(ContentBlock::Text { text });
            }
        }
        None => {
            if !has_tool_calls {
                // The content array is never empty.
                content.push(ContentBlock::text(""));
            }
        }
    }

    for tc in choice.message.tool_calls {
        let input: Value = serde_json::from_str(&tc.function.arguments)
            .unwrap_or(Value::Object(serde_json::Map::new()));
        content.push(ContentBlock::ToolUse {
            id: tc.id.unwrap_or_else(mint_tool_use_id),
            name: tc.function.name,
            input,
        });
    }

    let stop_reason = if has_tool_calls {
        StopReason::ToolUse
    } else {
        map_finish_reason(choice.finish_reason.as_deref())
    };

    let usage = resp
        .usage
        .map(|u| Usage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        })
        .unwrap_or_default();

    Ok(CanonicalResponse::new(
        requested_model,
        content,
        stop_reason,
        usage,
    ))
}

fn map_finish_reason(reason: Option<&str>) -> StopReason {
    match reason {
        Some("tool_calls") => StopReason::ToolUse,
        Some("length") => StopReason::MaxTokens,
        Some("content_filter") => StopReason::ContentFilter,
        _ => StopReason::EndTurn,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
