use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use switchboard_common::types::{
    CanonicalRequest, CanonicalResponse, ContentBlock, Role, StopReason, Usage,
};
use switchboard_common::GatewayError;

// ---------------------------------------------------------------------------
// Request wire types (native /api/chat)
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct OllamaChatBody {
    pub model: String,
    pub messages: Vec<OllamaMessage>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<OllamaOptions>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OllamaMessage {
    pub role: String,
    /// Always a plain string — the native API has no block content.
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<OllamaToolCall>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OllamaToolCall {
    pub function: OllamaToolCallFunction,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OllamaToolCallFunction {
    pub name: String,
    /// Structured object, not a JSON string as in the OpenAI shape.
    #[serde(default)]
    pub arguments: Value,
}

#[derive(Debug, Serialize)]
pub struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<u32>,
}

// ---------------------------------------------------------------------------
// Response wire types
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: Option<OllamaMessage>,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: u64,
    #[serde(default)]
    eval_count: u64,
}

// ---------------------------------------------------------------------------
// Canonical → wire
// ---------------------------------------------------------------------------

/// Build the native chat body. Block content is flattened to strings;
/// tool_result blocks become `tool` role messages.
pub fn build_chat_body(
    request: &CanonicalRequest,
    model: &str,
    tools: &[Value],
    stream: bool,
) -> OllamaChatBody {
    let mut messages = Vec::new();

    if let Some(system) = request.system_text() {
        messages.push(OllamaMessage {
            role: "system".into(),
            content: system,
            tool_calls: None,
        });
    }

    for msg in &request.messages {
        match msg.role {
            Role::System => {
                messages.push(OllamaMessage {
                    role: "system".into(),
                    content: msg.content.plain_text(),
                    tool_calls: None,
                });
            }
            Role::User => {
                let mut text_parts: Vec<String> = Vec::new();
                for block in msg.content.blocks() {
                    match block {
                        ContentBlock::Text { text } => text_parts.push(text),
                        ContentBlock::ToolResult { content, .. } => {
                            messages.push(OllamaMessage {
                                role: "tool".into(),
                                content: ContentBlock::tool_result_text(&content),
                                tool_calls: None,
                            });
                        }
                        ContentBlock::ToolUse { .. } => {}
                    }
                }
                if !text_parts.is_empty() {
                    messages.push(OllamaMessage {
                        role: "user".into(),
                        content: text_parts.join("\n"),
                        tool_calls: None,
                    });
                }
            }
            Role::Assistant => {
                let mut text_parts = Vec::new();
                let mut tool_calls = Vec::new();
                for block in msg.content.blocks() {
                    match block {
                        ContentBlock::Text { text } => text_parts.push(text),
                        ContentBlock::ToolUse { name, input, .. } => {
                            tool_calls.push(OllamaToolCall {
                                function: OllamaToolCallFunction {
                                    name,
                                    arguments: input,
                                },
                            });
                        }
                        ContentBlock::ToolResult { .. } => {}
                    }
                }
                messages.push(OllamaMessage {
                    role: "assistant".into(),
                    content: text_parts.join("\n"),
                    tool_calls: if tool_calls.is_empty() {
                        None
                    } else {
                        Some(tool_calls)
                    },
                });
            }
        }
    }

    super::compact_same_role_ollama(&mut messages);

    OllamaChatBody {
        model: model.to_string(),
        messages,
        stream,
        options: Some(OllamaOptions {
            temperature: request.temperature,
            top_p: request.top_p,
            num_predict: request.max_tokens,
        }),
        tools: tools.to_vec(),
    }
}

// ---------------------------------------------------------------------------
// Wire → canonical
// ---------------------------------------------------------------------------

pub fn parse_chat_response(
    raw: &[u8],
    requested_model: &str,
) -> Result<CanonicalResponse, GatewayError> {
    let resp: OllamaChatResponse = serde_json::from_slice(raw)
        .map_err(|e| GatewayError::MalformedResponse(format!("ollama response: {}", e)))?;

    let message = resp
        .message
        .ok_or_else(|| GatewayError::MalformedResponse("ollama message missing".into()))?;

    let tool_calls = message.tool_calls.unwrap_or_default();
    let has_tool_calls = !tool_calls.is_empty();

    let mut content = Vec::new();
    if !message.content.is_empty() || !has_tool_calls {
        content.push(ContentBlock::Text {
            text: message.content,
        });
    }

    for tc in tool_calls {
        let input = match tc.function.arguments {
            Value::Object(map) => Value::Object(map),
            Value::String(s) => {
                serde_json::from_str(&s).unwrap_or(Value::Object(serde_json::Map::new()))
            }
            _ => Value::Object(serde_json::Map::new()),
        };
        content.push(ContentBlock::ToolUse {
            id: format!("toolu_{}", Uuid::new_v4().simple()),
            name: tc.function.name,
            input,
        });
    }

    let stop_reason = if has_tool_calls {
        StopReason::ToolUse
    } else {
        match resp.done_reason.as_deref() {
            Some("length") => StopReason::MaxTokens,
            _ => StopReason::EndTurn,
        }
    };

    Ok(CanonicalResponse::new(
        requested_model,
        content,
        stop_reason,
        Usage {
            input_tokens: resp.prompt_eval_count,
            output_tokens: resp.eval_count,
        },
    ))
}
