use serde::{Deserialize, Serialize};
use serde_json::Value;

use switchboard_common::types::{
    CanonicalRequest, CanonicalResponse, ContentBlock, Message, Role, StopReason, ToolDefinition,
    Usage,
};
use switchboard_common::GatewayError;

// ---------------------------------------------------------------------------
// Request wire types (Converse schema, camelCase throughout)
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConverseBody {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub system: Vec<SystemBlock>,
    pub messages: Vec<ConverseMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inference_config: Option<InferenceConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_config: Option<ToolConfig>,
}

#[derive(Debug, Serialize)]
pub struct SystemBlock {
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConverseMessage {
    pub role: String,
    pub content: Vec<ConversePart>,
}

/// One Converse content part. Exactly one field is set.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversePart {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_use: Option<ToolUsePart>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<ToolResultPart>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolUsePart {
    pub tool_use_id: String,
    pub name: String,
    pub input: Value,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResultPart {
    pub tool_use_id: String,
    pub content: Vec<ToolResultContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ToolResultContent {
    pub text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InferenceConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct ToolConfig {
    pub tools: Vec<ToolEntry>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolEntry {
    pub tool_spec: ToolSpec,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: InputSchema,
}

#[derive(Debug, Serialize)]
pub struct InputSchema {
    pub json: Value,
}

// ---------------------------------------------------------------------------
// Response wire types
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConverseResponse {
    output: Option<ConverseOutput>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<ConverseUsage>,
}

#[derive(Deserialize)]
struct ConverseOutput {
    message: ConverseMessage,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConverseUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

// ---------------------------------------------------------------------------
// Canonical → wire
// ---------------------------------------------------------------------------

fn to_converse_message(msg: &Message) -> ConverseMessage {
    let role = match msg.role {
        Role::Assistant => "assistant",
        Role::User | Role::System => "user",
    };

    let content = msg
        .content
        .blocks()
        .into_iter()
        .map(|block| match block {
            ContentBlock::Text { text } => ConversePart {
                text: Some(text),
                ..Default::default()
            },
            ContentBlock::ToolUse { id, name, input } => ConversePart {
                tool_use: Some(ToolUsePart {
                    tool_use_id: id,
                    name,
                    input,
                }),
                ..Default::default()
            },
            ContentBlock::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => ConversePart {
                tool_result: Some(ToolResultPart {
                    tool_use_id,
                    content: vec![ToolResultContent {
                        text: ContentBlock::tool_result_text(&content),
                    }],
                    status: is_error.and_then(|e| e.then(|| "error".to_string())),
                }),
                ..Default::default()
            },
        })
        .collect();

    ConverseMessage {
        role: role.to_string(),
        content,
    }
}

/// Build the Converse request body. System messages are lifted out of the
/// messages array into the top-level `system` field.
pub fn build_converse_body(
    request: &CanonicalRequest,
    tools: &[ToolDefinition],
) -> ConverseBody {
    let mut system = Vec::new();
    if let Some(text) = request.system_text() {
        system.push(SystemBlock { text });
    }

    let mut messages = Vec::new();
    for msg in &request.messages {
        if msg.role == Role::System {
            let text = msg.content.plain_text();
            if !text.is_empty() {
                system.push(SystemBlock { text });
            }
            continue;
        }
        messages.push(to_converse_message(msg));
    }

    let inference_config = if request.max_tokens.is_some()
        || request.temperature.is_some()
        || request.top_p.is_some()
    {
        Some(InferenceConfig {
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            top_p: request.top_p,
        })
    } else {
        None
    };

    let tool_config = if tools.is_empty() {
        None
    } else {
        Some(ToolConfig {
            tools: tools
                .iter()
                .map(|t| ToolEntry {
                    tool_spec: ToolSpec {
                        name: t.name.clone(),
                        description: t.description.clone(),
                        input_schema: InputSchema {
                            json: t.input_schema.clone(),
                        },
                    },
                })
                .collect(),
        })
    };

    ConverseBody {
        system,
        messages,
        inference_config,
        tool_config,
    }
}

// ---------------------------------------------------------------------------
// Wire → canonical
// ---------------------------------------------------------------------------

pub fn parse_converse_response(
    raw: &[u8],
    requested_model: &str,
) -> Result<CanonicalResponse, GatewayError> {
    let resp: ConverseResponse = serde_json::from_slice(raw)
        .map_err(|e| GatewayError::MalformedResponse(format!("converse response: {}", e)))?;

    let message = resp
        .output
        .ok_or_else(|| GatewayError::MalformedResponse("converse output missing".into()))?
        .message;

    let mut content = Vec::new();
    for part in message.content {
        if let Some(text) = part.text {
            content.push(ContentBlock::Text { text });
        } else if let Some(tu) = part.tool_use {
            content.push(ContentBlock::ToolUse {
                id: tu.tool_use_id,
                name: tu.name,
                input: tu.input,
            });
        }
        // toolResult parts never appear in model output; ignore anything else.
    }

    if content.is_empty() {
        content.push(ContentBlock::text(""));
    }

    let stop_reason = match resp.stop_reason.as_deref() {
        Some("tool_use") => StopReason::ToolUse,
        Some("max_tokens") => StopReason::MaxTokens,
        Some("content_filtered") => StopReason::ContentFilter,
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
    fn test_system_extracted_to_top_level() {
        let request: CanonicalRequest = serde_json::from_str(
            r#"{"model": "m", "system": "global",
                "messages": [
                    {"role": "system", "content": "inline"},
                    {"role": "user", "content": "hi"}
                ]}"#,
        )
        .unwrap();
        let body = build_converse_body(&request, &[]);
        assert_eq!(body.system.len(), 2);
        assert_eq!(body.system[0].text, "global");
        assert_eq!(body.system[1].text, "inline");
        assert_eq!(body.messages.len(), 1);
    }

    #[test]
    fn test_tool_blocks_map_to_converse_parts() {
        let request: CanonicalRequest = serde_json::from_str(
            r#"{"model": "m", "messages": [
                {"role": "assistant", "content": [
                    {"type": "tool_use", "id": "toolu_1", "name": "Read", "input": {"file_path": "/a"}}]},
                {"role": "user", "content": [
                    {"type": "tool_result", "tool_use_id": "toolu_1", "content": "data"}]}
            ]}"#,
        )
        .unwrap();
        let body = build_converse_body(&request, &[]);

        let tu = body.messages[0].content[0].tool_use.as_ref().unwrap();
        assert_eq!(tu.tool_use_id, "toolu_1");
        assert_eq!(tu.name, "Read");

        let tr = body.messages[1].content[0].tool_result.as_ref().unwrap();
        assert_eq!(tr.tool_use_id, "toolu_1");
        assert_eq!(tr.content[0].text, "data");
    }

    #[test]
    fn test_tool_config_shape() {
        let request: CanonicalRequest =
            serde_json::from_str(r#"{"model": "m", "messages": []}"#).unwrap();
        let tools = vec![ToolDefinition {
            name: "Read".into(),
            description: "Read a file".into(),
            input_schema: serde_json::json!({"type": "object"}),
        }];
        let body = build_converse_body(&request, &tools);
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["toolConfig"]["tools"][0]["toolSpec"]["name"], "Read");
        assert_eq!(
            json["toolConfig"]["tools"][0]["toolSpec"]["inputSchema"]["json"]["type"],
            "object"
        );
    }

    #[test]
    fn test_parse_converse_tool_use() {
        let raw = br#"{
            "output": {"message": {"role": "assistant", "content": [
                {"text": "Using a tool."},
                {"toolUse": {"toolUseId": "tooluse_x", "name": "Grep", "input": {"pattern": "y"}}}
            ]}},
            "stopReason": "tool_use",
            "usage": {"inputTokens": 12, "outputTokens": 34}
        }"#;
        let resp = parse_converse_response(raw, "requested").unwrap();
        assert_eq!(resp.model, "requested");
        assert_eq!(resp.stop_reason, StopReason::ToolUse);
        assert_eq!(resp.content.len(), 2);
        assert!(matches!(&resp.content[1], ContentBlock::ToolUse { id, .. } if id == "tooluse_x"));
        assert_eq!(resp.usage.input_tokens, 12);
    }

    #[test]
    fn test_stop_reason_mapping() {
        for (reason, expected) in [
            ("end_turn", StopReason::EndTurn),
            ("tool_use", StopReason::ToolUse),
            ("max_tokens", StopReason::MaxTokens),
            ("content_filtered", StopReason::ContentFilter),
            ("guardrail_intervened", StopReason::EndTurn),
        ] {
            let raw = format!(
                r#"{{"output": {{"message": {{"role": "assistant", "content": [{{"text": "x"}}]}}}},
                    "stopReason": "{}"}}"#,
                reason
            );
            let resp = parse_converse_response(raw.as_bytes(), "m").unwrap();
            assert_eq!(resp.stop_reason, expected, "stopReason={}", reason);
        }
    }

    #[test]
    fn test_missing_output_is_malformed() {
        let raw = br#"{"stopReason": "end_turn"}"#;
        assert!(matches!(
            parse_converse_response(raw, "m"),
            Err(GatewayError::MalformedResponse(_))
        ));
    }
}
