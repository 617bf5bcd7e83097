use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::message::Message;
use crate::ids::SessionId;

/// A tool declaration sent with a request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub input_schema: Value,
}

/// System prompt as received on the wire: a bare string or text-block list.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SystemPrompt {
    Text(String),
    Blocks(Vec<SystemBlock>),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SystemBlock {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

impl SystemPrompt {
    pub fn as_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Blocks(blocks) => blocks
                .iter()
                .map(|b| b.text.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// A request in the canonical Messages shape.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CanonicalRequest {
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<SystemPrompt>,
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl CanonicalRequest {
    /// System prompt flattened to text, if present.
    pub fn system_text(&self) -> Option<String> {
        self.system.as_ref().map(|s| s.as_text())
    }

    /// Session identifier from metadata (`session_id` or `user_id`), if any.
    pub fn session_id(&self) -> Option<SessionId> {
        let meta = self.metadata.as_ref()?;
        meta.get("session_id")
            .or_else(|| meta.get("user_id"))
            .and_then(Value::as_str)
            .map(SessionId::from)
    }

    /// Text of the last user message, used by the complexity analyzer.
    pub fn last_user_text(&self) -> String {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == super::message::Role::User)
            .map(|m| m.content.plain_text())
            .unwrap_or_default()
    }
}
