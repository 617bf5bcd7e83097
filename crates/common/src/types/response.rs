use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::message::{ContentBlock, Role};

/// Why the upstream stopped generating, mapped to canonical values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    ContentFilter,
}

/// Token usage from a single upstream call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// A response in the canonical Messages shape.
///
/// `model` always echoes the caller-requested model, never the upstream's
/// own identifier.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CanonicalResponse {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub role: Role,
    pub model: String,
    pub content: Vec<ContentBlock>,
    pub stop_reason: StopReason,
    pub usage: Usage,
}

impl CanonicalResponse {
    pub fn new(
        model: impl Into<String>,
        content: Vec<ContentBlock>,
        stop_reason: StopReason,
        usage: Usage,
    ) -> Self {
        Self {
            id: format!("msg_{}", Uuid::new_v4().simple()),
            kind: "message".into(),
            role: Role::Assistant,
            model: model.into(),
            content,
            stop_reason,
            usage,
        }
    }

    /// Concatenated text of all text blocks.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
