//! Bidirectional format translation between the canonical Messages shape
//! and each provider family's wire shape.

pub mod anthropic;
pub mod bedrock;
pub mod ollama;
pub mod openai;
pub mod responses;

/// Merge consecutive same-role messages for local-family targets, which
/// reject them. Content is concatenated with a single newline; messages
/// carrying tool calls or tool results are never merge candidates.
///
/// Last-resort normalization: logged, never an error.
pub fn compact_same_role_openai(messages: &mut Vec<openai::ChatMessage>) {
    let mut compacted: Vec<openai::ChatMessage> = Vec::with_capacity(messages.len());

    for msg in messages.drain(..) {
        let mergeable = msg.tool_calls.is_none() && msg.tool_call_id.is_none();
        if let Some(prev) = compacted.last_mut() {
            if mergeable
                && prev.role == msg.role
                && prev.tool_calls.is_none()
                && prev.tool_call_id.is_none()
            {
                tracing::debug!(role = %msg.role, "Merging consecutive same-role message");
                let appended = msg.content.unwrap_or_default();
                match prev.content.as_mut() {
                    Some(existing) if !appended.is_empty() => {
                        existing.push('\n');
                        existing.push_str(&appended);
                    }
                    Some(_) => {}
                    None => prev.content = Some(appended),
                }
                continue;
            }
        }
        compacted.push(msg);
    }

    *messages = compacted;
}

/// Same normalization for the native Ollama message shape.
pub fn compact_same_role_ollama(messages: &mut Vec<ollama::OllamaMessage>) {
    let mut compacted: Vec<ollama::OllamaMessage> = Vec::with_capacity(messages.len());

    for msg in messages.drain(..) {
        let mergeable = msg.tool_calls.is_none() && msg.role != "tool";
        if let Some(prev) = compacted.last_mut() {
            if mergeable && prev.role == msg.role && prev.tool_calls.is_none() {
                tracing::debug!(role = %msg.role, "Merging consecutive same-role message");
                if !msg.content.is_empty() {
                    if !prev.content.is_empty() {
                        prev.content.push('\n');
                    }
                    prev.content.push_str(&msg.content);
                }
                continue;
            }
        }
        compacted.push(msg);
    }

    *messages = compacted;
}
