//! Built-in tool catalog, per-request injection, and per-family schema
//! conversion.

pub mod select;

use serde_json::{json, Value};

use switchboard_common::config::ToolConfig;
use switchboard_common::types::provider::ProviderId;
use switchboard_common::types::ToolDefinition;

/// The built-in catalog, declared in canonical form.
pub fn default_catalog() -> Vec<ToolDefinition> {
    vec![
        tool(
            "Read",
            "Read a file from the local filesystem",
            json!({
                "type": "object",
                "properties": {
                    "file_path": {"type": "string", "description": "Absolute path to the file"}
                },
                "required": ["file_path"]
            }),
        ),
        tool(
            "Write",
            "Write content to a file, creating or overwriting it",
            json!({
                "type": "object",
                "properties": {
                    "file_path": {"type": "string"},
                    "content": {"type": "string"}
                },
                "required": ["file_path", "content"]
            }),
        ),
        tool(
            "Edit",
            "Replace an exact string in a file",
            json!({
                "type": "object",
                "properties": {
                    "file_path": {"type": "string"},
                    "old_string": {"type": "string"},
                    "new_string": {"type": "string"}
                },
                "required": ["file_path", "old_string", "new_string"]
            }),
        ),
        tool(
            "Bash",
            "Execute a shell command and return its output",
            json!({
                "type": "object",
                "properties": {
                    "command": {"type": "string"},
                    "timeout_ms": {"type": "integer"}
                },
                "required": ["command"]
            }),
        ),
        tool(
            "Grep",
            "Search file contents with a regular expression",
            json!({
                "type": "object",
                "properties": {
                    "pattern": {"type": "string"},
                    "path": {"type": "string"}
                },
                "required": ["pattern"]
            }),
        ),
        tool(
            "Glob",
            "Find files matching a glob pattern",
            json!({
                "type": "object",
                "properties": {
                    "pattern": {"type": "string"}
                },
                "required": ["pattern"]
            }),
        ),
        tool(
            "WebFetch",
            "Fetch a URL and return its content",
            json!({
                "type": "object",
                "properties": {
                    "url": {"type": "string"}
                },
                "required": ["url"]
            }),
        ),
    ]
}

fn tool(name: &str, description: &str, input_schema: Value) -> ToolDefinition {
    ToolDefinition {
        name: name.into(),
        description: description.into(),
        input_schema,
    }
}

/// Whether the catalog is injected for this provider when the request
/// carries no tools. Cloud families always accept it; local families are
/// behind a config toggle.
pub fn injection_allowed(provider: ProviderId, config: &ToolConfig) -> bool {
    !provider.is_local() || config.inject_for_local
}

/// Resolve the effective tool list: caller tools pass through untouched,
/// an empty list gets the catalog when the provider permits injection.
pub fn effective_tools(
    request_tools: &[ToolDefinition],
    provider: ProviderId,
    config: &ToolConfig,
) -> Vec<ToolDefinition> {
    if !request_tools.is_empty() {
        return request_tools.to_vec();
    }
    if injection_allowed(provider, config) {
        tracing::debug!(provider = %provider, "Injecting default tool catalog");
        default_catalog()
    } else {
        Vec::new()
    }
}

/// Unwrap tool declarations that arrive already in the OpenAI wire shape
/// (`{type:"function", function:{name, description, parameters}}`) back to
/// canonical form, in place. Canonical declarations pass through untouched.
pub fn normalize_tool_declarations(tools: &mut Value) {
    let Some(entries) = tools.as_array_mut() else {
        return;
    };
    for entry in entries {
        let wrapped = entry.get("type").and_then(Value::as_str) == Some("function")
            && entry.get("function").is_some();
        if !wrapped {
            continue;
        }
        tracing::debug!("Unwrapping pre-converted OpenAI tool declaration");
        let function = entry["function"].take();
        *entry = json!({
            "name": function.get("name").cloned().unwrap_or(Value::Null),
            "description": function.get("description").cloned().unwrap_or(json!("")),
            "input_schema": function.get("parameters").cloned().unwrap_or(json!({"type": "object"})),
        });
    }
}

/// Convert canonical declarations to Ollama's schema, which flattens the
/// function wrapper and renames the schema key.
pub fn to_ollama_tools(tools: &[ToolDefinition]) -> Vec<Value> {
    tools
        .iter()
        .map(|t| {
            json!({
                "name": t.name,
                "description": t.description,
                "parameters": t.input_schema,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_names() {
        let catalog = default_catalog();
        let names: Vec<&str> = catalog.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(
            names,
            ["Read", "Write", "Edit", "Bash", "Grep", "Glob", "WebFetch"]
        );
    }

    #[test]
    fn test_injection_policy() {
        let mut config = ToolConfig::default();
        assert!(injection_allowed(ProviderId::Openai, &config));
        assert!(injection_allowed(ProviderId::Bedrock, &config));
        assert!(!injection_allowed(ProviderId::Ollama, &config));
        config.inject_for_local = true;
        assert!(injection_allowed(ProviderId::Ollama, &config));
    }

    #[test]
    fn test_caller_tools_never_replaced() {
        let config = ToolConfig::default();
        let caller = vec![ToolDefinition {
            name: "Custom".into(),
            description: String::new(),
            input_schema: json!({"type": "object"}),
        }];
        let tools = effective_tools(&caller, ProviderId::Openai, &config);
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "Custom");
    }

    #[test]
    fn test_empty_tools_injected_for_cloud() {
        let config = ToolConfig::default();
        let tools = effective_tools(&[], ProviderId::Openai, &config);
        assert_eq!(tools.len(), default_catalog().len());
        let tools = effective_tools(&[], ProviderId::Ollama, &config);
        assert!(tools.is_empty());
    }

    #[test]
    fn test_normalize_unwraps_openai_shape() {
        let mut tools = json!([
            {"type": "function", "function": {
                "name": "Read", "description": "read", "parameters": {"type": "object"}}},
            {"name": "Canonical", "input_schema": {"type": "object"}}
        ]);
        normalize_tool_declarations(&mut tools);
        assert_eq!(tools[0]["name"], "Read");
        assert_eq!(tools[0]["input_schema"]["type"], "object");
        assert!(tools[0].get("function").is_none());
        assert_eq!(tools[1]["name"], "Canonical");
    }

    #[test]
    fn test_ollama_schema_flattened() {
        let tools = to_ollama_tools(&default_catalog()[..1]);
        assert_eq!(tools[0]["name"], "Read");
        assert!(tools[0].get("function").is_none());
        assert_eq!(tools[0]["parameters"]["required"][0], "file_path");
    }
}
