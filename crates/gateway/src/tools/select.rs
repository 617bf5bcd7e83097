//! Per-request pruning of the tool list based on the analyzer's task
//! classification, with provider caps and a token-budget guard.

use switchboard_common::config::ToolConfig;
use switchboard_common::types::provider::ProviderId;
use switchboard_common::types::routing::RoutingMode;
use switchboard_common::types::ToolDefinition;

/// Coarse task classification produced by the complexity analyzer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskClass {
    Conversational,
    FileReading,
    CodeWriting,
    SystemOps,
    Research,
    ComplexTask,
}

/// Estimated schema cost per tool, in tokens.
const TOKENS_PER_TOOL: u32 = 175;

fn allowed_names(class: TaskClass) -> Option<&'static [&'static str]> {
    match class {
        TaskClass::Conversational => Some(&[]),
        TaskClass::FileReading => Some(&["Read", "Grep", "Glob"]),
        TaskClass::CodeWriting => Some(&["Read", "Write", "Edit", "Grep", "Glob"]),
        TaskClass::SystemOps => Some(&["Bash", "Read", "Grep"]),
        TaskClass::Research => Some(&["WebFetch", "Read", "Grep"]),
        // Full set — no pruning by name.
        TaskClass::ComplexTask => None,
    }
}

/// Names considered ambiguous for a class: kept normally, trimmed in
/// aggressive mode.
fn ambiguous_names(class: TaskClass) -> &'static [&'static str] {
    match class {
        TaskClass::FileReading => &["Glob"],
        TaskClass::CodeWriting => &["Grep", "Glob"],
        TaskClass::SystemOps | TaskClass::Research => &["Grep"],
        _ => &[],
    }
}

/// Prune a tool list for one request.
///
/// Unknown (caller-defined) tools always survive name pruning — the map
/// only constrains the built-in catalog. Order is preserved throughout so
/// the token-budget guard drops from the tail.
pub fn select_tools(
    tools: &[ToolDefinition],
    class: TaskClass,
    mode: RoutingMode,
    provider: ProviderId,
    config: &ToolConfig,
) -> Vec<ToolDefinition> {
    let catalog_names: Vec<String> = super::default_catalog()
        .iter()
        .map(|t| t.name.clone())
        .collect();

    let mut selected: Vec<ToolDefinition> = match allowed_names(class) {
        Some(allowed) => tools
            .iter()
            .filter(|t| {
                !catalog_names.contains(&t.name) || allowed.contains(&t.name.as_str())
            })
            .cloned()
            .collect(),
        None => tools.to_vec(),
    };

    match mode {
        RoutingMode::Aggressive => {
            let ambiguous = ambiguous_names(class);
            selected.retain(|t| !ambiguous.contains(&t.name.as_str()));
        }
        RoutingMode::Conservative => {
            // One safety tool: keep Read available unless the class is
            // purely conversational.
            if class != TaskClass::Conversational
                && !selected.iter().any(|t| t.name == "Read")
            {
                if let Some(read) = tools.iter().find(|t| t.name == "Read") {
                    selected.push(read.clone());
                }
            }
        }
        RoutingMode::Heuristic => {}
    }

    if provider == ProviderId::Ollama && selected.len() > config.ollama_max_tools {
        tracing::debug!(
            dropped = selected.len() - config.ollama_max_tools,
            "Capping tool list for Ollama"
        );
        selected.truncate(config.ollama_max_tools);
    }

    // Token-budget guard: drop trailing tools past the budget.
    let budget = config.token_budget;
    let max_tools = (budget / TOKENS_PER_TOOL) as usize;
    if selected.len() > max_tools {
        tracing::debug!(
            dropped = selected.len() - max_tools,
            budget,
            "Tool schemas exceed token budget, trimming tail"
        );
        selected.truncate(max_tools);
    }

    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::default_catalog;

    fn config() -> ToolConfig {
        ToolConfig::default()
    }

    #[test]
    fn test_conversational_gets_no_tools() {
        let selected = select_tools(
            &default_catalog(),
            TaskClass::Conversational,
            RoutingMode::Heuristic,
            ProviderId::Openai,
            &config(),
        );
        assert!(selected.is_empty());
    }

    #[test]
    fn test_file_reading_subset() {
        let selected = select_tools(
            &default_catalog(),
            TaskClass::FileReading,
            RoutingMode::Heuristic,
            ProviderId::Openai,
            &config(),
        );
        let names: Vec<&str> = selected.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["Read", "Grep", "Glob"]);
    }

    #[test]
    fn test_complex_task_keeps_full_set() {
        let selected = select_tools(
            &default_catalog(),
            TaskClass::ComplexTask,
            RoutingMode::Heuristic,
            ProviderId::Openai,
            &config(),
        );
        assert_eq!(selected.len(), default_catalog().len());
    }

    #[test]
    fn test_aggressive_trims_ambiguous() {
        let selected = select_tools(
            &default_catalog(),
            TaskClass::FileReading,
            RoutingMode::Aggressive,
            ProviderId::Openai,
            &config(),
        );
        let names: Vec<&str> = selected.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["Read", "Grep"]);
    }

    #[test]
    fn test_conservative_adds_read() {
        let selected = select_tools(
            &default_catalog(),
            TaskClass::SystemOps,
            RoutingMode::Conservative,
            ProviderId::Openai,
            &config(),
        );
        assert!(selected.iter().any(|t| t.name == "Read"));
    }

    #[test]
    fn test_custom_tools_survive_pruning() {
        let mut tools = default_catalog();
        tools.push(ToolDefinition {
            name: "DeployService".into(),
            description: String::new(),
            input_schema: serde_json::json!({"type": "object"}),
        });
        let selected = select_tools(
            &tools,
            TaskClass::FileReading,
            RoutingMode::Heuristic,
            ProviderId::Openai,
            &config(),
        );
        assert!(selected.iter().any(|t| t.name == "DeployService"));
    }

    #[test]
    fn test_ollama_cap() {
        let mut cfg = config();
        cfg.ollama_max_tools = 2;
        let selected = select_tools(
            &default_catalog(),
            TaskClass::ComplexTask,
            RoutingMode::Heuristic,
            ProviderId::Ollama,
            &cfg,
        );
        assert_eq!(selected.len(), 2);
    }

    #[test]
    fn test_token_budget_trims_tail() {
        let mut cfg = config();
        cfg.token_budget = 400; // two tools' worth
        let selected = select_tools(
            &default_catalog(),
            TaskClass::ComplexTask,
            RoutingMode::Heuristic,
            ProviderId::Openai,
            &cfg,
        );
        assert_eq!(selected.len(), 2);
        assert_eq!(selected[0].name, "Read");
        assert_eq!(selected[1].name, "Write");
    }
}
