//! Tool assembly for agent turns
//!
//! Static tools come from tool sources and delegation targets at
//! initialization time; dynamic tools are computed per request from the chat
//! input. New dynamic rules are added here without touching the tool loop.

mod delegation;
mod page_context;
mod translate;

pub use delegation::delegation_tool;
pub use page_context::{
    extract_section, page_content_tool, PAGE_CONTENT_TOOL, PAGE_CONTEXT_INSTRUCTION,
};
pub use translate::{translate_tool, ArgSchema};

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::agents::domain::{ChatInput, Tool, PAGE_CONTEXT_KEY};

/// A rule that may contribute per-request tools based on the chat input.
pub trait DynamicToolRule: Send + Sync {
    fn tools(&self, input: &ChatInput) -> Vec<Tool>;
}

/// Injects `getPageContent` when the request carries a non-empty
/// `metadata.pageContext` string.
pub struct PageContextRule;

impl DynamicToolRule for PageContextRule {
    fn tools(&self, input: &ChatInput) -> Vec<Tool> {
        match input.metadata.get(PAGE_CONTEXT_KEY) {
            Some(Value::String(page)) if !page.is_empty() => {
                vec![page_content_tool(page.clone())]
            }
            _ => Vec::new(),
        }
    }
}

/// The tool set for one turn: static tools plus whatever the dynamic rules
/// contribute. Dynamic tools shadow static ones on name collision.
pub fn effective_tools(
    static_tools: &HashMap<String, Tool>,
    rules: &[Arc<dyn DynamicToolRule>],
    input: &ChatInput,
) -> HashMap<String, Tool> {
    let mut tools = static_tools.clone();
    for rule in rules {
        for tool in rule.tools(input) {
            tools.insert(tool.name().to_string(), tool);
        }
    }
    tools
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn page_context_rule_requires_non_empty_string() {
        let rule = PageContextRule;

        let mut input = ChatInput::new("hi");
        assert!(rule.tools(&input).is_empty());

        input
            .metadata
            .insert(PAGE_CONTEXT_KEY.to_string(), json!(""));
        assert!(rule.tools(&input).is_empty());

        input
            .metadata
            .insert(PAGE_CONTEXT_KEY.to_string(), json!(42));
        assert!(rule.tools(&input).is_empty());

        input
            .metadata
            .insert(PAGE_CONTEXT_KEY.to_string(), json!("# Page"));
        let tools = rule.tools(&input);
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name(), PAGE_CONTENT_TOOL);
    }

    #[test]
    fn effective_tools_unions_static_and_dynamic() {
        let statics: HashMap<String, Tool> = [(
            "crm_lookup".to_string(),
            page_content_tool(String::new()), // any tool body works here
        )]
        .into_iter()
        .map(|(name, mut tool)| {
            tool.definition.name = name.clone();
            (name, tool)
        })
        .collect();

        let rules: Vec<Arc<dyn DynamicToolRule>> = vec![Arc::new(PageContextRule)];

        let mut input = ChatInput::new("hi");
        input
            .metadata
            .insert(PAGE_CONTEXT_KEY.to_string(), json!("# Page"));

        let tools = effective_tools(&statics, &rules, &input);
        assert_eq!(tools.len(), 2);
        assert!(tools.contains_key("crm_lookup"));
        assert!(tools.contains_key(PAGE_CONTENT_TOOL));
    }
}
