//! Per-request page-content tool
//!
//! When a chat request carries `metadata.pageContext`, the agent injects a
//! `getPageContent` tool whose result is the requested slice of the captured
//! page text.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::agents::domain::{Tool, ToolDefinition, ToolExecutor};
use crate::agents::error::AgentResult;

pub const PAGE_CONTENT_TOOL: &str = "getPageContent";

const TABLES_MARKER: &str = "--- Data Tables ---";
const FORMS_MARKER: &str = "--- Form Fields ---";

/// Instruction appended to the system prompt when the tool is injected.
pub const PAGE_CONTEXT_INSTRUCTION: &str = "The user is viewing a web page. A getPageContent \
tool is available that returns the page text, its data tables, form fields or headings. Prefer \
calling it when the user refers to something on screen.";

/// Build the per-request tool over a captured page context.
pub fn page_content_tool(page: String) -> Tool {
    let definition = ToolDefinition::new(
        PAGE_CONTENT_TOOL,
        "Read the content of the page the user is currently viewing",
        json!({
            "type": "object",
            "properties": {
                "section": {
                    "type": "string",
                    "enum": ["all", "tables", "forms", "headings"],
                    "description": "Which part of the page to return"
                }
            },
            "required": []
        }),
    );

    Tool::new(definition, Arc::new(PageContentExecutor { page }))
}

struct PageContentExecutor {
    page: String,
}

#[async_trait]
impl ToolExecutor for PageContentExecutor {
    async fn execute(&self, args: Value) -> AgentResult<Value> {
        let section = args
            .get("section")
            .and_then(Value::as_str)
            .unwrap_or("all");
        Ok(Value::String(extract_section(&self.page, section)))
    }
}

/// Slice a captured page by its documented section markers.
pub fn extract_section(page: &str, section: &str) -> String {
    match section {
        "tables" => marked_section(page, TABLES_MARKER),
        "forms" => marked_section(page, FORMS_MARKER),
        "headings" => page
            .lines()
            .filter(|line| line.trim_start().starts_with('#'))
            .collect::<Vec<_>>()
            .join("\n"),
        _ => page.to_string(),
    }
}

/// The block starting at `marker` up to the next `--- ` marker line.
fn marked_section(page: &str, marker: &str) -> String {
    let Some(start) = page.find(marker) else {
        return String::new();
    };
    let body = &page[start + marker.len()..];
    let end = body
        .lines()
        .scan(0usize, |offset, line| {
            let line_start = *offset;
            *offset += line.len() + 1;
            Some((line_start, line))
        })
        .find(|(_, line)| line.trim_start().starts_with("--- "))
        .map(|(line_start, _)| line_start)
        .unwrap_or(body.len());
    body[..end].trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = "# Pricing\nIntro text.\n\n--- Data Tables ---\nplan | price\nbasic | 9\n\n--- Form Fields ---\nemail (text)\nsubscribe (checkbox)\n\n## Footnotes\nFine print.";

    #[test]
    fn all_returns_whole_page() {
        assert_eq!(extract_section(PAGE, "all"), PAGE);
    }

    #[test]
    fn tables_stop_at_next_marker() {
        let tables = extract_section(PAGE, "tables");
        assert!(tables.contains("plan | price"));
        assert!(tables.contains("basic | 9"));
        assert!(!tables.contains("email"));
    }

    #[test]
    fn forms_run_to_end_of_marked_block() {
        let forms = extract_section(PAGE, "forms");
        assert!(forms.contains("email (text)"));
        assert!(forms.contains("subscribe (checkbox)"));
        assert!(!forms.contains("plan | price"));
    }

    #[test]
    fn headings_collects_hash_lines() {
        let headings = extract_section(PAGE, "headings");
        assert_eq!(headings, "# Pricing\n## Footnotes");
    }

    #[test]
    fn missing_marker_yields_empty() {
        assert_eq!(extract_section("no markers here", "tables"), "");
    }

    #[tokio::test]
    async fn tool_defaults_to_all() {
        let tool = page_content_tool(PAGE.to_string());
        assert_eq!(tool.name(), PAGE_CONTENT_TOOL);
        let result = tool.executor.execute(serde_json::json!({})).await.unwrap();
        assert_eq!(result, Value::String(PAGE.to_string()));
    }
}
