//! Declarative agent configuration
//!
//! One JSON object per file in the agent config directory. Field names are
//! camelCase on disk; unknown fields are ignored.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Configuration for a hosted agent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    /// Unique identifier
    pub id: String,
    /// URL segment the agent is mounted under (lowercase, digits, hyphens)
    pub path: String,
    /// Display name
    pub name: String,
    /// Human-readable description
    #[serde(default)]
    pub description: String,
    /// Backing LLM provider
    #[serde(default)]
    pub provider: ProviderKind,
    /// Provider-specific model id; service default applies when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Endpoint details, required for `openai-compatible`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_config: Option<ProviderEndpoint>,
    /// Sampling temperature in [0, 2]; service default applies when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Maximum tokens per completion; service default applies when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// System prompt for the agent
    pub system_prompt: String,
    /// Whether tools (tool sources and delegation) are available at all
    #[serde(default = "default_true")]
    pub enable_tools: bool,
    /// External tool providers this agent connects to
    #[serde(default)]
    pub tool_sources: Vec<ToolSourceConfig>,
    /// Discovery-card settings
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    /// Retrieval-augmented generation settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retrieval: Option<RetrievalConfig>,
    /// Agent-to-agent delegation settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegation: Option<DelegationConfig>,
}

/// Supported LLM provider kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ProviderKind {
    #[default]
    #[serde(rename = "native")]
    Native,
    #[serde(rename = "openai-compatible")]
    OpenAiCompatible,
}

/// Endpoint details for an OpenAI-compatible provider
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderEndpoint {
    pub base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
}

/// Transport used to reach a tool source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolTransport {
    Stdio,
    Sse,
    Http,
}

/// Descriptor for one external tool provider
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSourceConfig {
    /// Unique id, used to prefix translated tool names
    pub id: String,
    pub transport: ToolTransport,
    /// Command to spawn (stdio)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Arguments for the spawned command (stdio)
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment for the spawned command (stdio)
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Endpoint URL (sse/http)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Extra request headers (sse/http)
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Per-request timeout
    #[serde(default = "default_source_timeout")]
    pub timeout_seconds: u64,
}

fn default_source_timeout() -> u64 {
    30
}

/// Discovery-card settings for one agent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryConfig {
    #[serde(default = "default_true")]
    pub discoverable: bool,
    #[serde(default)]
    pub capabilities: Vec<CapabilityConfig>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            discoverable: true,
            capabilities: Vec::new(),
        }
    }
}

/// A capability advertised on discovery cards
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityConfig {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Vector store backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalProvider {
    Pinecone,
    Chroma,
    Pgvector,
}

/// Retrieval-augmented generation settings for one agent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub provider: RetrievalProvider,
    /// Index / collection / table name, depending on the backend
    pub index: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub min_score: f32,
    /// Template for the injected context block; must contain `{{context}}`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_template: Option<String>,
}

fn default_top_k() -> usize {
    5
}

/// Agent-to-agent delegation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub targets: Vec<DelegationTarget>,
}

/// One delegation target exposed as a tool
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegationTarget {
    /// Registry path of the target agent
    pub agent_path: String,
    /// Tool name shown to the model; unique within the agent
    pub tool_name: String,
    pub description: String,
}

fn default_true() -> bool {
    true
}

impl AgentConfig {
    /// Validate invariants that serde defaults cannot express. Returns the
    /// first violation found.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("id must not be empty".to_string());
        }
        if self.path.is_empty()
            || !self
                .path
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(format!(
                "path '{}' must match ^[a-z0-9-]+$",
                self.path
            ));
        }
        if self.system_prompt.trim().is_empty() {
            return Err("systemPrompt must not be empty".to_string());
        }
        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(format!("temperature {} out of range [0, 2]", t));
            }
        }
        if self.max_tokens == Some(0) {
            return Err("maxTokens must be greater than zero".to_string());
        }
        if self.provider == ProviderKind::OpenAiCompatible {
            match &self.provider_config {
                Some(pc) if !pc.base_url.trim().is_empty() => {}
                _ => {
                    return Err(
                        "providerConfig.baseUrl is required for openai-compatible agents"
                            .to_string(),
                    )
                }
            }
        }

        for source in &self.tool_sources {
            if source.id.trim().is_empty() {
                return Err("toolSources[].id must not be empty".to_string());
            }
            match source.transport {
                ToolTransport::Stdio => {
                    if source.command.as_deref().map_or(true, |c| c.trim().is_empty()) {
                        return Err(format!(
                            "tool source '{}' uses stdio but has no command",
                            source.id
                        ));
                    }
                }
                ToolTransport::Sse | ToolTransport::Http => {
                    if source.url.as_deref().map_or(true, |u| u.trim().is_empty()) {
                        return Err(format!(
                            "tool source '{}' uses {:?} but has no url",
                            source.id, source.transport
                        ));
                    }
                }
            }
        }

        if let Some(retrieval) = &self.retrieval {
            if retrieval.index.trim().is_empty() {
                return Err("retrieval.index must not be empty".to_string());
            }
            if retrieval.top_k < 1 {
                return Err("retrieval.topK must be at least 1".to_string());
            }
            if !(0.0..=1.0).contains(&retrieval.min_score) {
                return Err(format!(
                    "retrieval.minScore {} out of range [0, 1]",
                    retrieval.min_score
                ));
            }
            if let Some(template) = &retrieval.context_template {
                if !template.contains("{{context}}") {
                    return Err(
                        "retrieval.contextTemplate must contain the {{context}} token".to_string(),
                    );
                }
            }
        }

        if let Some(delegation) = &self.delegation {
            let mut seen = std::collections::HashSet::new();
            for target in &delegation.targets {
                if target.agent_path.trim().is_empty() || target.tool_name.trim().is_empty() {
                    return Err(
                        "delegation targets need both agentPath and toolName".to_string()
                    );
                }
                if !seen.insert(target.tool_name.as_str()) {
                    return Err(format!(
                        "delegation tool name '{}' is declared twice",
                        target.tool_name
                    ));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal(path: &str) -> AgentConfig {
        serde_json::from_value(serde_json::json!({
            "id": "agent-1",
            "path": path,
            "name": "Agent",
            "systemPrompt": "You are helpful."
        }))
        .unwrap()
    }

    #[test]
    fn minimal_config_parses_with_defaults() {
        let config = minimal("sales");
        assert!(config.validate().is_ok());
        assert_eq!(config.provider, ProviderKind::Native);
        assert!(config.enable_tools);
        assert!(config.discovery.discoverable);
        assert!(config.model.is_none());
    }

    #[test]
    fn rejects_bad_paths() {
        for path in ["", "Sales", "sales agent", "sales/eu", "sales_eu"] {
            assert!(minimal(path).validate().is_err(), "path {:?}", path);
        }
        assert!(minimal("sales-eu-2").validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_sampling() {
        let mut config = minimal("sales");
        config.temperature = Some(2.5);
        assert!(config.validate().is_err());
        config.temperature = Some(2.0);
        assert!(config.validate().is_ok());
        config.max_tokens = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn openai_compatible_requires_endpoint() {
        let mut config = minimal("sales");
        config.provider = ProviderKind::OpenAiCompatible;
        assert!(config.validate().is_err());
        config.provider_config = Some(ProviderEndpoint {
            base_url: "http://localhost:8000/v1".to_string(),
            api_key: None,
            headers: None,
        });
        assert!(config.validate().is_ok());
    }

    #[test]
    fn tool_sources_need_transport_fields() {
        let mut config = minimal("sales");
        config.tool_sources = vec![serde_json::from_value(serde_json::json!({
            "id": "crm",
            "transport": "stdio"
        }))
        .unwrap()];
        assert!(config.validate().is_err());

        config.tool_sources = vec![serde_json::from_value(serde_json::json!({
            "id": "crm",
            "transport": "http",
            "url": "http://localhost:3001/mcp"
        }))
        .unwrap()];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn retrieval_template_must_carry_token() {
        let mut config = minimal("sales");
        config.retrieval = Some(serde_json::from_value(serde_json::json!({
            "provider": "chroma",
            "index": "docs",
            "contextTemplate": "Context goes here"
        }))
        .unwrap());
        assert!(config.validate().is_err());

        config.retrieval = Some(serde_json::from_value(serde_json::json!({
            "provider": "chroma",
            "index": "docs",
            "contextTemplate": "## Docs\n\n{{context}}"
        }))
        .unwrap());
        assert!(config.validate().is_ok());
        assert_eq!(config.retrieval.as_ref().unwrap().top_k, 5);
    }

    #[test]
    fn duplicate_delegation_tool_names_rejected() {
        let mut config = minimal("orchestrator");
        config.delegation = Some(serde_json::from_value(serde_json::json!({
            "targets": [
                { "agentPath": "sales", "toolName": "askSales", "description": "Ask sales" },
                { "agentPath": "support", "toolName": "askSales", "description": "Ask support" }
            ]
        }))
        .unwrap());
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let config: AgentConfig = serde_json::from_value(serde_json::json!({
            "id": "agent-1",
            "path": "sales",
            "name": "Agent",
            "systemPrompt": "S",
            "someFutureField": { "nested": true }
        }))
        .unwrap();
        assert!(config.validate().is_ok());
    }
}
