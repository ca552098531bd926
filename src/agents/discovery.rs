//! Discovery cards: service- and agent-level capability descriptors
//!
//! The service card advertises one skill per discoverable agent plus one per
//! declared capability (prefixed `<agentId>:<capabilityId>`); agent cards use
//! bare capability ids.

use serde::Serialize;

use crate::agents::config::AgentConfig;
use crate::config::Settings;

pub const PROTOCOL_VERSION: &str = "1.0";

/// A skill advertised on a discovery card
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CardSkill {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Service-level discovery card
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceCard {
    pub name: String,
    pub description: String,
    pub protocol_version: &'static str,
    pub version: &'static str,
    pub url: String,
    pub skills: Vec<CardSkill>,
}

/// Per-agent discovery card
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCard {
    pub name: String,
    pub description: String,
    pub protocol_version: &'static str,
    pub version: &'static str,
    pub url: String,
    pub skills: Vec<CardSkill>,
}

/// Build the service card from the loaded configs.
pub fn service_card(configs: &[AgentConfig], settings: &Settings) -> ServiceCard {
    let mut skills = Vec::new();

    for config in configs {
        if !config.discovery.discoverable {
            continue;
        }
        skills.push(CardSkill {
            id: config.id.clone(),
            name: config.name.clone(),
            description: Some(config.description.clone()),
        });
        for capability in &config.discovery.capabilities {
            skills.push(CardSkill {
                id: format!("{}:{}", config.id, capability.id),
                name: capability.name.clone().unwrap_or_else(|| capability.id.clone()),
                description: capability.description.clone(),
            });
        }
    }

    ServiceCard {
        name: settings.service.name.clone(),
        description: settings.service.description.clone(),
        protocol_version: PROTOCOL_VERSION,
        version: env!("CARGO_PKG_VERSION"),
        url: settings.service.public_url.trim_end_matches('/').to_string(),
        skills,
    }
}

/// Build the card for one agent; `None` for unknown or non-discoverable
/// paths.
pub fn agent_card(configs: &[AgentConfig], path: &str, settings: &Settings) -> Option<AgentCard> {
    let config = configs.iter().find(|c| c.path == path)?;
    if !config.discovery.discoverable {
        return None;
    }

    let base = settings.service.public_url.trim_end_matches('/');
    let skills = config
        .discovery
        .capabilities
        .iter()
        .map(|capability| CardSkill {
            id: capability.id.clone(),
            name: capability.name.clone().unwrap_or_else(|| capability.id.clone()),
            description: capability.description.clone(),
        })
        .collect();

    Some(AgentCard {
        name: config.name.clone(),
        description: config.description.clone(),
        protocol_version: PROTOCOL_VERSION,
        version: env!("CARGO_PKG_VERSION"),
        url: format!("{}/agents/{}", base, config.path),
        skills,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;

    fn configs() -> Vec<AgentConfig> {
        vec![
            serde_json::from_value(serde_json::json!({
                "id": "sales-1",
                "path": "sales",
                "name": "Sales",
                "description": "Answers pricing questions",
                "systemPrompt": "S",
                "discovery": {
                    "capabilities": [
                        { "id": "quotes", "name": "Quoting", "description": "Produce quotes" }
                    ]
                }
            }))
            .unwrap(),
            serde_json::from_value(serde_json::json!({
                "id": "internal-1",
                "path": "internal",
                "name": "Internal",
                "systemPrompt": "S",
                "discovery": { "discoverable": false }
            }))
            .unwrap(),
        ]
    }

    fn settings() -> Settings {
        let mut settings = Settings::default();
        settings.service.public_url = "http://example.test/".to_string();
        settings
    }

    #[test]
    fn service_card_prefixes_capability_skills() {
        let card = service_card(&configs(), &settings());
        assert_eq!(card.protocol_version, "1.0");
        assert_eq!(card.url, "http://example.test");

        let ids: Vec<_> = card.skills.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["sales-1", "sales-1:quotes"]);
    }

    #[test]
    fn agent_card_uses_bare_capability_ids() {
        let card = agent_card(&configs(), "sales", &settings()).unwrap();
        assert_eq!(card.url, "http://example.test/agents/sales");
        assert_eq!(card.skills.len(), 1);
        assert_eq!(card.skills[0].id, "quotes");
    }

    #[test]
    fn hidden_and_unknown_agents_get_no_card() {
        assert!(agent_card(&configs(), "internal", &settings()).is_none());
        assert!(agent_card(&configs(), "nope", &settings()).is_none());
    }
}
