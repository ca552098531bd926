//! Agent registry: load configs from a directory, own the runtime agents
//!
//! Agents are created lazily (`initialized = false`) so startup stays fast
//! and unreachable tool sources do not block the service. The registry map is
//! read-mostly; writes happen only during load and shutdown.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::agents::config::AgentConfig;
use crate::agents::error::{AgentError, AgentResult};
use crate::agents::llm::{default_provider_factory, ProviderFactory};
use crate::agents::runtime::RuntimeAgent;
use crate::config::Settings;

/// Metadata projection suitable for public discovery
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSummary {
    pub path: String,
    pub id: String,
    pub name: String,
    pub description: String,
}

/// Owner of all runtime agents, keyed by path
pub struct AgentRegistry {
    settings: Arc<Settings>,
    provider_factory: ProviderFactory,
    agents: RwLock<HashMap<String, Arc<RuntimeAgent>>>,
}

impl AgentRegistry {
    pub fn new(settings: Arc<Settings>) -> Arc<Self> {
        Self::with_provider_factory(settings, default_provider_factory())
    }

    /// Construct with a custom provider factory (embedders, tests).
    pub fn with_provider_factory(
        settings: Arc<Settings>,
        provider_factory: ProviderFactory,
    ) -> Arc<Self> {
        Arc::new(Self {
            settings,
            provider_factory,
            agents: RwLock::new(HashMap::new()),
        })
    }

    /// Load every `*.json` agent config under `dir`, replacing the current
    /// registry contents. A missing directory yields an empty registry; a
    /// file that fails to parse or validate, or a duplicate path, is fatal
    /// and names the offending file.
    pub async fn load_all(self: &Arc<Self>, dir: impl AsRef<Path>) -> AgentResult<usize> {
        let dir = dir.as_ref();

        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(dir = %dir.display(), "agent config directory missing, starting empty");
                *self.agents.write().await = HashMap::new();
                return Ok(0);
            }
            Err(e) => {
                return Err(AgentError::Internal(format!(
                    "failed to read agent config directory {}: {}",
                    dir.display(),
                    e
                )))
            }
        };

        let mut loaded: HashMap<String, Arc<RuntimeAgent>> = HashMap::new();

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| AgentError::Internal(e.to_string()))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let file = path.display().to_string();

            let raw = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| AgentError::Config {
                    file: file.clone(),
                    reason: e.to_string(),
                })?;

            let config: AgentConfig =
                serde_json::from_str(&raw).map_err(|e| AgentError::Config {
                    file: file.clone(),
                    reason: e.to_string(),
                })?;

            config.validate().map_err(|reason| AgentError::Config {
                file: file.clone(),
                reason,
            })?;

            if loaded.contains_key(&config.path) {
                return Err(AgentError::Config {
                    file,
                    reason: format!("duplicate agent path '{}'", config.path),
                });
            }

            let agent = Arc::new(RuntimeAgent::new(
                config.clone(),
                self.settings.clone(),
                Arc::downgrade(self),
                self.provider_factory.clone(),
            ));
            loaded.insert(config.path.clone(), agent);
        }

        let count = loaded.len();
        *self.agents.write().await = loaded;
        info!(count, dir = %dir.display(), "agent registry loaded");
        Ok(count)
    }

    /// The runtime agent at `path`.
    pub async fn get(&self, path: &str) -> AgentResult<Arc<RuntimeAgent>> {
        self.agents
            .read()
            .await
            .get(path)
            .cloned()
            .ok_or_else(|| AgentError::NotFound(path.to_string()))
    }

    /// The validated config at `path`, exactly as loaded from disk.
    pub async fn get_config(&self, path: &str) -> AgentResult<AgentConfig> {
        Ok(self.get(path).await?.config().clone())
    }

    pub async fn has(&self, path: &str) -> bool {
        self.agents.read().await.contains_key(path)
    }

    /// All loaded configs, for discovery-card generation.
    pub async fn configs(&self) -> Vec<AgentConfig> {
        let mut configs: Vec<_> = self
            .agents
            .read()
            .await
            .values()
            .map(|a| a.config().clone())
            .collect();
        configs.sort_by(|a, b| a.path.cmp(&b.path));
        configs
    }

    /// Public projection of every agent, ordered by path.
    pub async fn list(&self) -> Vec<AgentSummary> {
        let mut summaries: Vec<_> = self
            .agents
            .read()
            .await
            .values()
            .map(|agent| {
                let config = agent.config();
                AgentSummary {
                    path: config.path.clone(),
                    id: config.id.clone(),
                    name: config.name.clone(),
                    description: config.description.clone(),
                }
            })
            .collect();
        summaries.sort_by(|a, b| a.path.cmp(&b.path));
        summaries
    }

    /// Shut down every agent, logging and swallowing individual failures.
    /// The map is cleared only after all attempts complete.
    pub async fn shutdown_all(&self) {
        let agents: Vec<_> = self.agents.read().await.values().cloned().collect();
        for agent in agents {
            if let Err(e) = agent.shutdown().await {
                warn!(agent = %agent.path(), "shutdown failed: {}", e);
            }
        }
        self.agents.write().await.clear();
        info!("agent registry shut down");
    }
}
