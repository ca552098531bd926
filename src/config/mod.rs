//! Service configuration
//!
//! Layered the usual way: `aviary.toml` (optional) is overridden by
//! `AVIARY_*` environment variables, which are overridden by CLI flags.
//! Agent definitions are not part of [`Settings`]; they live as one JSON
//! file per agent under `agents_dir`.

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::cli::Cli;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub service: ServiceSettings,
    pub agents_dir: String,
    pub llm: LlmSettings,
    pub retrieval: RetrievalSettings,
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            service: ServiceSettings::default(),
            agents_dir: "agents".to_string(),
            llm: LlmSettings::default(),
            retrieval: RetrievalSettings::default(),
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Display name on the service discovery card
    pub name: String,
    pub description: String,
    /// Public base URL advertised on discovery cards
    pub public_url: String,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "Aviary".to_string(),
            description: "Multi-tenant agent hosting service".to_string(),
            public_url: "http://localhost:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    /// Model used when an agent config omits one
    pub default_model: String,
    pub default_temperature: f32,
    pub default_max_tokens: u32,
    /// Model invocations allowed per turn; a cost bound, not per-request
    pub max_tool_steps: usize,
    pub native: NativeLlmSettings,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            default_model: "gemini-2.0-flash".to_string(),
            default_temperature: 0.7,
            default_max_tokens: 4096,
            max_tool_steps: crate::agents::runtime::MAX_TOOL_STEPS,
            native: NativeLlmSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NativeLlmSettings {
    /// Falls back to the GEMINI_API_KEY environment variable
    pub api_key: Option<String>,
    pub base_url: String,
}

impl Default for NativeLlmSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RetrievalSettings {
    pub embedding: EmbeddingSettings,
    pub pinecone: PineconeSettings,
    pub chroma: ChromaSettings,
    pub pgvector: PgvectorSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// Falls back to the GEMINI_API_KEY environment variable
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "text-embedding-004".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PineconeSettings {
    /// Falls back to the PINECONE_API_KEY environment variable
    pub api_key: Option<String>,
    pub control_url: String,
}

impl Default for PineconeSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            control_url: "https://api.pinecone.io".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChromaSettings {
    pub base_url: String,
}

impl Default for ChromaSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PgvectorSettings {
    /// REST sidecar URL; without one the backend returns no documents
    pub rest_url: Option<String>,
}

impl Settings {
    /// Load the layered configuration and apply CLI overrides.
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let file = cli.config.as_deref().unwrap_or("aviary");

        let mut settings: Settings = Config::builder()
            .add_source(File::with_name(file).required(false))
            .add_source(Environment::with_prefix("AVIARY").separator("__"))
            .build()?
            .try_deserialize()?;

        if let Some(host) = &cli.host {
            settings.server.host = host.clone();
        }
        if let Some(port) = cli.port {
            settings.server.port = port;
        }
        if let Some(agents_dir) = &cli.agents_dir {
            settings.agents_dir = agents_dir.clone();
        }
        if let Some(public_url) = &cli.public_url {
            settings.service.public_url = public_url.clone();
        }
        if let Some(log_level) = &cli.log_level {
            settings.log_level = log_level.clone();
        }

        Ok(settings)
    }
}
