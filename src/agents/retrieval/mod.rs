//! Retrieval client: embed a query, search a vector store, format context
//!
//! Three backends are supported behind the [`VectorBackend`] trait. Retrieval
//! failures never fail a user turn; the runtime logs and falls back to the
//! base system prompt.

mod chroma;
mod embedding;
mod pgvector;
mod pinecone;

pub use chroma::ChromaBackend;
pub use embedding::EmbeddingClient;
pub use pgvector::PgvectorBackend;
pub use pinecone::PineconeBackend;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::agents::config::{RetrievalConfig, RetrievalProvider};
use crate::config::RetrievalSettings;

/// Separator between documents in the injected context block.
pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Header used when no context template is configured.
pub const DEFAULT_CONTEXT_HEADER: &str = "## Relevant Context:\n\n";

/// Errors from embedding or vector-store operations
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("embedding request failed: {0}")]
    Embedding(String),

    #[error("vector store error: {0}")]
    Backend(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("parse error: {0}")]
    Parse(String),
}

/// A scored document returned from a vector store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub content: String,
    pub score: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// Query side of a vector store
#[async_trait]
pub trait VectorBackend: Send + Sync {
    async fn query(&self, embedding: &[f32], top_k: usize) -> Result<Vec<Document>, RetrievalError>;
}

/// Per-agent retrieval client binding an embedder and one backend
pub struct RetrievalClient {
    config: RetrievalConfig,
    embedder: EmbeddingClient,
    backend: Box<dyn VectorBackend>,
}

impl RetrievalClient {
    /// Build the client for the configured backend.
    pub fn build(
        config: &RetrievalConfig,
        settings: &RetrievalSettings,
    ) -> Result<Self, RetrievalError> {
        let backend: Box<dyn VectorBackend> = match config.provider {
            RetrievalProvider::Pinecone => Box::new(PineconeBackend::new(
                &config.index,
                config.namespace.clone(),
                &settings.pinecone,
            )?),
            RetrievalProvider::Chroma => Box::new(ChromaBackend::new(
                &config.index,
                config.min_score,
                &settings.chroma,
            )),
            RetrievalProvider::Pgvector => Box::new(PgvectorBackend::new(
                &config.index,
                config.min_score,
                &settings.pgvector,
            )),
        };

        Ok(Self {
            config: config.clone(),
            embedder: EmbeddingClient::new(&settings.embedding)?,
            backend,
        })
    }

    /// Construct from preexisting parts.
    pub fn new(
        config: RetrievalConfig,
        embedder: EmbeddingClient,
        backend: Box<dyn VectorBackend>,
    ) -> Self {
        Self {
            config,
            embedder,
            backend,
        }
    }

    /// Fetch the documents relevant to a query: at most `topK`, all with
    /// `score >= minScore`, in descending score order.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<Document>, RetrievalError> {
        let embedding = self.embedder.embed(query).await?;
        let documents = self.backend.query(&embedding, self.config.top_k).await?;
        Ok(select_documents(
            documents,
            self.config.min_score,
            self.config.top_k,
        ))
    }

    /// Render selected documents into the context block appended to the
    /// system prompt.
    pub fn format_context(&self, documents: &[Document]) -> String {
        render_context(self.config.context_template.as_deref(), documents)
    }
}

/// Join document contents and substitute them into the template, or prepend
/// the default header when none is configured.
pub fn render_context(template: Option<&str>, documents: &[Document]) -> String {
    let joined = documents
        .iter()
        .map(|d| d.content.as_str())
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR);

    match template {
        Some(template) => template.replace("{{context}}", &joined),
        None => format!("{}{}", DEFAULT_CONTEXT_HEADER, joined),
    }
}

/// Score filter, ordering and truncation shared by all backends.
fn select_documents(mut documents: Vec<Document>, min_score: f32, top_k: usize) -> Vec<Document> {
    documents.retain(|d| d.score >= min_score);
    documents.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    documents.truncate(top_k);
    documents
}
