//! Pinecone vector-store backend

use std::env;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::OnceCell;

use crate::config::PineconeSettings;

use super::{Document, RetrievalError, VectorBackend};

/// Namespace-aware cloud backend. The index host is resolved through the
/// control plane on first use and cached for the connection's lifetime.
pub struct PineconeBackend {
    client: reqwest::Client,
    api_key: String,
    control_url: String,
    index: String,
    namespace: Option<String>,
    host: OnceCell<String>,
}

#[derive(Debug, Deserialize)]
struct DescribeIndexResponse {
    host: String,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<Match>,
}

#[derive(Debug, Deserialize)]
struct Match {
    id: String,
    score: f32,
    metadata: Option<Value>,
}

impl PineconeBackend {
    pub fn new(
        index: &str,
        namespace: Option<String>,
        settings: &PineconeSettings,
    ) -> Result<Self, RetrievalError> {
        let api_key = settings
            .api_key
            .clone()
            .or_else(|| env::var("PINECONE_API_KEY").ok())
            .ok_or_else(|| {
                RetrievalError::Backend(
                    "pinecone API key not configured (retrieval.pinecone.apiKey or PINECONE_API_KEY)"
                        .to_string(),
                )
            })?;

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            control_url: settings.control_url.trim_end_matches('/').to_string(),
            index: index.to_string(),
            namespace,
            host: OnceCell::new(),
        })
    }

    async fn resolve_host(&self) -> Result<&String, RetrievalError> {
        self.host
            .get_or_try_init(|| async {
                let url = format!("{}/indexes/{}", self.control_url, self.index);
                let response = self
                    .client
                    .get(&url)
                    .header("Api-Key", &self.api_key)
                    .send()
                    .await?;

                let status = response.status();
                if !status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    return Err(RetrievalError::Backend(format!(
                        "describe index '{}' returned {}: {}",
                        self.index, status, body
                    )));
                }

                let described: DescribeIndexResponse = response
                    .json()
                    .await
                    .map_err(|e| RetrievalError::Parse(e.to_string()))?;
                Ok(described.host)
            })
            .await
    }
}

#[async_trait]
impl VectorBackend for PineconeBackend {
    async fn query(&self, embedding: &[f32], top_k: usize) -> Result<Vec<Document>, RetrievalError> {
        let host = self.resolve_host().await?;

        let mut body = json!({
            "vector": embedding,
            "topK": top_k,
            "includeMetadata": true,
        });
        if let Some(namespace) = &self.namespace {
            body["namespace"] = json!(namespace);
        }

        let response = self
            .client
            .post(format!("https://{}/query", host))
            .header("Api-Key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(RetrievalError::Backend(format!(
                "query returned {}: {}",
                status, text
            )));
        }

        let parsed: QueryResponse = response
            .json()
            .await
            .map_err(|e| RetrievalError::Parse(e.to_string()))?;

        Ok(parsed
            .matches
            .into_iter()
            .map(|m| {
                let content = m
                    .metadata
                    .as_ref()
                    .and_then(|meta| {
                        meta.get("content")
                            .or_else(|| meta.get("text"))
                            .and_then(Value::as_str)
                    })
                    .unwrap_or_default()
                    .to_string();
                Document {
                    id: m.id,
                    content,
                    score: m.score,
                    metadata: m.metadata,
                }
            })
            .collect())
    }
}
