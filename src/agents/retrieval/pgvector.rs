//! pgvector backend via its REST sidecar

use async_trait::async_trait;
use serde_json::json;
use tracing::warn;

use crate::config::PgvectorSettings;

use super::{Document, RetrievalError, VectorBackend};

/// SQL-extension backend reached through a REST sidecar. Without a configured
/// sidecar URL the backend degrades to empty results.
pub struct PgvectorBackend {
    client: reqwest::Client,
    rest_url: Option<String>,
    table: String,
    min_score: f32,
}

impl PgvectorBackend {
    pub fn new(table: &str, min_score: f32, settings: &PgvectorSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            rest_url: settings
                .rest_url
                .as_ref()
                .map(|u| u.trim_end_matches('/').to_string()),
            table: table.to_string(),
            min_score,
        }
    }
}

#[async_trait]
impl VectorBackend for PgvectorBackend {
    async fn query(&self, embedding: &[f32], top_k: usize) -> Result<Vec<Document>, RetrievalError> {
        let Some(rest_url) = &self.rest_url else {
            warn!(
                table = %self.table,
                "pgvector sidecar URL not configured, returning no documents"
            );
            return Ok(Vec::new());
        };

        let response = self
            .client
            .post(format!("{}/query", rest_url))
            .json(&json!({
                "table": self.table,
                "embedding": embedding,
                "topK": top_k,
                "minScore": self.min_score,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RetrievalError::Backend(format!(
                "sidecar query returned {}: {}",
                status, body
            )));
        }

        response
            .json::<Vec<Document>>()
            .await
            .map_err(|e| RetrievalError::Parse(e.to_string()))
    }
}
