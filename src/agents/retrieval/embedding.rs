//! Embedding client for the native embedding service

use std::env;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use crate::config::EmbeddingSettings;

use super::RetrievalError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for the text-embedding endpoint
#[derive(Clone)]
pub struct EmbeddingClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

impl EmbeddingClient {
    pub fn new(settings: &EmbeddingSettings) -> Result<Self, RetrievalError> {
        let api_key = settings
            .api_key
            .clone()
            .or_else(|| env::var("GEMINI_API_KEY").ok())
            .ok_or_else(|| {
                RetrievalError::Embedding(
                    "embedding API key not configured (retrieval.embedding.apiKey or GEMINI_API_KEY)"
                        .to_string(),
                )
            })?;

        Ok(Self {
            client: reqwest::Client::new(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            api_key,
        })
    }

    /// Embed a query string. Failure here fails the whole retrieval.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError> {
        let url = format!(
            "{}/models/{}:embedContent?key={}",
            self.base_url, self.model, self.api_key
        );

        let response = self
            .client
            .post(&url)
            .timeout(REQUEST_TIMEOUT)
            .json(&json!({
                "content": { "parts": [{ "text": text }] }
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RetrievalError::Embedding(format!(
                "embedding service returned {}: {}",
                status, body
            )));
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| RetrievalError::Parse(e.to_string()))?;

        Ok(parsed.embedding.values)
    }
}
