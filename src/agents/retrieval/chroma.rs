//! Chroma vector-store backend

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::ChromaSettings;

use super::{Document, RetrievalError, VectorBackend};

/// HTTP collection backend. Chroma reports distances; they are converted to
/// scores with `1 / (1 + distance)` before the minScore filter applies.
pub struct ChromaBackend {
    client: reqwest::Client,
    base_url: String,
    collection: String,
    min_score: f32,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    ids: Vec<Vec<String>>,
    #[serde(default)]
    documents: Vec<Vec<Option<String>>>,
    #[serde(default)]
    distances: Vec<Vec<f32>>,
    #[serde(default)]
    metadatas: Vec<Vec<Option<Value>>>,
}

impl ChromaBackend {
    pub fn new(collection: &str, min_score: f32, settings: &ChromaSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            collection: collection.to_string(),
            min_score,
        }
    }
}

pub(super) fn score_from_distance(distance: f32) -> f32 {
    1.0 / (1.0 + distance)
}

#[async_trait]
impl VectorBackend for ChromaBackend {
    async fn query(&self, embedding: &[f32], top_k: usize) -> Result<Vec<Document>, RetrievalError> {
        let url = format!(
            "{}/api/v1/collections/{}/query",
            self.base_url, self.collection
        );

        let response = self
            .client
            .post(&url)
            .json(&json!({
                "query_embeddings": [embedding],
                "n_results": top_k,
                "include": ["documents", "metadatas", "distances"],
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RetrievalError::Backend(format!(
                "collection query returned {}: {}",
                status, body
            )));
        }

        let parsed: QueryResponse = response
            .json()
            .await
            .map_err(|e| RetrievalError::Parse(e.to_string()))?;

        // Results arrive as parallel arrays, one inner list per query embedding.
        let ids = parsed.ids.into_iter().next().unwrap_or_default();
        let documents = parsed.documents.into_iter().next().unwrap_or_default();
        let distances = parsed.distances.into_iter().next().unwrap_or_default();
        let metadatas = parsed.metadatas.into_iter().next().unwrap_or_default();

        let mut results = Vec::new();
        for (i, id) in ids.into_iter().enumerate() {
            let distance = distances.get(i).copied().unwrap_or(f32::MAX);
            let score = score_from_distance(distance);
            if score < self.min_score {
                continue;
            }
            results.push(Document {
                id,
                content: documents
                    .get(i)
                    .and_then(|d| d.clone())
                    .unwrap_or_default(),
                score,
                metadata: metadatas.get(i).and_then(|m| m.clone()),
            });
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_zero_is_perfect_score() {
        assert_eq!(score_from_distance(0.0), 1.0);
    }

    #[test]
    fn score_decreases_with_distance() {
        assert!(score_from_distance(0.5) > score_from_distance(1.0));
        assert_eq!(score_from_distance(1.0), 0.5);
        assert!(score_from_distance(9.0) <= 0.1);
    }
}
