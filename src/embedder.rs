//! Embedding model boundary.
//!
//! The store owns an `Embedder` so queries can be embedded internally.
//! The concrete adapter speaks the OpenAI-compatible `/v1/embeddings`
//! protocol served by local runtimes (llama.cpp server, LM Studio,
//! Ollama).

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::errors::RagError;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Identity of the embedding model; vectors from different models
    /// live in incompatible spaces.
    fn model_id(&self) -> &str;

    /// Fixed output dimensionality for this model.
    fn dimension(&self) -> usize;

    /// Embed `texts` as one batch, one vector per input in input order.
    /// All-or-nothing: a failed batch returns an error, never a
    /// partial result.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError>;
}

pub struct HttpEmbedder {
    base_url: String,
    model: String,
    dimension: usize,
    client: Client,
}

impl HttpEmbedder {
    pub fn new(base_url: &str, model: &str, dimension: usize) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            dimension,
            client: Client::new(),
        }
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/v1/embeddings", self.base_url);
        let body = json!({
            "model": self.model,
            "input": texts,
        });

        let res = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| RagError::EmbeddingFailed(e.to_string()))?;

        if !res.status().is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(RagError::EmbeddingFailed(format!(
                "embedding endpoint error: {text}"
            )));
        }

        let payload: Value = res
            .json()
            .await
            .map_err(|e| RagError::EmbeddingFailed(e.to_string()))?;

        let mut embeddings = Vec::with_capacity(texts.len());
        if let Some(data) = payload["data"].as_array() {
            for item in data {
                if let Some(vals) = item["embedding"].as_array() {
                    let vec: Vec<f32> = vals
                        .iter()
                        .filter_map(|v| v.as_f64().map(|f| f as f32))
                        .collect();
                    embeddings.push(vec);
                }
            }
        }

        // One vector per input or the whole batch is rejected.
        if embeddings.len() != texts.len() {
            return Err(RagError::EmbeddingFailed(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                embeddings.len()
            )));
        }

        Ok(embeddings)
    }
}
