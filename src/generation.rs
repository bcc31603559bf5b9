//! Generation service boundary.
//!
//! The language model is an opaque text-completion service: a
//! one-shot `complete` for summarization and a token stream for
//! answers. The concrete adapter speaks the OpenAI-compatible chat
//! protocol with SSE streaming.

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::errors::RagError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Availability {
    Available,
    Unavailable(String),
}

#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Cheap probe; callers fail fast on `Unavailable` instead of
    /// issuing a doomed generation call.
    async fn availability(&self) -> Availability;

    /// One-shot completion, used for summarization calls.
    async fn complete(&self, prompt: &str) -> Result<String, RagError>;

    /// Streamed completion; the receiver yields token fragments until
    /// the stream ends or an error is delivered.
    async fn stream_complete(
        &self,
        prompt: &str,
    ) -> Result<mpsc::Receiver<Result<String, RagError>>, RagError>;
}

pub struct HttpGenerationService {
    base_url: String,
    model: String,
    client: Client,
}

impl HttpGenerationService {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client: Client::new(),
        }
    }

    fn chat_body(&self, prompt: &str, stream: bool) -> Value {
        json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "stream": stream,
        })
    }
}

#[async_trait]
impl GenerationService for HttpGenerationService {
    async fn availability(&self) -> Availability {
        let url = format!("{}/v1/models", self.base_url);
        match self.client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => Availability::Available,
            Ok(resp) => Availability::Unavailable(format!("status {}", resp.status())),
            Err(e) => Availability::Unavailable(e.to_string()),
        }
    }

    async fn complete(&self, prompt: &str) -> Result<String, RagError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let res = self
            .client
            .post(&url)
            .json(&self.chat_body(prompt, false))
            .send()
            .await
            .map_err(|e| RagError::BackendUnavailable(e.to_string()))?;

        if !res.status().is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(RagError::Internal(format!("completion error: {text}")));
        }

        let payload: Value = res.json().await.map_err(RagError::internal)?;
        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string();

        Ok(content)
    }

    async fn stream_complete(
        &self,
        prompt: &str,
    ) -> Result<mpsc::Receiver<Result<String, RagError>>, RagError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let res = self
            .client
            .post(&url)
            .json(&self.chat_body(prompt, true))
            .send()
            .await
            .map_err(|e| RagError::BackendUnavailable(e.to_string()))?;

        if !res.status().is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(RagError::Internal(format!("stream error: {text}")));
        }

        let (tx, rx) = mpsc::channel(32);
        let mut stream = res.bytes_stream();

        tokio::spawn(async move {
            while let Some(item) = stream.next().await {
                match item {
                    Ok(bytes) => {
                        let chunk_str = String::from_utf8_lossy(&bytes);
                        for line in chunk_str.lines() {
                            let line = line.trim();
                            if line.is_empty() {
                                continue;
                            }
                            if line == "data: [DONE]" {
                                return;
                            }

                            if let Some(data) = line.strip_prefix("data: ") {
                                if let Ok(json) = serde_json::from_str::<Value>(data) {
                                    if let Some(content) =
                                        json["choices"][0]["delta"]["content"].as_str()
                                    {
                                        if !content.is_empty()
                                            && tx.send(Ok(content.to_string())).await.is_err()
                                        {
                                            return;
                                        }
                                    }
                                }
                            }
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(RagError::internal(e))).await;
                        return;
                    }
                }
            }
        });

        Ok(rx)
    }
}
