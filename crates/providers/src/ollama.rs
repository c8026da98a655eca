//! Ollama embedding provider.
//!
//! Calls the native `POST /api/embeddings` endpoint, one prompt per request,
//! so every Ollama release that can serve an embedding model works.

use async_trait::async_trait;
use parley_core::embedding::TextEmbedder;
use parley_core::error::EmbedError;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default Ollama endpoint.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Default embedding model.
pub const DEFAULT_OLLAMA_MODEL: &str = "nomic-embed-text";

/// An embedder backed by a local (or remote) Ollama server.
pub struct OllamaEmbedder {
    name: String,
    base_url: String,
    model: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

impl OllamaEmbedder {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        let model = model.into();
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            name: format!("ollama/{model}"),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model,
            client,
        }
    }

    /// `nomic-embed-text` on `localhost:11434`.
    pub fn local() -> Self {
        Self::new(DEFAULT_OLLAMA_URL, DEFAULT_OLLAMA_MODEL)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn embed_prompt(&self, prompt: &str) -> Result<Vec<f32>, EmbedError> {
        let url = format!("{}/api/embeddings", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&EmbeddingRequest {
                model: &self.model,
                prompt,
            })
            .send()
            .await
            .map_err(|e| EmbedError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            return Err(EmbedError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbedError::InvalidResponse(e.to_string()))?;

        if parsed.embedding.is_empty() {
            return Err(EmbedError::InvalidResponse(format!(
                "model '{}' returned an empty embedding",
                self.model
            )));
        }

        Ok(parsed.embedding)
    }
}

impl Default for OllamaEmbedder {
    fn default() -> Self {
        Self::local()
    }
}

#[async_trait]
impl TextEmbedder for OllamaEmbedder {
    fn name(&self) -> &str {
        &self.name
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        debug!(embedder = %self.name, count = texts.len(), "Embedding texts");

        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed_prompt(text).await?);
        }
        Ok(vectors)
    }
}
