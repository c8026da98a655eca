//! OpenAI-compatible embedding provider.
//!
//! Works with: OpenAI, OpenRouter, vLLM, LM Studio, Together AI, and any
//! endpoint exposing `POST /v1/embeddings`.

use async_trait::async_trait;
use parley_core::embedding::TextEmbedder;
use parley_core::error::EmbedError;
use serde::Deserialize;
use tracing::debug;

/// An embedder backed by an OpenAI-compatible `/embeddings` endpoint.
pub struct OpenAiCompatEmbedder {
    name: String,
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiCompatEmbedder {
    /// Create a new OpenAI-compatible embedder.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let model = model.into();
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            name: format!("openai/{model}"),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model,
            client,
        }
    }

    /// Create an OpenAI embedder (convenience constructor).
    pub fn openai(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::new("https://api.openai.com/v1", api_key, model)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Order embeddings by their `index` field and check the count.
    fn collect_embeddings(
        response: EmbeddingApiResponse,
        expected: usize,
    ) -> Result<Vec<Vec<f32>>, EmbedError> {
        let mut data = response.data;
        data.sort_by_key(|d| d.index);

        if data.len() != expected {
            return Err(EmbedError::CountMismatch {
                expected,
                actual: data.len(),
            });
        }

        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl TextEmbedder for OpenAiCompatEmbedder {
    fn name(&self) -> &str {
        &self.name
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/embeddings", self.base_url);

        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
            "encoding_format": "float",
        });

        debug!(
            embedder = %self.name,
            count = texts.len(),
            "Sending embedding request"
        );

        let mut request = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body);
        if !self.api_key.is_empty() {
            request = request.header("Authorization", format!("Bearer {}", self.api_key));
        }

        let response = request
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

        let api_resp: EmbeddingApiResponse = response
            .json()
            .await
            .map_err(|e| EmbedError::InvalidResponse(e.to_string()))?;

        if let Some(usage) = &api_resp.usage {
            debug!(
                model = %api_resp.model,
                prompt_tokens = usage.prompt_tokens,
                total_tokens = usage.total_tokens,
                "Embedding usage"
            );
        }

        Self::collect_embeddings(api_resp, texts.len())
    }
}

// --- Embedding API types ---

#[derive(Debug, Deserialize)]
struct EmbeddingApiResponse {
    data: Vec<EmbeddingData>,
    #[serde(default)]
    model: String,
    usage: Option<EmbeddingApiUsage>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

#[derive(Debug, Deserialize)]
struct EmbeddingApiUsage {
    prompt_tokens: u32,
    total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructor_trims_trailing_slash() {
        let e = OpenAiCompatEmbedder::new("http://localhost:8000/v1/", "", "bge-small");
        assert_eq!(e.base_url(), "http://localhost:8000/v1");
        assert_eq!(e.name(), "openai/bge-small");
    }

    #[test]
    fn openai_convenience_constructor() {
        let e = OpenAiCompatEmbedder::openai("sk-test", "text-embedding-3-small");
        assert_eq!(e.base_url(), "https://api.openai.com/v1");
        assert_eq!(e.model(), "text-embedding-3-small");
    }

    #[test]
    fn parse_and_order_embedding_response() {
        let data = r#"{
            "data": [
                {"embedding": [0.4, 0.5, 0.6], "index": 1},
                {"embedding": [0.1, 0.2, 0.3], "index": 0}
            ],
            "model": "text-embedding-3-small",
            "usage": {"prompt_tokens": 8, "total_tokens": 8}
        }"#;
        let parsed: EmbeddingApiResponse = serde_json::from_str(data).unwrap();
        assert_eq!(parsed.usage.as_ref().unwrap().prompt_tokens, 8);

        let vectors = OpenAiCompatEmbedder::collect_embeddings(parsed, 2).unwrap();
        assert_eq!(vectors[0], vec![0.1, 0.2, 0.3]);
        assert_eq!(vectors[1], vec![0.4, 0.5, 0.6]);
    }

    #[test]
    fn short_response_is_count_mismatch() {
        let data = r#"{"data": [{"embedding": [1.0], "index": 0}], "model": "m"}"#;
        let parsed: EmbeddingApiResponse = serde_json::from_str(data).unwrap();
        let err = OpenAiCompatEmbedder::collect_embeddings(parsed, 3).unwrap_err();
        assert!(matches!(err, EmbedError::CountMismatch { expected: 3, actual: 1 }));
    }

    #[tokio::test]
    async fn empty_input_skips_request() {
        // Unroutable URL: any network call would fail
        let e = OpenAiCompatEmbedder::new("http://127.0.0.1:9", "", "m");
        assert!(e.embed(&[]).await.unwrap().is_empty());
    }
}
