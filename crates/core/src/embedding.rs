//! TextEmbedder trait — the abstraction over embedding models.
//!
//! An embedder turns text into vectors. It must be deterministic for a fixed
//! model, and every vector it produces for one collection must share a
//! dimensionality. Implementations: Ollama, OpenAI-compatible endpoints,
//! deterministic doubles in tests.

use crate::error::EmbedError;
use async_trait::async_trait;

/// The core TextEmbedder trait.
#[async_trait]
pub trait TextEmbedder: Send + Sync {
    /// A human-readable name for this embedder (e.g., "ollama/nomic-embed-text").
    fn name(&self) -> &str;

    /// Embed every text, returning one vector per input in input order.
    async fn embed(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, EmbedError>;

    /// Embed a single text.
    async fn embed_one(&self, text: &str) -> std::result::Result<Vec<f32>, EmbedError> {
        let mut vectors = self.embed(&[text.to_string()]).await?;
        if vectors.len() != 1 {
            return Err(EmbedError::CountMismatch {
                expected: 1,
                actual: vectors.len(),
            });
        }
        Ok(vectors.remove(0))
    }
}
