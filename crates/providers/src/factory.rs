//! Embedder factory: builds the configured `TextEmbedder`.

use crate::ollama::{DEFAULT_OLLAMA_URL, OllamaEmbedder};
use crate::openai_compat::OpenAiCompatEmbedder;
use parley_config::EmbeddingConfig;
use parley_core::embedding::TextEmbedder;
use parley_core::error::EmbedError;
use std::sync::Arc;

const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";

/// Build an embedder from configuration.
///
/// `openai` requires an API key unless a custom `api_url` is set (local
/// OpenAI-compatible servers usually run without one).
pub fn build_from_config(config: &EmbeddingConfig) -> Result<Arc<dyn TextEmbedder>, EmbedError> {
    match config.provider.as_str() {
        "ollama" => {
            let url = config.api_url.as_deref().unwrap_or(DEFAULT_OLLAMA_URL);
            Ok(Arc::new(OllamaEmbedder::new(url, config.model.clone())))
        }
        "openai" => {
            let api_key = config.api_key.clone().unwrap_or_default();
            if api_key.is_empty() && config.api_url.is_none() {
                return Err(EmbedError::NotConfigured(
                    "openai embeddings need embedding.api_key or PARLEY_API_KEY".into(),
                ));
            }
            let url = config.api_url.as_deref().unwrap_or(DEFAULT_OPENAI_URL);
            Ok(Arc::new(OpenAiCompatEmbedder::new(url, api_key, config.model.clone())))
        }
        other => Err(EmbedError::NotConfigured(format!(
            "unknown embedding provider '{other}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_ollama_by_default() {
        let embedder = build_from_config(&EmbeddingConfig::default()).unwrap();
        assert_eq!(embedder.name(), "ollama/nomic-embed-text");
    }

    #[test]
    fn openai_without_key_is_not_configured() {
        let config = EmbeddingConfig {
            provider: "openai".into(),
            model: "text-embedding-3-small".into(),
            api_url: None,
            api_key: None,
        };
        let err = build_from_config(&config).err().unwrap();
        assert!(matches!(err, EmbedError::NotConfigured(_)));
    }

    #[test]
    fn openai_compatible_local_server_needs_no_key() {
        let config = EmbeddingConfig {
            provider: "openai".into(),
            model: "bge-small".into(),
            api_url: Some("http://localhost:8080/v1".into()),
            api_key: None,
        };
        let embedder = build_from_config(&config).unwrap();
        assert_eq!(embedder.name(), "openai/bge-small");
    }

    #[test]
    fn unknown_provider_rejected() {
        let config = EmbeddingConfig {
            provider: "telepathy".into(),
            ..EmbeddingConfig::default()
        };
        assert!(build_from_config(&config).is_err());
    }
}
