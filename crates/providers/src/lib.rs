//! Embedding provider implementations for Parley.
//!
//! All providers implement the `parley_core::TextEmbedder` trait.
//! [`build_from_config`] selects one from configuration.

pub mod factory;
pub mod ollama;
pub mod openai_compat;

pub use factory::build_from_config;
pub use ollama::OllamaEmbedder;
pub use openai_compat::OpenAiCompatEmbedder;
