//! Configuration loading, validation, and management for Parley.
//!
//! Loads configuration from `~/.parley/config.toml` with environment
//! variable overrides. Validates all settings at load time.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.parley/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Memory store configuration
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Embedding provider configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Persistent vector index location
    #[serde(default = "default_library_path")]
    pub library_path: PathBuf,

    /// YAML transcript of every conversation
    #[serde(default = "default_transcript_path")]
    pub transcript_path: PathBuf,

    /// Collection that conversational turns are indexed into
    #[serde(default = "default_collection")]
    pub default_collection: String,

    /// Turns kept in the in-process recency cache
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Turns from the recency cache injected into each prompt
    #[serde(default = "default_recent_turns")]
    pub recent_turns: usize,

    /// Nearest neighbours retrieved per query
    #[serde(default = "default_n_results")]
    pub n_results: usize,
}

fn default_library_path() -> PathBuf {
    AppConfig::config_dir().join("library").join("chroma.db")
}
fn default_transcript_path() -> PathBuf {
    AppConfig::config_dir().join("conversations.yaml")
}
fn default_collection() -> String {
    "conversations".into()
}
fn default_cache_capacity() -> usize {
    20
}
fn default_recent_turns() -> usize {
    5
}
fn default_n_results() -> usize {
    5
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            library_path: default_library_path(),
            transcript_path: default_transcript_path(),
            default_collection: default_collection(),
            cache_capacity: default_cache_capacity(),
            recent_turns: default_recent_turns(),
            n_results: default_n_results(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// "ollama" or "openai" (any OpenAI-compatible endpoint)
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Override the provider's base URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

fn default_embedding_provider() -> String {
    "ollama".into()
}
fn default_embedding_model() -> String {
    "nomic-embed-text".into()
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            api_url: None,
            api_key: None,
        }
    }
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for EmbeddingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_url", &self.api_url)
            .field("api_key", &redact(&self.api_key))
            .finish()
    }
}

/// Embedding providers this build knows how to construct.
pub const KNOWN_PROVIDERS: &[&str] = &["ollama", "openai"];

/// Longest accepted collection name.
pub const MAX_COLLECTION_NAME_LEN: usize = 63;

/// Why `name` is not a valid collection name, or `None` if it is.
///
/// Names are 1-63 characters from `[A-Za-z0-9._-]`.
pub fn collection_name_problem(name: &str) -> Option<String> {
    if name.is_empty() {
        Some("name must not be empty".to_string())
    } else if name.len() > MAX_COLLECTION_NAME_LEN {
        Some(format!(
            "name is {} characters, limit is {MAX_COLLECTION_NAME_LEN}",
            name.len()
        ))
    } else {
        name.chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
            .map(|c| format!("invalid character {c:?}"))
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.parley/config.toml).
    ///
    /// Environment variables override file values:
    /// - `PARLEY_LIBRARY_PATH`, `PARLEY_TRANSCRIPT_PATH`
    /// - `PARLEY_EMBEDDING_MODEL`, `PARLEY_EMBEDDING_URL`
    /// - `PARLEY_API_KEY` (falls back to `OPENAI_API_KEY`)
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup.
    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(path) = var("PARLEY_LIBRARY_PATH") {
            self.memory.library_path = PathBuf::from(path);
        }
        if let Some(path) = var("PARLEY_TRANSCRIPT_PATH") {
            self.memory.transcript_path = PathBuf::from(path);
        }
        if let Some(model) = var("PARLEY_EMBEDDING_MODEL") {
            self.embedding.model = model;
        }
        if let Some(url) = var("PARLEY_EMBEDDING_URL") {
            self.embedding.api_url = Some(url);
        }
        if self.embedding.api_key.is_none() {
            self.embedding.api_key = var("PARLEY_API_KEY").or_else(|| var("OPENAI_API_KEY"));
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".parley")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.memory.cache_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "memory.cache_capacity must be > 0".into(),
            ));
        }

        if self.memory.n_results == 0 {
            return Err(ConfigError::ValidationError(
                "memory.n_results must be > 0".into(),
            ));
        }

        if self.memory.recent_turns > self.memory.cache_capacity {
            return Err(ConfigError::ValidationError(format!(
                "memory.recent_turns ({}) cannot exceed memory.cache_capacity ({})",
                self.memory.recent_turns, self.memory.cache_capacity
            )));
        }

        if let Some(problem) = collection_name_problem(&self.memory.default_collection) {
            return Err(ConfigError::ValidationError(format!(
                "memory.default_collection '{}': {problem}",
                self.memory.default_collection
            )));
        }

        if !KNOWN_PROVIDERS.contains(&self.embedding.provider.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "unknown embedding.provider '{}' (expected one of: {})",
                self.embedding.provider,
                KNOWN_PROVIDERS.join(", ")
            )));
        }

        Ok(())
    }

    /// Render the default configuration as TOML.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
