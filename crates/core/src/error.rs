//! Error types for the Parley domain.
//!
//! Uses `thiserror` for ergonomic error definitions. The top-level [`Error`]
//! is what callers branch on; the collaborator errors ([`IndexError`],
//! [`EmbedError`]) stay behind the trait boundaries and are wrapped with the
//! failing operation and its target before they reach a caller.

use std::path::PathBuf;
use thiserror::Error;

/// The top-level error type for all Parley operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Vector index lifecycle ---
    #[error("Failed to open vector index at {path}: {reason}")]
    StoreInit { path: String, reason: String },

    #[error("Collection '{collection}' unavailable: {reason}")]
    CollectionAccess { collection: String, reason: String },

    // --- Caller input ---
    #[error("Invalid input: {0}")]
    Validation(String),

    // --- Vector index data path ---
    #[error("Write to collection '{collection}' failed: {reason}")]
    Write { collection: String, reason: String },

    #[error("Query on collection '{collection}' failed: {reason}")]
    Query { collection: String, reason: String },

    // --- Transcript store ---
    #[error("Failed to parse transcript at {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("Failed to write transcript at {path}: {reason}")]
    Io { path: PathBuf, reason: String },
}

impl Error {
    /// Whether the failure is transient and the caller may retry with backoff.
    ///
    /// Only index writes and queries qualify; everything else needs different
    /// input or operator attention.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Write { .. } | Self::Query { .. })
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Collaborator errors ---

/// Failures raised by a [`crate::index::VectorIndex`] engine.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Collection already exists: {0}")]
    CollectionExists(String),

    #[error("Embedding dimension mismatch: collection expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

/// Failures raised by a [`crate::embedding::TextEmbedder`].
#[derive(Debug, Clone, Error)]
pub enum EmbedError {
    #[error("Embedding API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("Embedder returned {actual} vectors for {expected} inputs")]
    CountMismatch { expected: usize, actual: usize },

    #[error("Embedder not configured: {0}")]
    NotConfigured(String),
}
