//! # Parley Core
//!
//! Domain types, traits, and error definitions for the Parley conversation
//! memory store. This crate performs **no I/O** — it defines the transcript
//! model and the boundaries that the storage and provider crates implement.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is a trait here:
//! - [`TextEmbedder`] turns text into vectors
//! - [`VectorIndex`] stores and ranks vectors in named collections
//!
//! Implementations live in their respective crates, so tests can swap in
//! deterministic doubles and callers own every instance explicitly.

pub mod error;
pub mod message;
pub mod embedding;
pub mod index;

// Re-export key types at crate root for ergonomics
pub use error::{EmbedError, Error, IndexError, Result};
pub use message::{
    Conversation, Message, Role, Turn, TIMESTAMP_FORMAT, start_conversation, timestamp_now,
};
pub use embedding::TextEmbedder;
pub use index::{CollectionInfo, DistanceMetric, Hit, Metadata, QueryResult, Record, VectorIndex};
