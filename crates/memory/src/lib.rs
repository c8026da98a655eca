//! Conversation memory for Parley.
//!
//! - [`MessageCache`]: bounded in-process window of recent turns
//! - [`TranscriptStore`]: durable YAML transcript of every conversation
//! - [`CollectionGateway`]: named vector collections for similarity recall
//! - [`ContextAssembler`]: merges recent and retrieved history into a prompt
//!
//! [`ConversationMemory`] wires all four together from configuration.

pub mod assembler;
pub mod cache;
pub mod format;
pub mod gateway;
pub mod in_memory;
pub mod session;
pub mod transcript;
pub mod vector;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(test)]
mod test_helpers;

pub use assembler::{AssembledContext, ContextAssembler};
pub use cache::MessageCache;
pub use format::{NO_RESULTS, format_results, parse_memory_line};
pub use gateway::{
    AGENT_COMMANDS_COLLECTION, CollectionGateway, DEFAULT_N_RESULTS, validate_collection_name,
};
pub use in_memory::InMemoryIndex;
pub use session::ConversationMemory;
pub use transcript::{TranscriptFile, TranscriptStore};
pub use vector::{cosine_similarity, distance, nearest};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteIndex;
