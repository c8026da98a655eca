//! Conversation memory: the recency cache, the transcript and the vector
//! collection wired together for one conversation.
//!
//! Every recorded turn goes to all three stores. The transcript write comes
//! first, so a turn that fails to index is still on disk.

use crate::assembler::{AssembledContext, ContextAssembler};
use crate::cache::MessageCache;
use crate::gateway::CollectionGateway;
use crate::transcript::TranscriptStore;
use parley_core::error::Result;
use parley_core::message::{Conversation, Turn};
use tracing::debug;

#[cfg(feature = "sqlite")]
use parley_config::MemoryConfig;
#[cfg(feature = "sqlite")]
use parley_core::embedding::TextEmbedder;
#[cfg(feature = "sqlite")]
use std::sync::Arc;

pub struct ConversationMemory {
    cache: MessageCache,
    transcript: TranscriptStore,
    gateway: CollectionGateway,
    assembler: ContextAssembler,
    n_results: usize,
}

impl ConversationMemory {
    /// Open every store named by `config`, with the default collection active.
    #[cfg(feature = "sqlite")]
    pub async fn open(config: &MemoryConfig, embedder: Arc<dyn TextEmbedder>) -> Result<Self> {
        let mut gateway = CollectionGateway::init(&config.library_path, embedder).await?;
        gateway
            .get_or_create_collection(&config.default_collection)
            .await?;

        tracing::info!(
            transcript = %config.transcript_path.display(),
            collection = %config.default_collection,
            "Conversation memory opened"
        );
        Ok(Self::from_parts(
            MessageCache::new(config.cache_capacity),
            TranscriptStore::new(&config.transcript_path),
            gateway,
            ContextAssembler::new(config.recent_turns),
            config.n_results,
        ))
    }

    /// Assemble from already-built stores. The gateway should have an active collection.
    pub fn from_parts(
        cache: MessageCache,
        transcript: TranscriptStore,
        gateway: CollectionGateway,
        assembler: ContextAssembler,
        n_results: usize,
    ) -> Self {
        Self {
            cache,
            transcript,
            gateway,
            assembler,
            n_results,
        }
    }

    /// Load the stored record for `conversation` into the cache and return it.
    ///
    /// A conversation not yet in the transcript is inserted as given. A stored
    /// one keeps its turns whatever `conversation` holds.
    pub fn resume(&mut self, conversation: &Conversation) -> Result<Conversation> {
        let stored = self.transcript.ensure_conversation(conversation)?;
        self.cache.clear();
        let added = self.cache.hydrate(&stored);
        debug!(
            conversation = %stored.uuid,
            turns = stored.turns.len(),
            cached = added,
            "Conversation resumed"
        );
        Ok(stored)
    }

    /// Record a finished turn in the transcript, the cache and the index.
    pub async fn record_turn(&mut self, conversation_id: &str, turn: Turn) -> Result<()> {
        self.transcript.append_turn(conversation_id, &turn)?;
        self.cache.add(turn.clone());
        self.gateway.remember_turn(&turn).await
    }

    /// Context for answering `request`: recent turns plus similar past exchanges.
    pub async fn context_for(&self, request: &str) -> Result<AssembledContext> {
        let retrieved = self
            .gateway
            .query(&[request.to_string()], self.n_results)
            .await?;
        Ok(self.assembler.assemble(&self.cache, &retrieved))
    }

    pub fn cache(&self) -> &MessageCache {
        &self.cache
    }

    pub fn transcript(&self) -> &TranscriptStore {
        &self.transcript
    }

    pub fn gateway(&self) -> &CollectionGateway {
        &self.gateway
    }

    pub fn gateway_mut(&mut self) -> &mut CollectionGateway {
        &mut self.gateway
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::in_memory::InMemoryIndex;
    use crate::test_helpers::BagOfWordsEmbedder;
    use parley_core::message::{Message, start_conversation};
    use std::sync::Arc;

    async fn memory(dir: &tempfile::TempDir) -> ConversationMemory {
        let mut gateway = CollectionGateway::with_index(
            Arc::new(InMemoryIndex::new()),
            Arc::new(BagOfWordsEmbedder),
        );
        gateway.get_or_create_collection("conversations").await.unwrap();
        ConversationMemory::from_parts(
            MessageCache::new(4),
            TranscriptStore::new(dir.path().join("conversations.yaml")),
            gateway,
            ContextAssembler::new(1),
            3,
        )
    }

    #[tokio::test]
    async fn record_turn_reaches_every_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut memory = memory(&dir).await;
        let conversation = start_conversation("alice", false, "bot", true);
        memory.resume(&conversation).unwrap();

        let turn = conversation.create_turn(
            Message::request("alice", "tell me about lighthouses"),
            Message::response("bot", "they guide ships at night"),
        );
        memory.record_turn(&conversation.uuid, turn.clone()).await.unwrap();

        assert_eq!(memory.cache().get_all(), vec![turn.clone()]);
        let stored = memory
            .transcript()
            .get_conversation(&conversation.uuid)
            .unwrap()
            .unwrap();
        assert_eq!(stored.turns, vec![turn]);
        assert_eq!(memory.gateway().count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn context_combines_recent_and_retrieved() {
        let dir = tempfile::tempdir().unwrap();
        let mut memory = memory(&dir).await;
        let conversation = start_conversation("alice", false, "bot", true);
        memory.resume(&conversation).unwrap();

        let old = Turn::new(
            Message::request("alice", "my cat is named pixel").with_timestamp("2024-01-01 @ 09:00"),
            Message::response("bot", "pixel is a great name").with_timestamp("2024-01-01 @ 09:01"),
        );
        let latest = Turn::new(
            Message::request("alice", "what about weather").with_timestamp("2024-01-02 @ 09:00"),
            Message::response("bot", "sunny").with_timestamp("2024-01-02 @ 09:01"),
        );
        memory.record_turn(&conversation.uuid, old).await.unwrap();
        memory.record_turn(&conversation.uuid, latest).await.unwrap();

        let context = memory.context_for("what is my cat named").await.unwrap();
        assert_eq!(context.recent.len(), 2);
        assert!(context.recent[0].contains("what about weather"));
        assert!(context.retrieved.contains("my cat is named pixel"));
        assert!(!context.retrieved.contains("sunny"));
    }

    #[tokio::test]
    async fn resume_hydrates_cache() {
        let dir = tempfile::tempdir().unwrap();
        let mut memory = memory(&dir).await;
        let mut conversation = start_conversation("alice", false, "bot", true);
        for i in 0..6 {
            conversation.push_turn(Turn::new(
                Message::request("alice", format!("q{i}")),
                Message::response("bot", format!("a{i}")),
            ));
        }

        memory.resume(&conversation).unwrap();
        assert_eq!(memory.cache().len(), 4);
        assert_eq!(
            memory
                .transcript()
                .get_conversation(&conversation.uuid)
                .unwrap()
                .unwrap()
                .turns
                .len(),
            6
        );
    }

    #[tokio::test]
    async fn resume_with_stale_header_keeps_stored_turns() {
        let dir = tempfile::tempdir().unwrap();
        let mut memory = memory(&dir).await;
        let header = start_conversation("alice", false, "bot", true);
        memory.resume(&header).unwrap();

        for i in 0..3 {
            let turn = header.create_turn(
                Message::request("alice", format!("q{i}")),
                Message::response("bot", format!("a{i}")),
            );
            memory.record_turn(&header.uuid, turn).await.unwrap();
        }
        assert!(header.turns.is_empty());

        let stored = memory.resume(&header).unwrap();
        assert_eq!(stored.turns.len(), 3);
        assert_eq!(
            memory
                .transcript()
                .get_conversation(&header.uuid)
                .unwrap()
                .unwrap()
                .turns
                .len(),
            3
        );
        assert_eq!(memory.cache().len(), 3);
        assert!(memory.cache().get_all()[2].request.content.contains("q2"));
    }
}
