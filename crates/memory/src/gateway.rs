//! Collection gateway: named vector collections over one index engine.
//!
//! The gateway binds a [`VectorIndex`] engine to a default [`TextEmbedder`]
//! and tracks which collection `add`/`query` target. Engine and embedder
//! failures are wrapped into [`Error`] with the failing operation and the
//! collection name.

use parley_config::collection_name_problem;
use parley_core::embedding::TextEmbedder;
use parley_core::error::{EmbedError, Error, IndexError, Result};
use parley_core::index::{CollectionInfo, DistanceMetric, Metadata, QueryResult, Record, VectorIndex};
use parley_core::message::Turn;
use serde_json::Value;
use std::collections::{BTreeSet, HashSet};
#[cfg(feature = "sqlite")]
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Neighbours returned per query text when the caller has no preference.
pub const DEFAULT_N_RESULTS: usize = 5;

/// Collection holding named agent commands.
pub const AGENT_COMMANDS_COLLECTION: &str = "agent_commands";

const NO_ACTIVE: &str = "<none>";

/// Which error family an engine failure maps to.
#[derive(Debug, Clone, Copy)]
enum Stage {
    Lifecycle,
    Write,
    Read,
}

fn wrap(stage: Stage, op: &str, collection: &str, reason: String) -> Error {
    let collection = collection.to_string();
    let reason = format!("{op}: {reason}");
    match stage {
        Stage::Lifecycle => Error::CollectionAccess { collection, reason },
        Stage::Write => Error::Write { collection, reason },
        Stage::Read => Error::Query { collection, reason },
    }
}

fn wrap_index(stage: Stage, op: &str, collection: &str, e: IndexError) -> Error {
    // A vanished collection is an access problem whatever the operation
    let stage = match e {
        IndexError::CollectionNotFound(_) => Stage::Lifecycle,
        _ => stage,
    };
    wrap(stage, op, collection, e.to_string())
}

fn wrap_embed(stage: Stage, collection: &str, e: EmbedError) -> Error {
    wrap(stage, "embed", collection, e.to_string())
}

/// Embed `texts`, insisting on exactly one vector per input.
async fn embed_checked(
    embedder: &dyn TextEmbedder,
    texts: &[String],
) -> std::result::Result<Vec<Vec<f32>>, EmbedError> {
    let vectors = embedder.embed(texts).await?;
    if vectors.len() != texts.len() {
        return Err(EmbedError::CountMismatch {
            expected: texts.len(),
            actual: vectors.len(),
        });
    }
    Ok(vectors)
}

/// Check a collection name: 1-63 characters from `[A-Za-z0-9._-]`.
pub fn validate_collection_name(name: &str) -> Result<()> {
    match collection_name_problem(name) {
        Some(reason) => Err(Error::CollectionAccess {
            collection: name.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

/// Gateway to the named collections of one vector index.
pub struct CollectionGateway {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn TextEmbedder>,
    active: Option<String>,
}

impl CollectionGateway {
    /// Open (or create) the persistent SQLite index at `library_path`.
    ///
    /// Parent directories are created. Any failure is [`Error::StoreInit`].
    #[cfg(feature = "sqlite")]
    pub async fn init(
        library_path: impl AsRef<Path>,
        embedder: Arc<dyn TextEmbedder>,
    ) -> Result<Self> {
        let path = library_path.as_ref();
        let init_error = |reason: String| Error::StoreInit {
            path: path.display().to_string(),
            reason,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| init_error(format!("create directory: {e}")))?;
        }

        let index = crate::sqlite::SqliteIndex::open(path)
            .await
            .map_err(|e| init_error(e.to_string()))?;

        info!(
            path = %path.display(),
            embedder = embedder.name(),
            "Collection gateway opened"
        );
        Ok(Self::with_index(Arc::new(index), embedder))
    }

    /// Build a gateway over any index engine.
    pub fn with_index(index: Arc<dyn VectorIndex>, embedder: Arc<dyn TextEmbedder>) -> Self {
        Self {
            index,
            embedder,
            active: None,
        }
    }

    pub fn index(&self) -> &dyn VectorIndex {
        self.index.as_ref()
    }

    pub fn embedder(&self) -> &dyn TextEmbedder {
        self.embedder.as_ref()
    }

    pub fn active_collection(&self) -> Option<&str> {
        self.active.as_deref()
    }

    fn require_active(&self) -> Result<&str> {
        self.active.as_deref().ok_or_else(|| Error::CollectionAccess {
            collection: NO_ACTIVE.into(),
            reason: "no active collection; call get_or_create_collection first".into(),
        })
    }

    /// Get or create a cosine collection and make it the active one.
    pub async fn get_or_create_collection(&mut self, name: &str) -> Result<CollectionInfo> {
        validate_collection_name(name)?;
        let info = self
            .index
            .get_or_create(name, DistanceMetric::Cosine)
            .await
            .map_err(|e| wrap_index(Stage::Lifecycle, "get_or_create", name, e))?;

        info!(collection = name, engine = self.index.name(), "Collection ready");
        self.active = Some(info.name.clone());
        Ok(info)
    }

    /// Look up an existing collection.
    pub async fn get_collection(&self, name: &str) -> Result<CollectionInfo> {
        self.index
            .get(name)
            .await
            .map_err(|e| wrap_index(Stage::Lifecycle, "get", name, e))?
            .ok_or_else(|| Error::CollectionAccess {
                collection: name.to_string(),
                reason: "collection does not exist".into(),
            })
    }

    /// Switch the collection targeted by `add`, `query`, `count` and `delete`.
    pub fn set_active_collection(&mut self, name: impl Into<String>) {
        let name = name.into();
        debug!(collection = %name, "Active collection switched");
        self.active = Some(name);
    }

    /// Embed and upsert documents into the active collection.
    ///
    /// `embedder` overrides the gateway's default for this call only.
    pub async fn add(
        &self,
        documents: &[String],
        ids: &[String],
        metadatas: &[Metadata],
        embedder: Option<&dyn TextEmbedder>,
    ) -> Result<()> {
        if documents.is_empty() || ids.is_empty() || metadatas.is_empty() {
            return Err(Error::Validation(
                "documents, ids and metadatas must all be non-empty".into(),
            ));
        }
        if documents.len() != ids.len() || ids.len() != metadatas.len() {
            return Err(Error::Validation(format!(
                "length mismatch: {} documents, {} ids, {} metadatas",
                documents.len(),
                ids.len(),
                metadatas.len()
            )));
        }
        if ids.iter().any(String::is_empty) {
            return Err(Error::Validation("ids must not be empty strings".into()));
        }
        let mut seen = HashSet::with_capacity(ids.len());
        if let Some(dup) = ids.iter().find(|id| !seen.insert(id.as_str())) {
            return Err(Error::Validation(format!("duplicate id '{dup}' in batch")));
        }

        let collection = self.require_active()?;
        let embedder = embedder.unwrap_or(self.embedder.as_ref());
        let vectors = embed_checked(embedder, documents)
            .await
            .map_err(|e| wrap_embed(Stage::Write, collection, e))?;

        let records = documents
            .iter()
            .zip(ids)
            .zip(metadatas)
            .zip(vectors)
            .map(|(((document, id), metadata), embedding)| Record {
                id: id.clone(),
                document: document.clone(),
                metadata: metadata.clone(),
                embedding,
            })
            .collect();

        self.index
            .upsert(collection, records)
            .await
            .map_err(|e| wrap_index(Stage::Write, "upsert", collection, e))?;

        debug!(collection, count = ids.len(), embedder = embedder.name(), "Added documents");
        Ok(())
    }

    /// Nearest neighbours in the active collection, one list per query text.
    pub async fn query(&self, query_texts: &[String], n_results: usize) -> Result<QueryResult> {
        if query_texts.is_empty() {
            return Err(Error::Validation("query_texts must not be empty".into()));
        }
        if n_results == 0 {
            return Err(Error::Validation("n_results must be at least 1".into()));
        }

        let collection = self.require_active()?;
        let vectors = embed_checked(self.embedder.as_ref(), query_texts)
            .await
            .map_err(|e| wrap_embed(Stage::Read, collection, e))?;

        let hits = self
            .index
            .query(collection, &vectors, n_results)
            .await
            .map_err(|e| wrap_index(Stage::Read, "query", collection, e))?;

        debug!(
            collection,
            queries = query_texts.len(),
            n_results,
            "Queried collection"
        );
        Ok(QueryResult::from_hits(hits))
    }

    pub async fn list_collections(&self) -> Result<BTreeSet<String>> {
        let collections = self
            .index
            .list()
            .await
            .map_err(|e| wrap_index(Stage::Lifecycle, "list", "*", e))?;
        Ok(collections.into_iter().map(|c| c.name).collect())
    }

    /// Drop a collection. Clears the active collection if it was this one.
    pub async fn delete_collection(&mut self, name: &str) -> Result<()> {
        let existed = self
            .index
            .delete_collection(name)
            .await
            .map_err(|e| wrap_index(Stage::Lifecycle, "delete_collection", name, e))?;

        if !existed {
            return Err(Error::CollectionAccess {
                collection: name.to_string(),
                reason: "collection does not exist".into(),
            });
        }

        if self.active.as_deref() == Some(name) {
            self.active = None;
        }
        info!(collection = name, "Collection deleted");
        Ok(())
    }

    /// Rename a collection. The active collection follows the rename.
    pub async fn rename_collection(&mut self, name: &str, new_name: &str) -> Result<()> {
        validate_collection_name(new_name)?;
        self.index
            .rename(name, new_name)
            .await
            .map_err(|e| wrap_index(Stage::Lifecycle, "rename", name, e))?;

        if self.active.as_deref() == Some(name) {
            self.active = Some(new_name.to_string());
        }
        info!(from = name, to = new_name, "Collection renamed");
        Ok(())
    }

    /// Insert or replace a single document in `collection`, creating it if needed.
    ///
    /// Does not change the active collection.
    pub async fn upsert(
        &self,
        collection: &str,
        document: &str,
        metadata: Metadata,
        id: &str,
    ) -> Result<()> {
        if id.is_empty() {
            return Err(Error::Validation("id must not be empty".into()));
        }
        validate_collection_name(collection)?;
        self.index
            .get_or_create(collection, DistanceMetric::Cosine)
            .await
            .map_err(|e| wrap_index(Stage::Lifecycle, "get_or_create", collection, e))?;

        let documents = [document.to_string()];
        let mut vectors = embed_checked(self.embedder.as_ref(), &documents)
            .await
            .map_err(|e| wrap_embed(Stage::Write, collection, e))?;

        let [document] = documents;
        let record = Record {
            id: id.to_string(),
            document,
            metadata,
            embedding: vectors.remove(0),
        };

        self.index
            .upsert(collection, vec![record])
            .await
            .map_err(|e| wrap_index(Stage::Write, "upsert", collection, e))?;

        debug!(collection, id, "Upserted document");
        Ok(())
    }

    /// Store a named agent command in [`AGENT_COMMANDS_COLLECTION`].
    pub async fn upsert_agent_command(&self, command_name: &str, command: &str) -> Result<()> {
        let mut metadata = Metadata::new();
        metadata.insert("name".into(), Value::String(command_name.to_string()));
        self.upsert(AGENT_COMMANDS_COLLECTION, command, metadata, command_name)
            .await
    }

    /// Records in the active collection.
    pub async fn count(&self) -> Result<usize> {
        let collection = self.require_active()?;
        self.index
            .count(collection)
            .await
            .map_err(|e| wrap_index(Stage::Read, "count", collection, e))
    }

    /// Delete records from the active collection. Returns how many existed.
    pub async fn delete(&self, ids: &[String]) -> Result<usize> {
        let collection = self.require_active()?;
        let removed = self
            .index
            .delete(collection, ids)
            .await
            .map_err(|e| wrap_index(Stage::Write, "delete", collection, e))?;
        debug!(collection, removed, "Deleted records");
        Ok(removed)
    }

    /// Index both messages of a turn into the active collection.
    ///
    /// Documents are the memory forms; ids are `{turn_uuid}:request` and
    /// `{turn_uuid}:response`, so re-remembering a turn replaces it.
    pub async fn remember_turn(&self, turn: &Turn) -> Result<()> {
        let mut documents = Vec::with_capacity(2);
        let mut ids = Vec::with_capacity(2);
        let mut metadatas = Vec::with_capacity(2);

        for message in turn.messages() {
            documents.push(message.to_memory_string());
            ids.push(format!("{}:{}", turn.uuid, message.role));

            let mut metadata = Metadata::new();
            metadata.insert("turn_id".into(), Value::String(turn.uuid.clone()));
            metadata.insert("role".into(), Value::String(message.role.to_string()));
            metadata.insert("speaker".into(), Value::String(message.speaker.clone()));
            metadata.insert("timestamp".into(), Value::String(message.timestamp.clone()));
            metadatas.push(metadata);
        }

        self.add(&documents, &ids, &metadatas, None).await
    }
}
