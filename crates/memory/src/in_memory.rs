//! In-memory vector index — useful for testing and ephemeral sessions.

use crate::vector;
use async_trait::async_trait;
use parley_core::error::IndexError;
use parley_core::index::{CollectionInfo, DistanceMetric, Hit, Record, VectorIndex};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

struct StoredCollection {
    info: CollectionInfo,
    records: Vec<Record>,
}

/// An in-memory index that keeps every collection in a map.
/// Useful for testing and sessions where persistence isn't needed.
pub struct InMemoryIndex {
    collections: Arc<RwLock<BTreeMap<String, StoredCollection>>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self {
            collections: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }
}

impl Default for InMemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

fn mismatch(expected: usize, actual: usize) -> IndexError {
    IndexError::DimensionMismatch { expected, actual }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn get_or_create(
        &self,
        name: &str,
        metric: DistanceMetric,
    ) -> Result<CollectionInfo, IndexError> {
        let mut collections = self.collections.write().await;
        let stored = collections
            .entry(name.to_string())
            .or_insert_with(|| StoredCollection {
                info: CollectionInfo {
                    name: name.to_string(),
                    metric,
                    dimension: None,
                },
                records: Vec::new(),
            });
        Ok(stored.info.clone())
    }

    async fn get(&self, name: &str) -> Result<Option<CollectionInfo>, IndexError> {
        Ok(self
            .collections
            .read()
            .await
            .get(name)
            .map(|c| c.info.clone()))
    }

    async fn list(&self) -> Result<Vec<CollectionInfo>, IndexError> {
        Ok(self
            .collections
            .read()
            .await
            .values()
            .map(|c| c.info.clone())
            .collect())
    }

    async fn delete_collection(&self, name: &str) -> Result<bool, IndexError> {
        Ok(self.collections.write().await.remove(name).is_some())
    }

    async fn rename(&self, name: &str, new_name: &str) -> Result<(), IndexError> {
        let mut collections = self.collections.write().await;
        if collections.contains_key(new_name) {
            return Err(IndexError::CollectionExists(new_name.to_string()));
        }
        let mut stored = collections
            .remove(name)
            .ok_or_else(|| IndexError::CollectionNotFound(name.to_string()))?;
        stored.info.name = new_name.to_string();
        collections.insert(new_name.to_string(), stored);
        Ok(())
    }

    async fn upsert(&self, collection: &str, records: Vec<Record>) -> Result<(), IndexError> {
        let mut collections = self.collections.write().await;
        let stored = collections
            .get_mut(collection)
            .ok_or_else(|| IndexError::CollectionNotFound(collection.to_string()))?;

        // Validate the whole batch before touching anything
        let mut dimension = stored.info.dimension;
        for record in &records {
            let actual = record.embedding.len();
            match dimension {
                Some(expected) if expected != actual => return Err(mismatch(expected, actual)),
                Some(_) => {}
                None => dimension = Some(actual),
            }
        }
        stored.info.dimension = dimension;

        for record in records {
            match stored.records.iter_mut().find(|r| r.id == record.id) {
                Some(existing) => *existing = record,
                None => stored.records.push(record),
            }
        }
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        embeddings: &[Vec<f32>],
        k: usize,
    ) -> Result<Vec<Vec<Hit>>, IndexError> {
        let collections = self.collections.read().await;
        let stored = collections
            .get(collection)
            .ok_or_else(|| IndexError::CollectionNotFound(collection.to_string()))?;

        if let Some(expected) = stored.info.dimension {
            if let Some(bad) = embeddings.iter().find(|e| e.len() != expected) {
                return Err(mismatch(expected, bad.len()));
            }
        }

        Ok(embeddings
            .iter()
            .map(|query| vector::nearest(&stored.records, query, stored.info.metric, k))
            .collect())
    }

    async fn delete(&self, collection: &str, ids: &[String]) -> Result<usize, IndexError> {
        let mut collections = self.collections.write().await;
        let stored = collections
            .get_mut(collection)
            .ok_or_else(|| IndexError::CollectionNotFound(collection.to_string()))?;
        let before = stored.records.len();
        stored.records.retain(|r| !ids.contains(&r.id));
        Ok(before - stored.records.len())
    }

    async fn count(&self, collection: &str) -> Result<usize, IndexError> {
        self.collections
            .read()
            .await
            .get(collection)
            .map(|c| c.records.len())
            .ok_or_else(|| IndexError::CollectionNotFound(collection.to_string()))
    }
}
