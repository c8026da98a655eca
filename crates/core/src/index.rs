//! VectorIndex trait — persistent similarity search over named collections.
//!
//! A collection is a bucket of `(id, document, metadata, embedding)` records
//! with upsert-by-id semantics and nearest-neighbour queries. Engines rank by
//! the collection's [`DistanceMetric`], ascending distance.
//!
//! Implementations: SQLite (persistent), in-memory (ephemeral).

use crate::error::IndexError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Flat metadata attached to a record.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// How distances are computed inside a collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// `1 - cosine_similarity`
    #[default]
    Cosine,
    /// Squared Euclidean distance
    L2,
    /// `1 - dot_product`
    Ip,
}

impl DistanceMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::L2 => "l2",
            Self::Ip => "ip",
        }
    }
}

impl std::str::FromStr for DistanceMetric {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cosine" => Ok(Self::Cosine),
            "l2" => Ok(Self::L2),
            "ip" => Ok(Self::Ip),
            other => Err(IndexError::Storage(format!("Unknown distance metric: {other}"))),
        }
    }
}

/// Descriptor of a collection held by an engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub name: String,
    pub metric: DistanceMetric,
    /// Dimensionality fixed by the first stored vector
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension: Option<usize>,
}

/// A record to upsert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub document: String,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(skip)]
    pub embedding: Vec<f32>,
}

/// A single nearest-neighbour match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    pub id: String,
    pub document: String,
    #[serde(default)]
    pub metadata: Metadata,
    /// Lower = more similar
    pub distance: f32,
}

/// Query results, one inner list per query text, nearest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    #[serde(default)]
    pub ids: Vec<Vec<String>>,
    #[serde(default)]
    pub documents: Vec<Vec<String>>,
    #[serde(default)]
    pub metadatas: Vec<Vec<Metadata>>,
    #[serde(default)]
    pub distances: Vec<Vec<f32>>,
}

impl QueryResult {
    /// Convert per-query hit lists into the column layout.
    pub fn from_hits(hits: Vec<Vec<Hit>>) -> Self {
        let mut result = Self::default();
        for group in hits {
            let mut ids = Vec::with_capacity(group.len());
            let mut documents = Vec::with_capacity(group.len());
            let mut metadatas = Vec::with_capacity(group.len());
            let mut distances = Vec::with_capacity(group.len());
            for hit in group {
                ids.push(hit.id);
                documents.push(hit.document);
                metadatas.push(hit.metadata);
                distances.push(hit.distance);
            }
            result.ids.push(ids);
            result.documents.push(documents);
            result.metadatas.push(metadatas);
            result.distances.push(distances);
        }
        result
    }

    /// True when there are no documents at all, or every query came back empty.
    pub fn is_empty(&self) -> bool {
        self.documents.iter().all(|group| group.is_empty())
    }

    /// Every document across all queries, in query order, nearest first.
    pub fn documents(&self) -> impl Iterator<Item = &str> {
        self.documents.iter().flatten().map(String::as_str)
    }
}

/// The core VectorIndex trait.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// The engine name (e.g., "sqlite", "in_memory").
    fn name(&self) -> &str;

    /// Return the named collection, creating it with `metric` if absent.
    async fn get_or_create(
        &self,
        name: &str,
        metric: DistanceMetric,
    ) -> std::result::Result<CollectionInfo, IndexError>;

    /// Look up a collection without creating it.
    async fn get(&self, name: &str) -> std::result::Result<Option<CollectionInfo>, IndexError>;

    /// All collections, ordered by name.
    async fn list(&self) -> std::result::Result<Vec<CollectionInfo>, IndexError>;

    /// Drop a collection and its records. Returns whether it existed.
    async fn delete_collection(&self, name: &str) -> std::result::Result<bool, IndexError>;

    /// Rename a collection. Fails if `new_name` is taken or `name` is missing.
    async fn rename(&self, name: &str, new_name: &str) -> std::result::Result<(), IndexError>;

    /// Insert or replace records by id, atomically per call.
    async fn upsert(
        &self,
        collection: &str,
        records: Vec<Record>,
    ) -> std::result::Result<(), IndexError>;

    /// Up to `k` nearest records for each query embedding.
    async fn query(
        &self,
        collection: &str,
        embeddings: &[Vec<f32>],
        k: usize,
    ) -> std::result::Result<Vec<Vec<Hit>>, IndexError>;

    /// Delete records by id. Returns how many were removed.
    async fn delete(&self, collection: &str, ids: &[String]) -> std::result::Result<usize, IndexError>;

    /// Number of records in a collection.
    async fn count(&self, collection: &str) -> std::result::Result<usize, IndexError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(id: &str, distance: f32) -> Hit {
        Hit {
            id: id.into(),
            document: format!("doc {id}"),
            metadata: Metadata::new(),
            distance,
        }
    }

    #[test]
    fn from_hits_keeps_columns_aligned() {
        let result = QueryResult::from_hits(vec![vec![hit("a", 0.1), hit("b", 0.4)], vec![]]);
        assert_eq!(result.ids, vec![vec!["a".to_string(), "b".to_string()], vec![]]);
        assert_eq!(result.distances[0], vec![0.1, 0.4]);
        assert_eq!(result.documents.len(), 2);
        assert!(!result.is_empty());
    }

    #[test]
    fn empty_shapes_are_empty() {
        assert!(QueryResult::default().is_empty());
        let nested: QueryResult = serde_json::from_str(r#"{"documents": [[]]}"#).unwrap();
        assert!(nested.is_empty());
    }

    #[test]
    fn metric_parses_round_trip() {
        for metric in [DistanceMetric::Cosine, DistanceMetric::L2, DistanceMetric::Ip] {
            assert_eq!(metric.as_str().parse::<DistanceMetric>().unwrap(), metric);
        }
        assert!("manhattan".parse::<DistanceMetric>().is_err());
    }
}
