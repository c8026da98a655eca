//! SQLite vector index engine.
//!
//! Uses a single SQLite database file with two tables:
//! - `collections` — one row per collection (metric, fixed dimension)
//! - `embeddings` — the records, keyed by `(collection, id)`
//!
//! Embeddings are stored as little-endian `f32` blobs and ranked in process
//! by brute force, which is plenty for a single conversation library.

use crate::vector;
use async_trait::async_trait;
use chrono::Utc;
use parley_core::error::IndexError;
use parley_core::index::{CollectionInfo, DistanceMetric, Hit, Metadata, Record, VectorIndex};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

/// A persistent vector index backed by SQLite.
pub struct SqliteIndex {
    pool: SqlitePool,
}

impl SqliteIndex {
    /// Open (or create) the index database at `path`.
    ///
    /// Pass `"sqlite::memory:"` for an in-process ephemeral database (useful for tests).
    pub async fn new(path: &str) -> Result<Self, IndexError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| IndexError::Storage(format!("Invalid SQLite path: {e}")))?;
        Self::connect(options, path).await
    }

    /// Open (or create) the index database file at `path`.
    pub async fn open(path: &Path) -> Result<Self, IndexError> {
        let options = SqliteConnectOptions::new().filename(path);
        Self::connect(options, &path.display().to_string()).await
    }

    async fn connect(options: SqliteConnectOptions, label: &str) -> Result<Self, IndexError> {
        let options = options
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| IndexError::Storage(format!("Failed to open SQLite: {e}")))?;

        let index = Self { pool };
        index.run_migrations().await?;
        info!("SQLite vector index initialized at {label}");
        Ok(index)
    }

    /// Create from an existing pool (useful for testing).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, IndexError> {
        let index = Self { pool };
        index.run_migrations().await?;
        Ok(index)
    }

    async fn run_migrations(&self) -> Result<(), IndexError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS collections (
                name        TEXT PRIMARY KEY NOT NULL,
                metric      TEXT NOT NULL DEFAULT 'cosine',
                dimension   INTEGER,
                created_at  TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| IndexError::MigrationFailed(format!("collections table: {e}")))?;

        // Renames cascade from collections.name into the records
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS embeddings (
                iid         INTEGER PRIMARY KEY AUTOINCREMENT,
                collection  TEXT NOT NULL
                            REFERENCES collections(name) ON DELETE CASCADE ON UPDATE CASCADE,
                id          TEXT NOT NULL,
                document    TEXT NOT NULL,
                metadata    TEXT NOT NULL DEFAULT '{}',
                embedding   BLOB NOT NULL,
                UNIQUE(collection, id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| IndexError::MigrationFailed(format!("embeddings table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_embeddings_collection ON embeddings(collection)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| IndexError::MigrationFailed(format!("collection index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn row_to_info(row: &sqlx::sqlite::SqliteRow) -> Result<CollectionInfo, IndexError> {
        let name: String = row
            .try_get("name")
            .map_err(|e| IndexError::QueryFailed(format!("name column: {e}")))?;
        let metric: String = row
            .try_get("metric")
            .map_err(|e| IndexError::QueryFailed(format!("metric column: {e}")))?;
        let dimension: Option<i64> = row
            .try_get("dimension")
            .map_err(|e| IndexError::QueryFailed(format!("dimension column: {e}")))?;

        Ok(CollectionInfo {
            name,
            metric: DistanceMetric::from_str(&metric)?,
            dimension: dimension.map(|d| d as usize),
        })
    }

    fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<Record, IndexError> {
        let id: String = row
            .try_get("id")
            .map_err(|e| IndexError::QueryFailed(format!("id column: {e}")))?;
        let document: String = row
            .try_get("document")
            .map_err(|e| IndexError::QueryFailed(format!("document column: {e}")))?;
        let metadata_json: String = row
            .try_get("metadata")
            .map_err(|e| IndexError::QueryFailed(format!("metadata column: {e}")))?;
        let blob: Vec<u8> = row
            .try_get("embedding")
            .map_err(|e| IndexError::QueryFailed(format!("embedding column: {e}")))?;

        let metadata: Metadata = serde_json::from_str(&metadata_json)
            .map_err(|e| IndexError::QueryFailed(format!("metadata for '{id}': {e}")))?;

        Ok(Record {
            id,
            document,
            metadata,
            embedding: Self::blob_to_embedding(&blob),
        })
    }

    /// Serialize an embedding vector to bytes.
    fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
        blob.chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    async fn fetch_info(&self, name: &str) -> Result<Option<CollectionInfo>, IndexError> {
        let row = sqlx::query("SELECT name, metric, dimension FROM collections WHERE name = ?1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| IndexError::QueryFailed(format!("Collection lookup: {e}")))?;

        row.as_ref().map(Self::row_to_info).transpose()
    }

    async fn require(&self, name: &str) -> Result<CollectionInfo, IndexError> {
        self.fetch_info(name)
            .await?
            .ok_or_else(|| IndexError::CollectionNotFound(name.to_string()))
    }
}

/// Check a batch of vectors against a collection's dimension.
///
/// Returns the dimension the collection has after the batch.
fn check_dimensions<'a>(
    expected: Option<usize>,
    vectors: impl IntoIterator<Item = &'a [f32]>,
) -> Result<Option<usize>, IndexError> {
    let mut dimension = expected;
    for v in vectors {
        match dimension {
            Some(expected) if expected != v.len() => {
                return Err(IndexError::DimensionMismatch {
                    expected,
                    actual: v.len(),
                });
            }
            Some(_) => {}
            None => dimension = Some(v.len()),
        }
    }
    Ok(dimension)
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn get_or_create(
        &self,
        name: &str,
        metric: DistanceMetric,
    ) -> Result<CollectionInfo, IndexError> {
        sqlx::query(
            r#"
            INSERT INTO collections (name, metric, created_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(name) DO NOTHING
            "#,
        )
        .bind(name)
        .bind(metric.as_str())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| IndexError::Storage(format!("Create collection: {e}")))?;

        self.require(name).await
    }

    async fn get(&self, name: &str) -> Result<Option<CollectionInfo>, IndexError> {
        self.fetch_info(name).await
    }

    async fn list(&self) -> Result<Vec<CollectionInfo>, IndexError> {
        let rows = sqlx::query("SELECT name, metric, dimension FROM collections ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| IndexError::QueryFailed(format!("List collections: {e}")))?;

        rows.iter().map(Self::row_to_info).collect()
    }

    async fn delete_collection(&self, name: &str) -> Result<bool, IndexError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| IndexError::Storage(format!("Begin transaction: {e}")))?;

        sqlx::query("DELETE FROM embeddings WHERE collection = ?1")
            .bind(name)
            .execute(&mut *tx)
            .await
            .map_err(|e| IndexError::Storage(format!("Delete records: {e}")))?;

        let result = sqlx::query("DELETE FROM collections WHERE name = ?1")
            .bind(name)
            .execute(&mut *tx)
            .await
            .map_err(|e| IndexError::Storage(format!("Delete collection: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| IndexError::Storage(format!("Commit: {e}")))?;

        Ok(result.rows_affected() > 0)
    }

    async fn rename(&self, name: &str, new_name: &str) -> Result<(), IndexError> {
        if self.fetch_info(new_name).await?.is_some() {
            return Err(IndexError::CollectionExists(new_name.to_string()));
        }

        let result = sqlx::query("UPDATE collections SET name = ?2 WHERE name = ?1")
            .bind(name)
            .bind(new_name)
            .execute(&self.pool)
            .await
            .map_err(|e| IndexError::Storage(format!("Rename collection: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(IndexError::CollectionNotFound(name.to_string()));
        }

        debug!(from = name, to = new_name, "Renamed collection");
        Ok(())
    }

    async fn upsert(&self, collection: &str, records: Vec<Record>) -> Result<(), IndexError> {
        if records.is_empty() {
            return Ok(());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| IndexError::Storage(format!("Begin transaction: {e}")))?;

        let row = sqlx::query("SELECT name, metric, dimension FROM collections WHERE name = ?1")
            .bind(collection)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| IndexError::QueryFailed(format!("Collection lookup: {e}")))?
            .ok_or_else(|| IndexError::CollectionNotFound(collection.to_string()))?;
        let info = Self::row_to_info(&row)?;

        let dimension =
            check_dimensions(info.dimension, records.iter().map(|r| r.embedding.as_slice()))?;
        if info.dimension.is_none() {
            if let Some(dimension) = dimension {
                sqlx::query("UPDATE collections SET dimension = ?2 WHERE name = ?1")
                    .bind(collection)
                    .bind(dimension as i64)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| IndexError::Storage(format!("Fix dimension: {e}")))?;
            }
        }

        for record in &records {
            let metadata_json = serde_json::to_string(&record.metadata)
                .map_err(|e| IndexError::Storage(format!("Metadata serialization: {e}")))?;

            sqlx::query(
                r#"
                INSERT INTO embeddings (collection, id, document, metadata, embedding)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(collection, id) DO UPDATE SET
                    document = excluded.document,
                    metadata = excluded.metadata,
                    embedding = excluded.embedding
                "#,
            )
            .bind(collection)
            .bind(&record.id)
            .bind(&record.document)
            .bind(&metadata_json)
            .bind(Self::embedding_to_blob(&record.embedding))
            .execute(&mut *tx)
            .await
            .map_err(|e| IndexError::Storage(format!("INSERT failed: {e}")))?;
        }

        tx.commit()
            .await
            .map_err(|e| IndexError::Storage(format!("Commit: {e}")))?;

        debug!(collection, count = records.len(), "Upserted records");
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        embeddings: &[Vec<f32>],
        k: usize,
    ) -> Result<Vec<Vec<Hit>>, IndexError> {
        let info = self.require(collection).await?;
        if let Some(expected) = info.dimension {
            check_dimensions(Some(expected), embeddings.iter().map(Vec::as_slice))?;
        }

        let rows = sqlx::query(
            "SELECT id, document, metadata, embedding FROM embeddings WHERE collection = ?1 ORDER BY iid",
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| IndexError::QueryFailed(format!("Vector scan: {e}")))?;

        let records = rows
            .iter()
            .map(Self::row_to_record)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(embeddings
            .iter()
            .map(|query| vector::nearest(&records, query, info.metric, k))
            .collect())
    }

    async fn delete(&self, collection: &str, ids: &[String]) -> Result<usize, IndexError> {
        self.require(collection).await?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| IndexError::Storage(format!("Begin transaction: {e}")))?;

        let mut removed = 0u64;
        for id in ids {
            let result = sqlx::query("DELETE FROM embeddings WHERE collection = ?1 AND id = ?2")
                .bind(collection)
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(|e| IndexError::Storage(format!("DELETE failed: {e}")))?;
            removed += result.rows_affected();
        }

        tx.commit()
            .await
            .map_err(|e| IndexError::Storage(format!("Commit: {e}")))?;

        Ok(removed as usize)
    }

    async fn count(&self, collection: &str) -> Result<usize, IndexError> {
        self.require(collection).await?;

        let row = sqlx::query("SELECT COUNT(*) as cnt FROM embeddings WHERE collection = ?1")
            .bind(collection)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| IndexError::QueryFailed(format!("COUNT failed: {e}")))?;

        let count: i64 = row
            .try_get("cnt")
            .map_err(|e| IndexError::QueryFailed(format!("cnt column: {e}")))?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn test_index() -> SqliteIndex {
        SqliteIndex::new("sqlite::memory:").await.unwrap()
    }

    fn record(id: &str, document: &str, embedding: Vec<f32>) -> Record {
        let mut metadata = Metadata::new();
        metadata.insert("speaker".into(), json!("alice"));
        Record {
            id: id.into(),
            document: document.into(),
            metadata,
            embedding,
        }
    }

    #[tokio::test]
    async fn get_or_create_is_idempotent() {
        let index = test_index().await;
        let first = index.get_or_create("chat", DistanceMetric::Cosine).await.unwrap();
        let second = index.get_or_create("chat", DistanceMetric::L2).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(second.metric, DistanceMetric::Cosine);
        assert_eq!(second.dimension, None);
        assert_eq!(index.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn upsert_and_query_ranked() {
        let index = test_index().await;
        index.get_or_create("chat", DistanceMetric::Cosine).await.unwrap();
        index
            .upsert(
                "chat",
                vec![
                    record("a", "about rust", vec![1.0, 0.0, 0.0]),
                    record("b", "about cats", vec![0.0, 1.0, 0.0]),
                    record("c", "about both", vec![0.7, 0.7, 0.0]),
                ],
            )
            .await
            .unwrap();

        let hits = index.query("chat", &[vec![1.0, 0.1, 0.0]], 2).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].len(), 2);
        assert_eq!(hits[0][0].id, "a");
        assert_eq!(hits[0][1].id, "c");
        assert_eq!(hits[0][0].metadata["speaker"], "alice");
        assert!(hits[0][0].distance <= hits[0][1].distance);
    }

    #[tokio::test]
    async fn upsert_on_conflict_replaces() {
        let index = test_index().await;
        index.get_or_create("chat", DistanceMetric::Cosine).await.unwrap();
        index
            .upsert("chat", vec![record("a", "v1", vec![1.0, 0.0])])
            .await
            .unwrap();
        index
            .upsert("chat", vec![record("a", "v2", vec![0.0, 1.0])])
            .await
            .unwrap();

        assert_eq!(index.count("chat").await.unwrap(), 1);
        let hits = index.query("chat", &[vec![0.0, 1.0]], 5).await.unwrap();
        assert_eq!(hits[0][0].document, "v2");
    }

    #[tokio::test]
    async fn dimension_is_fixed_by_first_upsert() {
        let index = test_index().await;
        index.get_or_create("chat", DistanceMetric::Cosine).await.unwrap();
        index
            .upsert("chat", vec![record("a", "x", vec![1.0, 0.0, 0.0])])
            .await
            .unwrap();
        assert_eq!(index.get("chat").await.unwrap().unwrap().dimension, Some(3));

        let err = index
            .upsert("chat", vec![record("b", "y", vec![1.0, 0.0])])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            IndexError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));

        let err = index.query("chat", &[vec![1.0]], 1).await.unwrap_err();
        assert!(matches!(err, IndexError::DimensionMismatch { .. }));
    }

    #[tokio::test]
    async fn mixed_batch_is_rejected_whole() {
        let index = test_index().await;
        index.get_or_create("chat", DistanceMetric::Cosine).await.unwrap();
        let result = index
            .upsert(
                "chat",
                vec![record("a", "x", vec![1.0, 0.0]), record("b", "y", vec![1.0])],
            )
            .await;
        assert!(result.is_err());
        assert_eq!(index.count("chat").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn missing_collection_errors() {
        let index = test_index().await;
        let err = index
            .upsert("ghost", vec![record("a", "x", vec![1.0])])
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::CollectionNotFound(_)));
        assert!(index.query("ghost", &[vec![1.0]], 1).await.is_err());
        assert!(index.get("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rename_moves_records() {
        let index = test_index().await;
        index.get_or_create("old", DistanceMetric::Cosine).await.unwrap();
        index
            .upsert("old", vec![record("a", "kept", vec![1.0, 0.0])])
            .await
            .unwrap();

        index.rename("old", "new").await.unwrap();
        assert!(index.get("old").await.unwrap().is_none());
        assert_eq!(index.count("new").await.unwrap(), 1);
        let hits = index.query("new", &[vec![1.0, 0.0]], 1).await.unwrap();
        assert_eq!(hits[0][0].document, "kept");
    }

    #[tokio::test]
    async fn rename_onto_existing_fails() {
        let index = test_index().await;
        index.get_or_create("a", DistanceMetric::Cosine).await.unwrap();
        index.get_or_create("b", DistanceMetric::Cosine).await.unwrap();
        let err = index.rename("a", "b").await.unwrap_err();
        assert!(matches!(err, IndexError::CollectionExists(_)));

        let err = index.rename("ghost", "c").await.unwrap_err();
        assert!(matches!(err, IndexError::CollectionNotFound(_)));
    }

    #[tokio::test]
    async fn delete_collection_drops_records() {
        let index = test_index().await;
        index.get_or_create("chat", DistanceMetric::Cosine).await.unwrap();
        index
            .upsert("chat", vec![record("a", "x", vec![1.0])])
            .await
            .unwrap();

        assert!(index.delete_collection("chat").await.unwrap());
        assert!(!index.delete_collection("chat").await.unwrap());
        assert!(index.list().await.unwrap().is_empty());

        // Recreated collection starts empty with no fixed dimension
        let info = index.get_or_create("chat", DistanceMetric::Cosine).await.unwrap();
        assert_eq!(info.dimension, None);
        assert_eq!(index.count("chat").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn delete_records_by_id() {
        let index = test_index().await;
        index.get_or_create("chat", DistanceMetric::Cosine).await.unwrap();
        index
            .upsert(
                "chat",
                vec![record("a", "x", vec![1.0]), record("b", "y", vec![0.5])],
            )
            .await
            .unwrap();

        let removed = index
            .delete("chat", &["a".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(index.count("chat").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("library.db");

        {
            let index = SqliteIndex::open(&path).await.unwrap();
            index.get_or_create("chat", DistanceMetric::Cosine).await.unwrap();
            index
                .upsert("chat", vec![record("a", "durable", vec![0.25, -0.5])])
                .await
                .unwrap();
        }

        let index = SqliteIndex::open(&path).await.unwrap();
        let hits = index.query("chat", &[vec![0.25, -0.5]], 1).await.unwrap();
        assert_eq!(hits[0][0].document, "durable");
        assert!(hits[0][0].distance.abs() < 1e-6);
    }

    #[tokio::test]
    async fn corrupt_metadata_is_query_error() {
        let index = test_index().await;
        index.get_or_create("chat", DistanceMetric::Cosine).await.unwrap();
        index
            .upsert("chat", vec![record("a", "x", vec![1.0, 0.0])])
            .await
            .unwrap();
        sqlx::query("UPDATE embeddings SET metadata = 'not json' WHERE id = 'a'")
            .execute(&index.pool)
            .await
            .unwrap();

        let err = index.query("chat", &[vec![1.0, 0.0]], 1).await.unwrap_err();
        assert!(matches!(err, IndexError::QueryFailed(ref m) if m.contains("'a'")));
    }

    #[test]
    fn embedding_blob_round_trip() {
        let v = vec![0.1f32, -2.5, 1e-7, 3.0];
        let blob = SqliteIndex::embedding_to_blob(&v);
        assert_eq!(blob.len(), 16);
        assert_eq!(SqliteIndex::blob_to_embedding(&blob), v);
    }

    #[tokio::test]
    async fn index_name() {
        assert_eq!(test_index().await.name(), "sqlite");
    }
}
