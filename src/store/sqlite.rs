//! SQLite-backed vector store.
//!
//! One database file per org (`orgs/<org>/store.db`, WAL mode).
//! Embeddings are stored as little-endian f32 BLOBs and scanned brute
//! force at query time; collections here are small enough that a linear
//! cosine pass beats maintaining an ANN index.

use std::path::Path;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

use super::{distance, meta_matches, ChunkRecord, MetaFilter, QueryHit, StoredChunk, VectorStore};
use crate::models::ChunkMeta;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the store at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .with_context(|| format!("Invalid database path: {}", path.display()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open store at {}", path.display()))?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS collections (
                name TEXT PRIMARY KEY,
                metadata_json TEXT NOT NULL DEFAULT '{}',
                created_at INTEGER NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS chunks (
                collection TEXT NOT NULL REFERENCES collections(name),
                id TEXT NOT NULL,
                doc_id TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                content TEXT NOT NULL,
                metadata_json TEXT NOT NULL,
                embedding BLOB NOT NULL,
                PRIMARY KEY (collection, id)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_doc ON chunks(collection, doc_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM collections WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn require_collection(&self, name: &str) -> Result<()> {
        if !self.collection_exists(name).await? {
            bail!("Unknown collection: {}", name);
        }
        Ok(())
    }
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn create_collection(
        &self,
        name: &str,
        metadata: Option<serde_json::Value>,
    ) -> Result<()> {
        if name.is_empty() {
            bail!("Collection name must not be empty");
        }
        if self.collection_exists(name).await? {
            bail!("Collection already exists: {}", name);
        }
        let metadata_json = match metadata {
            Some(value) => serde_json::to_string(&value)?,
            None => "{}".to_string(),
        };
        sqlx::query("INSERT INTO collections (name, metadata_json, created_at) VALUES (?, ?, ?)")
            .bind(name)
            .bind(metadata_json)
            .bind(Utc::now().timestamp())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        self.require_collection(name).await?;
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM chunks WHERE collection = ?")
            .bind(name)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM collections WHERE name = ?")
            .bind(name)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT name FROM collections ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    async fn count(&self, collection: &str) -> Result<u64> {
        self.require_collection(collection).await?;
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM chunks WHERE collection = ?")
            .bind(collection)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    async fn add(&self, collection: &str, records: Vec<ChunkRecord>) -> Result<()> {
        self.require_collection(collection).await?;
        let mut tx = self.pool.begin().await?;
        for record in &records {
            let metadata_json = serde_json::to_string(&record.meta)?;
            sqlx::query(
                "INSERT OR REPLACE INTO chunks
                 (collection, id, doc_id, chunk_index, content, metadata_json, embedding)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(collection)
            .bind(&record.id)
            .bind(&record.meta.doc_id)
            .bind(record.meta.chunk_index)
            .bind(&record.content)
            .bind(metadata_json)
            .bind(vec_to_blob(&record.embedding))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get(
        &self,
        collection: &str,
        filter: &MetaFilter,
        limit: Option<usize>,
    ) -> Result<Vec<StoredChunk>> {
        self.require_collection(collection).await?;

        // doc_id has its own column and index; other keys are matched
        // against the parsed metadata below.
        let rows = match filter.get("doc_id").and_then(|v| v.as_str()) {
            Some(doc_id) => {
                sqlx::query(
                    "SELECT id, content, metadata_json FROM chunks
                     WHERE collection = ? AND doc_id = ?
                     ORDER BY doc_id, chunk_index",
                )
                .bind(collection)
                .bind(doc_id)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT id, content, metadata_json FROM chunks
                     WHERE collection = ?
                     ORDER BY doc_id, chunk_index",
                )
                .bind(collection)
                .fetch_all(&self.pool)
                .await?
            }
        };

        let mut chunks = Vec::new();
        for row in rows {
            let metadata_json: String = row.get("metadata_json");
            let meta: ChunkMeta = serde_json::from_str(&metadata_json)
                .context("Corrupt chunk metadata in store")?;
            if !meta_matches(&meta, filter) {
                continue;
            }
            chunks.push(StoredChunk {
                id: row.get("id"),
                content: row.get("content"),
                meta,
            });
            if let Some(limit) = limit {
                if chunks.len() >= limit {
                    break;
                }
            }
        }
        Ok(chunks)
    }

    async fn delete(&self, collection: &str, ids: &[String]) -> Result<()> {
        self.require_collection(collection).await?;
        let mut tx = self.pool.begin().await?;
        for id in ids {
            sqlx::query("DELETE FROM chunks WHERE collection = ? AND id = ?")
                .bind(collection)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        embedding: &[f32],
        k: usize,
        filter: &MetaFilter,
    ) -> Result<Vec<QueryHit>> {
        self.require_collection(collection).await?;

        let rows = sqlx::query(
            "SELECT id, content, metadata_json, embedding FROM chunks WHERE collection = ?",
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;

        let mut hits = Vec::new();
        for row in rows {
            let metadata_json: String = row.get("metadata_json");
            let meta: ChunkMeta = serde_json::from_str(&metadata_json)
                .context("Corrupt chunk metadata in store")?;
            if !meta_matches(&meta, filter) {
                continue;
            }
            let stored = blob_to_vec(&row.get::<Vec<u8>, _>("embedding"));
            hits.push(QueryHit {
                id: row.get("id"),
                content: row.get("content"),
                meta,
                distance: distance(embedding, &stored),
            });
        }

        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);
        Ok(hits)
    }
}

/// Encode a float vector as little-endian f32 bytes for BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocMeta;
    use crate::store::doc_id_filter;

    fn record(doc_id: &str, index: i64, content: &str, embedding: Vec<f32>) -> ChunkRecord {
        let meta = DocMeta::new(format!("{}.txt", doc_id)).with("type", "text");
        ChunkRecord {
            id: format!("{}_chunk_{}", doc_id, index),
            content: content.to_string(),
            meta: ChunkMeta::from_doc(&meta, doc_id, index),
            embedding,
        }
    }

    async fn open_store(dir: &tempfile::TempDir) -> SqliteStore {
        SqliteStore::open(&dir.path().join("store.db")).await.unwrap()
    }

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        assert_eq!(blob_to_vec(&vec_to_blob(&vec)), vec);
    }

    #[tokio::test]
    async fn test_collection_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;

        assert!(store.list_collections().await.unwrap().is_empty());
        store.create_collection("documents", None).await.unwrap();
        store.create_collection("database", None).await.unwrap();
        assert_eq!(
            store.list_collections().await.unwrap(),
            vec!["database".to_string(), "documents".to_string()]
        );

        // Duplicate create and unknown delete both fail loudly.
        assert!(store.create_collection("documents", None).await.is_err());
        assert!(store.delete_collection("missing").await.is_err());

        store.delete_collection("database").await.unwrap();
        assert_eq!(store.list_collections().await.unwrap(), vec!["documents".to_string()]);
    }

    #[tokio::test]
    async fn test_add_get_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        store.create_collection("documents", None).await.unwrap();

        store
            .add(
                "documents",
                vec![
                    record("a", 0, "first", vec![1.0, 0.0]),
                    record("a", 1, "second", vec![0.9, 0.1]),
                    record("b", 0, "other", vec![0.0, 1.0]),
                ],
            )
            .await
            .unwrap();

        assert_eq!(store.count("documents").await.unwrap(), 3);

        let chunks = store.get("documents", &doc_id_filter("a"), None).await.unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].id, "a_chunk_0");
        assert_eq!(chunks[1].id, "a_chunk_1");

        let limited = store.get("documents", &doc_id_filter("a"), Some(1)).await.unwrap();
        assert_eq!(limited.len(), 1);

        store
            .delete("documents", &["a_chunk_0".to_string(), "a_chunk_1".to_string()])
            .await
            .unwrap();
        assert_eq!(store.count("documents").await.unwrap(), 1);
        assert!(store.get("documents", &doc_id_filter("a"), None).await.unwrap().is_empty());

        // Deleting unknown ids is a no-op.
        store.delete("documents", &["nope".to_string()]).await.unwrap();
        assert_eq!(store.count("documents").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_add_replaces_existing_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        store.create_collection("documents", None).await.unwrap();

        store.add("documents", vec![record("a", 0, "old", vec![1.0, 0.0])]).await.unwrap();
        store.add("documents", vec![record("a", 0, "new", vec![0.0, 1.0])]).await.unwrap();

        assert_eq!(store.count("documents").await.unwrap(), 1);
        let chunks = store.get("documents", &doc_id_filter("a"), None).await.unwrap();
        assert_eq!(chunks[0].content, "new");
    }

    #[tokio::test]
    async fn test_query_orders_by_distance() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        store.create_collection("documents", None).await.unwrap();

        store
            .add(
                "documents",
                vec![
                    record("exact", 0, "exact match", vec![1.0, 0.0]),
                    record("near", 0, "near match", vec![0.9, 0.4]),
                    record("far", 0, "far away", vec![0.0, 1.0]),
                ],
            )
            .await
            .unwrap();

        let hits = store
            .query("documents", &[1.0, 0.0], 10, &MetaFilter::new())
            .await
            .unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].meta.doc_id, "exact");
        assert_eq!(hits[1].meta.doc_id, "near");
        assert_eq!(hits[2].meta.doc_id, "far");
        assert!(hits[0].distance <= hits[1].distance);
        assert!(hits[1].distance <= hits[2].distance);

        let top = store
            .query("documents", &[1.0, 0.0], 1, &MetaFilter::new())
            .await
            .unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].meta.doc_id, "exact");

        let filtered = store
            .query("documents", &[1.0, 0.0], 10, &doc_id_filter("far"))
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].meta.doc_id, "far");
    }

    #[tokio::test]
    async fn test_unknown_collection_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;

        assert!(store.count("nope").await.is_err());
        assert!(store.add("nope", vec![]).await.is_err());
        assert!(store.get("nope", &MetaFilter::new(), None).await.is_err());
        assert!(store.query("nope", &[1.0], 5, &MetaFilter::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");

        {
            let store = SqliteStore::open(&path).await.unwrap();
            store.create_collection("documents", None).await.unwrap();
            store.add("documents", vec![record("a", 0, "persisted", vec![1.0])]).await.unwrap();
        }

        let store = SqliteStore::open(&path).await.unwrap();
        assert_eq!(store.count("documents").await.unwrap(), 1);
        let chunks = store.get("documents", &doc_id_filter("a"), None).await.unwrap();
        assert_eq!(chunks[0].content, "persisted");
    }
}
