//! In-memory vector store.
//!
//! Mirrors the SQLite backend's semantics without touching disk. Used by
//! unit tests that exercise indexing and retrieval logic.

use std::collections::BTreeMap;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{distance, meta_matches, ChunkRecord, MetaFilter, QueryHit, StoredChunk, VectorStore};

#[derive(Default)]
struct MemCollection {
    #[allow(dead_code)]
    metadata: Option<serde_json::Value>,
    chunks: Vec<ChunkRecord>,
}

#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<BTreeMap<String, MemCollection>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn create_collection(
        &self,
        name: &str,
        metadata: Option<serde_json::Value>,
    ) -> Result<()> {
        if name.is_empty() {
            bail!("Collection name must not be empty");
        }
        let mut collections = self.collections.write().await;
        if collections.contains_key(name) {
            bail!("Collection already exists: {}", name);
        }
        collections.insert(
            name.to_string(),
            MemCollection { metadata, chunks: Vec::new() },
        );
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let mut collections = self.collections.write().await;
        if collections.remove(name).is_none() {
            bail!("Unknown collection: {}", name);
        }
        Ok(())
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        let collections = self.collections.read().await;
        Ok(collections.keys().cloned().collect())
    }

    async fn count(&self, collection: &str) -> Result<u64> {
        let collections = self.collections.read().await;
        match collections.get(collection) {
            Some(c) => Ok(c.chunks.len() as u64),
            None => bail!("Unknown collection: {}", collection),
        }
    }

    async fn add(&self, collection: &str, records: Vec<ChunkRecord>) -> Result<()> {
        let mut collections = self.collections.write().await;
        let Some(c) = collections.get_mut(collection) else {
            bail!("Unknown collection: {}", collection);
        };
        for record in records {
            c.chunks.retain(|existing| existing.id != record.id);
            c.chunks.push(record);
        }
        Ok(())
    }

    async fn get(
        &self,
        collection: &str,
        filter: &MetaFilter,
        limit: Option<usize>,
    ) -> Result<Vec<StoredChunk>> {
        let collections = self.collections.read().await;
        let Some(c) = collections.get(collection) else {
            bail!("Unknown collection: {}", collection);
        };
        let mut chunks: Vec<StoredChunk> = c
            .chunks
            .iter()
            .filter(|record| meta_matches(&record.meta, filter))
            .map(|record| StoredChunk {
                id: record.id.clone(),
                content: record.content.clone(),
                meta: record.meta.clone(),
            })
            .collect();
        chunks.sort_by(|a, b| {
            (&a.meta.doc_id, a.meta.chunk_index).cmp(&(&b.meta.doc_id, b.meta.chunk_index))
        });
        if let Some(limit) = limit {
            chunks.truncate(limit);
        }
        Ok(chunks)
    }

    async fn delete(&self, collection: &str, ids: &[String]) -> Result<()> {
        let mut collections = self.collections.write().await;
        let Some(c) = collections.get_mut(collection) else {
            bail!("Unknown collection: {}", collection);
        };
        c.chunks.retain(|record| !ids.contains(&record.id));
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        embedding: &[f32],
        k: usize,
        filter: &MetaFilter,
    ) -> Result<Vec<QueryHit>> {
        let collections = self.collections.read().await;
        let Some(c) = collections.get(collection) else {
            bail!("Unknown collection: {}", collection);
        };
        let mut hits: Vec<QueryHit> = c
            .chunks
            .iter()
            .filter(|record| meta_matches(&record.meta, filter))
            .map(|record| QueryHit {
                id: record.id.clone(),
                content: record.content.clone(),
                meta: record.meta.clone(),
                distance: distance(embedding, &record.embedding),
            })
            .collect();
        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChunkMeta, DocMeta};
    use crate::store::doc_id_filter;

    fn record(doc_id: &str, index: i64, content: &str, embedding: Vec<f32>) -> ChunkRecord {
        let meta = DocMeta::new(format!("{}.txt", doc_id));
        ChunkRecord {
            id: format!("{}_chunk_{}", doc_id, index),
            content: content.to_string(),
            meta: ChunkMeta::from_doc(&meta, doc_id, index),
            embedding,
        }
    }

    #[tokio::test]
    async fn test_matches_sqlite_semantics() {
        let store = MemoryStore::new();
        store.create_collection("documents", None).await.unwrap();
        assert!(store.create_collection("documents", None).await.is_err());

        store
            .add(
                "documents",
                vec![
                    record("b", 0, "bravo", vec![0.0, 1.0]),
                    record("a", 1, "alpha two", vec![0.5, 0.5]),
                    record("a", 0, "alpha one", vec![1.0, 0.0]),
                ],
            )
            .await
            .unwrap();
        assert_eq!(store.count("documents").await.unwrap(), 3);

        // Ordered by (doc_id, chunk_index) regardless of insertion order.
        let all = store.get("documents", &MetaFilter::new(), None).await.unwrap();
        let ids: Vec<&str> = all.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a_chunk_0", "a_chunk_1", "b_chunk_0"]);

        // Re-adding an id replaces it.
        store.add("documents", vec![record("a", 0, "rewritten", vec![1.0, 0.0])]).await.unwrap();
        assert_eq!(store.count("documents").await.unwrap(), 3);
        let chunks = store.get("documents", &doc_id_filter("a"), Some(1)).await.unwrap();
        assert_eq!(chunks[0].content, "rewritten");

        let hits = store
            .query("documents", &[1.0, 0.0], 2, &MetaFilter::new())
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].meta.doc_id, "a");

        store.delete("documents", &["b_chunk_0".to_string()]).await.unwrap();
        assert_eq!(store.count("documents").await.unwrap(), 2);

        assert!(store.count("missing").await.is_err());
        store.delete_collection("documents").await.unwrap();
        assert!(store.list_collections().await.unwrap().is_empty());
    }
}
