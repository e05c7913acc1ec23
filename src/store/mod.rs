//! Vector store abstraction.
//!
//! A [`VectorStore`] persists embedded chunks per collection and answers
//! nearest-neighbor queries. Two backends exist:
//! - **[`sqlite::SqliteStore`]** — the on-disk store used by the CLI.
//! - **[`memory::MemoryStore`]** — an in-memory store for tests.
//!
//! Distances use one convention everywhere: `d = 2 * (1 - cosine)`,
//! which equals squared Euclidean distance for unit vectors. Identical
//! direction is 0, orthogonal is 2, opposite is 4; the retriever maps it
//! back with `similarity = max(0, 1 - d/2)`.

pub mod memory;
pub mod sqlite;

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::ChunkMeta;

/// One embedded chunk ready for storage.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    /// Stable id, `{doc_id}_chunk_{chunk_index}`.
    pub id: String,
    pub content: String,
    pub meta: ChunkMeta,
    pub embedding: Vec<f32>,
}

/// A stored chunk returned from a metadata lookup.
#[derive(Debug, Clone)]
pub struct StoredChunk {
    pub id: String,
    pub content: String,
    pub meta: ChunkMeta,
}

/// A nearest-neighbor match, closest first when returned in sequence.
#[derive(Debug, Clone)]
pub struct QueryHit {
    pub id: String,
    pub content: String,
    pub meta: ChunkMeta,
    pub distance: f32,
}

/// Equality filter over chunk metadata. Keys address the typed fields
/// (`doc_id`, `source`, `chunk_index`) or any extension-map entry.
pub type MetaFilter = BTreeMap<String, serde_json::Value>;

/// Convenience constructor for the most common filter.
pub fn doc_id_filter(doc_id: &str) -> MetaFilter {
    let mut filter = MetaFilter::new();
    filter.insert("doc_id".to_string(), serde_json::Value::String(doc_id.to_string()));
    filter
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create a collection. Fails if one with the same name exists.
    async fn create_collection(
        &self,
        name: &str,
        metadata: Option<serde_json::Value>,
    ) -> Result<()>;

    /// Delete a collection and every chunk in it. Fails if unknown.
    async fn delete_collection(&self, name: &str) -> Result<()>;

    /// Collection names, sorted.
    async fn list_collections(&self) -> Result<Vec<String>>;

    /// Number of chunks in a collection.
    async fn count(&self, collection: &str) -> Result<u64>;

    /// Insert a batch of records in one atomic write. Existing ids are
    /// replaced.
    async fn add(&self, collection: &str, records: Vec<ChunkRecord>) -> Result<()>;

    /// Fetch chunks whose metadata matches every filter entry, in
    /// (doc_id, chunk_index) order.
    async fn get(
        &self,
        collection: &str,
        filter: &MetaFilter,
        limit: Option<usize>,
    ) -> Result<Vec<StoredChunk>>;

    /// Delete chunks by id. Unknown ids are ignored.
    async fn delete(&self, collection: &str, ids: &[String]) -> Result<()>;

    /// The `k` nearest chunks to `embedding`, closest first, optionally
    /// restricted by a metadata filter.
    async fn query(
        &self,
        collection: &str,
        embedding: &[f32],
        k: usize,
        filter: &MetaFilter,
    ) -> Result<Vec<QueryHit>>;
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns `0.0` for empty vectors or vectors of different lengths, so a
/// dimension mismatch degrades to "unrelated" instead of failing a query.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

/// Embedding distance: squared Euclidean for unit vectors.
pub fn distance(a: &[f32], b: &[f32]) -> f32 {
    (2.0 * (1.0 - cosine_similarity(a, b))).max(0.0)
}

/// True when `meta` satisfies every entry of `filter`.
///
/// String-valued filters (the CLI's `--filter k=v` form) compare loosely
/// against numeric and boolean fields, so `chunk_index=0` matches.
pub fn meta_matches(meta: &ChunkMeta, filter: &MetaFilter) -> bool {
    filter.iter().all(|(key, want)| match key.as_str() {
        "doc_id" => want.as_str() == Some(meta.doc_id.as_str()),
        "source" => want.as_str() == Some(meta.source.as_str()),
        "chunk_index" => match want {
            serde_json::Value::Number(n) => n.as_i64() == Some(meta.chunk_index),
            serde_json::Value::String(s) => s.parse::<i64>().ok() == Some(meta.chunk_index),
            _ => false,
        },
        _ => meta.extra.get(key).is_some_and(|have| value_matches(have, want)),
    })
}

fn value_matches(have: &serde_json::Value, want: &serde_json::Value) -> bool {
    if have == want {
        return true;
    }
    match (have, want) {
        (serde_json::Value::Number(n), serde_json::Value::String(s)) => n.to_string() == *s,
        (serde_json::Value::Bool(b), serde_json::Value::String(s)) => b.to_string() == *s,
        _ => false,
    }
}
