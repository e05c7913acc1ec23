//! Core data types shared across the indexing and retrieval pipeline.
//!
//! Documents are never stored whole: the indexer decomposes them into
//! chunks, and every chunk carries a [`ChunkMeta`] combining the parent
//! document's metadata with the identity fields injected at index time
//! (`doc_id`, `chunk_index`). The required fields are typed; everything
//! else rides in an open extension map so domain-specific keys
//! (`file_modified`, `table`, `mcp_server`, ...) survive round-trips.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Metadata supplied by the caller for a document about to be indexed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocMeta {
    /// Human-readable provenance label: a file path, `db.table`, a URL.
    pub source: String,
    /// Open-ended extra fields, preserved verbatim on every chunk.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl DocMeta {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            extra: BTreeMap::new(),
        }
    }

    /// Builder-style insert into the extension map.
    pub fn with(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.extra.insert(key.to_string(), value.into());
        self
    }
}

/// Metadata stored alongside every chunk.
///
/// `doc_id` and `chunk_index` are injected by the indexer; dedup and
/// replace logic key on `doc_id`, so it is a required typed field rather
/// than an entry in the extension map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMeta {
    pub source: String,
    pub doc_id: String,
    pub chunk_index: i64,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ChunkMeta {
    pub fn from_doc(meta: &DocMeta, doc_id: &str, chunk_index: i64) -> Self {
        Self {
            source: meta.source.clone(),
            doc_id: doc_id.to_string(),
            chunk_index,
            extra: meta.extra.clone(),
        }
    }
}

/// One retrieval hit: chunk content plus a normalized similarity score.
///
/// Scores start in `[0, 1]` (clamped cosine); reranking may boost them
/// above 1.0, so they are ordering keys, not probabilities.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub content: String,
    pub meta: ChunkMeta,
    pub score: f32,
}

/// A citation entry parallel to the assembled context string.
///
/// `index` matches the 1-based `[Source N: ...]` label embedded in the
/// context, in the same order.
#[derive(Debug, Clone, Serialize)]
pub struct SourceRef {
    pub index: usize,
    pub source: String,
    pub relevance: f32,
    pub meta: ChunkMeta,
}

/// Outcome of indexing a batch of files.
#[derive(Debug, Default)]
pub struct IndexReport {
    pub indexed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}
