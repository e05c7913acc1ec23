//! Document indexing: chunk, embed, and write into the vector store.
//!
//! Replacement semantics: re-indexing a known `doc_id` deletes every
//! existing chunk for that id before inserting the new set, so a shorter
//! document never leaves stale tail chunks behind. Deletion runs before
//! the new insert; if embedding or the insert fails the document is left
//! un-indexed rather than half-replaced.

use std::path::Path;

use anyhow::{bail, Result};
use chrono::Utc;

use crate::chunk::chunk_words;
use crate::config::{EmbeddingConfig, RagConfig};
use crate::docs::{collect_files, process_file};
use crate::embedding::embed_texts;
use crate::models::{ChunkMeta, DocMeta, IndexReport};
use crate::store::{doc_id_filter, ChunkRecord, VectorStore};

/// Per-document indexing outcome.
#[derive(Debug)]
pub enum IndexOutcome {
    Indexed { chunks: usize },
    /// Successful no-op: the document is already present and up to date.
    Skipped,
    Failed { error: String },
}

pub struct Indexer<'a> {
    store: &'a dyn VectorStore,
    embedding: &'a EmbeddingConfig,
    rag: &'a RagConfig,
}

impl<'a> Indexer<'a> {
    pub fn new(
        store: &'a dyn VectorStore,
        embedding: &'a EmbeddingConfig,
        rag: &'a RagConfig,
    ) -> Self {
        Self {
            store,
            embedding,
            rag,
        }
    }

    /// Create `name` if it does not exist yet. Indexing into a fresh
    /// collection never requires a separate create step.
    pub async fn ensure_collection(&self, name: &str) -> Result<()> {
        if !self.store.list_collections().await?.contains(&name.to_string()) {
            self.store.create_collection(name, None).await?;
        }
        Ok(())
    }

    /// Create a collection, reporting failure as `false` instead of an error.
    pub async fn create_collection(&self, name: &str) -> bool {
        match self.store.create_collection(name, None).await {
            Ok(()) => true,
            Err(e) => {
                eprintln!("Warning: Failed to create collection '{}': {:#}", name, e);
                false
            }
        }
    }

    /// Delete a collection and its chunks, reporting failure as `false`.
    pub async fn delete_collection(&self, name: &str) -> bool {
        match self.store.delete_collection(name).await {
            Ok(()) => true,
            Err(e) => {
                eprintln!("Warning: Failed to delete collection '{}': {:#}", name, e);
                false
            }
        }
    }

    /// Index one document. Never returns an error; failures are folded
    /// into the outcome so directory walks can keep going.
    pub async fn index_document(
        &self,
        collection: &str,
        content: &str,
        meta: DocMeta,
        doc_id: Option<String>,
        update_if_exists: bool,
    ) -> IndexOutcome {
        match self
            .try_index(collection, content, meta, doc_id, update_if_exists)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => IndexOutcome::Failed {
                error: format!("{:#}", e),
            },
        }
    }

    async fn try_index(
        &self,
        collection: &str,
        content: &str,
        meta: DocMeta,
        doc_id: Option<String>,
        update_if_exists: bool,
    ) -> Result<IndexOutcome> {
        self.ensure_collection(collection).await?;

        // Without an explicit id two anonymous documents indexed in the
        // same instant would collide, hence microseconds.
        let doc_id = doc_id
            .unwrap_or_else(|| format!("{}_{}", collection, Utc::now().timestamp_micros()));

        let existing = self
            .store
            .get(collection, &doc_id_filter(&doc_id), Some(1))
            .await?;
        if !existing.is_empty() {
            if !update_if_exists {
                return Ok(IndexOutcome::Skipped);
            }
            let unchanged = match (
                meta.extra.get("file_modified"),
                existing[0].meta.extra.get("file_modified"),
            ) {
                (Some(new), Some(old)) => new == old,
                _ => false,
            };
            if unchanged {
                return Ok(IndexOutcome::Skipped);
            }

            let all = self
                .store
                .get(collection, &doc_id_filter(&doc_id), None)
                .await?;
            let ids: Vec<String> = all.into_iter().map(|c| c.id).collect();
            self.store.delete(collection, &ids).await?;
        }

        let chunks = chunk_words(content, self.rag.chunk_size, self.rag.chunk_overlap)?;
        if chunks.is_empty() {
            bail!("Document '{}' has no content to index", doc_id);
        }

        let embeddings = embed_texts(self.embedding, &chunks).await?;
        if embeddings.len() != chunks.len() {
            bail!(
                "Embedding count mismatch: {} chunks, {} vectors",
                chunks.len(),
                embeddings.len()
            );
        }

        let count = chunks.len();
        let records: Vec<ChunkRecord> = chunks
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(i, (content, embedding))| ChunkRecord {
                id: format!("{}_chunk_{}", doc_id, i),
                content,
                meta: ChunkMeta::from_doc(&meta, &doc_id, i as i64),
                embedding,
            })
            .collect();

        self.store.add(collection, records).await?;
        Ok(IndexOutcome::Indexed { chunks: count })
    }

    /// Walk `dir` and index every supported file, printing one line per
    /// file. A failing file is reported and does not stop the walk.
    pub async fn index_directory(
        &self,
        collection: &str,
        dir: &Path,
        types: Option<&[String]>,
        update_if_exists: bool,
    ) -> Result<IndexReport> {
        let files = collect_files(dir, types)?;
        let mut report = IndexReport::default();

        for path in files {
            let (content, meta) = match process_file(&path) {
                Ok(loaded) => loaded,
                Err(e) => {
                    eprintln!("Warning: Failed to read {}: {:#}", path.display(), e);
                    report.failed += 1;
                    report.errors.push(format!("{}: {:#}", path.display(), e));
                    continue;
                }
            };

            let doc_id = path.to_string_lossy().to_string();
            match self
                .index_document(collection, &content, meta, Some(doc_id), update_if_exists)
                .await
            {
                IndexOutcome::Indexed { chunks } => {
                    println!("  Indexed: {} ({} chunks)", path.display(), chunks);
                    report.indexed += 1;
                }
                IndexOutcome::Skipped => {
                    println!("  Skipped: {} (up to date)", path.display());
                    report.skipped += 1;
                }
                IndexOutcome::Failed { error } => {
                    eprintln!("Warning: Failed to index {}: {}", path.display(), error);
                    report.failed += 1;
                    report.errors.push(format!("{}: {}", path.display(), error));
                }
            }
        }

        Ok(report)
    }

    /// Remove every chunk belonging to `doc_id`. Returns how many were
    /// removed; 0 means the document was not present.
    pub async fn delete_document(&self, collection: &str, doc_id: &str) -> Result<u64> {
        let chunks = self
            .store
            .get(collection, &doc_id_filter(doc_id), None)
            .await?;
        if chunks.is_empty() {
            return Ok(0);
        }
        let ids: Vec<String> = chunks.into_iter().map(|c| c.id).collect();
        let count = ids.len() as u64;
        self.store.delete(collection, &ids).await?;
        Ok(count)
    }

    /// Chunk counts per collection, sorted by collection name.
    pub async fn get_stats(&self) -> Result<Vec<(String, u64)>> {
        let mut stats = Vec::new();
        for name in self.store.list_collections().await? {
            let count = self.store.count(&name).await?;
            stats.push((name, count));
        }
        Ok(stats)
    }

    /// Drop every collection. Returns how many were removed.
    pub async fn clear_all(&self) -> Result<usize> {
        let mut removed = 0;
        for name in self.store.list_collections().await? {
            if self.delete_collection(&name).await {
                removed += 1;
            }
        }
        Ok(removed)
    }
}
