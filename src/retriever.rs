//! Semantic search across one or more collections.
//!
//! Raw store distances are converted to similarities via
//! `max(0, 1 - distance/2)`, which maps the distance anchors (0 identical,
//! 2 orthogonal) onto [0, 1]. One convention, applied everywhere; the
//! threshold in `rag.toml` is expressed in the same scale.

use std::collections::HashSet;

use anyhow::Result;

use crate::config::{EmbeddingConfig, RagConfig};
use crate::embedding::embed_query;
use crate::models::ScoredChunk;
use crate::store::{MetaFilter, VectorStore};

/// Convert a store distance into a normalized similarity in [0, 1].
pub fn similarity(distance: f32) -> f32 {
    (1.0 - distance / 2.0).max(0.0)
}

#[derive(Debug, Default)]
pub struct RetrieveOptions {
    /// Restrict the search to these collections; `None` searches all.
    pub collections: Option<Vec<String>>,
    /// Override the configured `top_k_results`.
    pub top_k: Option<usize>,
    /// Metadata predicate applied inside each collection query.
    pub filter: MetaFilter,
}

pub struct Retriever<'a> {
    store: &'a dyn VectorStore,
    embedding: &'a EmbeddingConfig,
    rag: &'a RagConfig,
}

impl<'a> Retriever<'a> {
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

    /// Search the org's knowledge base, highest score first.
    ///
    /// A collection that fails to answer is reported and skipped; the
    /// other collections still contribute. Scores below the configured
    /// similarity threshold are dropped before merging.
    pub async fn retrieve(
        &self,
        query: &str,
        opts: &RetrieveOptions,
    ) -> Result<Vec<ScoredChunk>> {
        let known = self.store.list_collections().await?;
        if known.is_empty() {
            return Ok(Vec::new());
        }
        let targets: Vec<String> = match &opts.collections {
            Some(list) if !list.is_empty() => list.clone(),
            _ => known,
        };

        let top_k = opts.top_k.unwrap_or(self.rag.top_k_results);
        let threshold = self.rag.similarity_threshold as f32;
        let query_vec = embed_query(self.embedding, query).await?;

        let mut results: Vec<ScoredChunk> = Vec::new();
        for name in &targets {
            let hits = match self
                .store
                .query(name, &query_vec, top_k, &opts.filter)
                .await
            {
                Ok(hits) => hits,
                Err(e) => {
                    eprintln!("Warning: Search failed in collection '{}': {:#}", name, e);
                    continue;
                }
            };
            for hit in hits {
                let score = similarity(hit.distance);
                if score >= threshold {
                    results.push(ScoredChunk {
                        content: hit.content,
                        meta: hit.meta,
                        score,
                    });
                }
            }
        }

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        if self.rag.rerank {
            rerank(query, &mut results);
        }
        results.truncate(top_k);
        Ok(results)
    }
}

/// Lexical overlap boost: multiply each score by `1 + 0.1 × |query words
/// ∩ content words|` (case-insensitive, whole words), then re-sort.
///
/// A heuristic, not a learned reranker; deterministic given input.
pub fn rerank(query: &str, results: &mut Vec<ScoredChunk>) {
    let query_lower = query.to_lowercase();
    let query_words: HashSet<&str> = query_lower.split_whitespace().collect();

    for result in results.iter_mut() {
        let content_lower = result.content.to_lowercase();
        let content_words: HashSet<&str> = content_lower.split_whitespace().collect();
        let overlap = query_words.intersection(&content_words).count();
        result.score *= 1.0 + 0.1 * overlap as f32;
    }

    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
}

/// CLI entry point for `search`.
pub async fn run_search(
    store: &dyn VectorStore,
    embedding: &EmbeddingConfig,
    rag: &RagConfig,
    query: &str,
    opts: &RetrieveOptions,
) -> Result<()> {
    let retriever = Retriever::new(store, embedding, rag);
    let results = retriever.retrieve(query, opts).await?;

    if results.is_empty() {
        println!("No results found.");
        return Ok(());
    }

    println!("Found {} results:", results.len());
    for (i, result) in results.iter().enumerate() {
        println!();
        println!(
            "{}. [{:.3}] {} (chunk {})",
            i + 1,
            result.score,
            result.meta.source,
            result.meta.chunk_index
        );
        println!("   {}", snippet(&result.content, 200));
    }
    Ok(())
}

fn snippet(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        flat
    } else {
        let mut cut: String = flat.chars().take(max_chars).collect();
        cut.push_str("...");
        cut
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::Indexer;
    use crate::models::DocMeta;
    use crate::store::memory::MemoryStore;

    fn configs() -> (EmbeddingConfig, RagConfig) {
        let embedding = EmbeddingConfig {
            provider: "hash".to_string(),
            dims: Some(64),
            ..Default::default()
        };
        let rag = RagConfig {
            similarity_threshold: 0.0,
            ..Default::default()
        };
        (embedding, rag)
    }

    async fn seed(store: &MemoryStore, embedding: &EmbeddingConfig, rag: &RagConfig) {
        let indexer = Indexer::new(store, embedding, rag);
        indexer
            .index_document(
                "fruit",
                "apple banana cherry",
                DocMeta::new("fruit.txt"),
                Some("fruit".into()),
                true,
            )
            .await;
        indexer
            .index_document(
                "animals",
                "zebra wombat lemur",
                DocMeta::new("animals.txt"),
                Some("animals".into()),
                true,
            )
            .await;
    }

    #[test]
    fn test_similarity_anchors() {
        assert!((similarity(0.0) - 1.0).abs() < 1e-6);
        assert!(similarity(2.0).abs() < 1e-6);
        // Distances past orthogonal clamp to zero instead of going negative.
        assert_eq!(similarity(4.0), 0.0);
    }

    #[tokio::test]
    async fn test_empty_store_returns_empty() {
        let store = MemoryStore::new();
        let (embedding, rag) = configs();
        let retriever = Retriever::new(&store, &embedding, &rag);
        let results = retriever.retrieve("anything", &RetrieveOptions::default()).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_results_ordered_and_scored() {
        let store = MemoryStore::new();
        let (embedding, rag) = configs();
        seed(&store, &embedding, &rag).await;

        let retriever = Retriever::new(&store, &embedding, &rag);
        let results = retriever
            .retrieve("apple banana cherry", &RetrieveOptions::default())
            .await
            .unwrap();

        assert!(!results.is_empty());
        assert_eq!(results[0].meta.doc_id, "fruit");
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[tokio::test]
    async fn test_threshold_drops_weak_matches() {
        let store = MemoryStore::new();
        let (embedding, mut rag) = configs();
        rag.similarity_threshold = 0.9;
        seed(&store, &embedding, &rag).await;

        let retriever = Retriever::new(&store, &embedding, &rag);
        let results = retriever
            .retrieve("apple banana cherry", &RetrieveOptions::default())
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].meta.doc_id, "fruit");
    }

    #[tokio::test]
    async fn test_collection_restriction() {
        let store = MemoryStore::new();
        let (embedding, rag) = configs();
        seed(&store, &embedding, &rag).await;

        let retriever = Retriever::new(&store, &embedding, &rag);
        let opts = RetrieveOptions {
            collections: Some(vec!["animals".to_string()]),
            ..Default::default()
        };
        let results = retriever.retrieve("apple banana cherry", &opts).await.unwrap();
        assert!(results.iter().all(|r| r.meta.doc_id == "animals"));
    }

    #[tokio::test]
    async fn test_missing_collection_does_not_abort() {
        let store = MemoryStore::new();
        let (embedding, rag) = configs();
        seed(&store, &embedding, &rag).await;

        let retriever = Retriever::new(&store, &embedding, &rag);
        let opts = RetrieveOptions {
            collections: Some(vec!["missing".to_string(), "fruit".to_string()]),
            ..Default::default()
        };
        let results = retriever.retrieve("apple banana cherry", &opts).await.unwrap();
        assert!(!results.is_empty());
        assert!(results.iter().all(|r| r.meta.doc_id == "fruit"));
    }

    #[tokio::test]
    async fn test_top_k_truncates() {
        let store = MemoryStore::new();
        let (embedding, rag) = configs();
        let indexer = Indexer::new(&store, &embedding, &rag);
        for i in 0..6 {
            indexer
                .index_document(
                    "docs",
                    &format!("shared words plus filler{}", i),
                    DocMeta::new(format!("d{}.txt", i)),
                    Some(format!("d{}", i)),
                    true,
                )
                .await;
        }

        let retriever = Retriever::new(&store, &embedding, &rag);
        let opts = RetrieveOptions {
            top_k: Some(2),
            ..Default::default()
        };
        let results = retriever.retrieve("shared words", &opts).await.unwrap();
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_rerank_boosts_lexical_overlap() {
        let meta = crate::models::ChunkMeta {
            source: "s".into(),
            doc_id: "d".into(),
            chunk_index: 0,
            extra: Default::default(),
        };
        let mut results = vec![
            ScoredChunk {
                content: "unrelated words here".into(),
                meta: meta.clone(),
                score: 0.5,
            },
            ScoredChunk {
                content: "ALPHA beta gamma".into(),
                meta: meta.clone(),
                score: 0.5,
            },
        ];

        rerank("alpha beta", &mut results);

        // Two overlapping words move the second chunk to the front.
        assert_eq!(results[0].content, "ALPHA beta gamma");
        assert!((results[0].score - 0.6).abs() < 1e-6);
        assert!((results[1].score - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_rerank_counts_words_not_substrings() {
        let meta = crate::models::ChunkMeta {
            source: "s".into(),
            doc_id: "d".into(),
            chunk_index: 0,
            extra: Default::default(),
        };
        let mut results = vec![ScoredChunk {
            content: "catastrophe".into(),
            meta,
            score: 0.5,
        }];

        rerank("cat", &mut results);
        assert!((results[0].score - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_snippet_truncation() {
        let long = "word ".repeat(100);
        let cut = snippet(&long, 20);
        assert!(cut.ends_with("..."));
        assert_eq!(cut.chars().count(), 23);
        assert_eq!(snippet("short text", 20), "short text");
    }
}
