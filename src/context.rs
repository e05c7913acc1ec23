//! Token-budgeted context assembly for LLM prompts.
//!
//! Retrieval results are folded into one labeled context string, highest
//! score first, until the next chunk would blow the token budget. Chunks
//! are included whole or not at all.

use anyhow::Result;

use crate::config::{EmbeddingConfig, RagConfig};
use crate::models::SourceRef;
use crate::retriever::{RetrieveOptions, Retriever};
use crate::store::{MetaFilter, VectorStore};
use crate::tokens::count_tokens;

/// The assembled context plus the parallel citation list.
///
/// `sources[i].index` is the 1-based `[Source N: ...]` label embedded in
/// `context`, in the same order.
#[derive(Debug)]
pub struct BuiltContext {
    pub context: String,
    pub sources: Vec<SourceRef>,
}

impl BuiltContext {
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// Retrieve for `query` and pack results into a context string within
/// `max_tokens` (defaulting to the configured budget).
pub async fn build_context(
    store: &dyn VectorStore,
    embedding: &EmbeddingConfig,
    rag: &RagConfig,
    query: &str,
    collections: Option<Vec<String>>,
    max_tokens: Option<usize>,
) -> Result<BuiltContext> {
    let retriever = Retriever::new(store, embedding, rag);
    let opts = RetrieveOptions {
        collections,
        top_k: None,
        filter: MetaFilter::new(),
    };
    let results = retriever.retrieve(query, &opts).await?;

    let budget = max_tokens.unwrap_or(rag.max_context_tokens);
    let mut parts: Vec<String> = Vec::new();
    let mut sources: Vec<SourceRef> = Vec::new();
    let mut used = 0usize;

    for result in results {
        let cost = count_tokens(&result.content);
        if used + cost > budget {
            break;
        }
        used += cost;

        let index = parts.len() + 1;
        parts.push(format!(
            "[Source {}: {}]\n{}",
            index, result.meta.source, result.content
        ));
        sources.push(SourceRef {
            index,
            source: result.meta.source.clone(),
            relevance: result.score,
            meta: result.meta,
        });
    }

    Ok(BuiltContext {
        context: parts.join("\n---\n"),
        sources,
    })
}

/// CLI entry point for `context`.
pub async fn run_context(
    store: &dyn VectorStore,
    embedding: &EmbeddingConfig,
    rag: &RagConfig,
    query: &str,
    collections: Option<Vec<String>>,
    max_tokens: Option<usize>,
) -> Result<()> {
    let built = build_context(store, embedding, rag, query, collections, max_tokens).await?;

    if built.is_empty() {
        println!("No relevant context found.");
        return Ok(());
    }

    println!("{}", built.context);
    println!();
    println!("Sources:");
    for source in &built.sources {
        println!(
            "  {}. {} (relevance: {:.3})",
            source.index, source.source, source.relevance
        );
    }
    Ok(())
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

    const BEST: &str = "rust ownership borrowing lifetimes explained in depth";
    const SECOND: &str = "rust ownership basics and some other things entirely";

    async fn seed(store: &MemoryStore, embedding: &EmbeddingConfig, rag: &RagConfig) {
        let indexer = Indexer::new(store, embedding, rag);
        indexer
            .index_document("docs", BEST, DocMeta::new("best.md"), Some("best".into()), true)
            .await;
        indexer
            .index_document("docs", SECOND, DocMeta::new("second.md"), Some("second".into()), true)
            .await;
    }

    #[tokio::test]
    async fn test_empty_store_builds_empty_context() {
        let store = MemoryStore::new();
        let (embedding, rag) = configs();
        let built = build_context(&store, &embedding, &rag, "anything", None, None)
            .await
            .unwrap();
        assert!(built.is_empty());
        assert_eq!(built.context, "");
    }

    #[tokio::test]
    async fn test_labels_and_source_list_align() {
        let store = MemoryStore::new();
        let (embedding, rag) = configs();
        seed(&store, &embedding, &rag).await;

        let built = build_context(&store, &embedding, &rag, BEST, None, Some(10_000))
            .await
            .unwrap();

        assert_eq!(built.sources.len(), 2);
        assert!(built.context.starts_with("[Source 1: best.md]\n"));
        assert!(built.context.contains("\n---\n[Source 2: second.md]\n"));
        assert_eq!(built.sources[0].index, 1);
        assert_eq!(built.sources[0].source, "best.md");
        assert_eq!(built.sources[1].index, 2);
        assert!(built.sources[0].relevance >= built.sources[1].relevance);
    }

    #[tokio::test]
    async fn test_budget_is_never_exceeded() {
        let store = MemoryStore::new();
        let (embedding, rag) = configs();
        seed(&store, &embedding, &rag).await;

        for budget in [1usize, 5, 10, 20, 100] {
            let built = build_context(&store, &embedding, &rag, BEST, None, Some(budget))
                .await
                .unwrap();
            let total: usize = built
                .context
                .split("\n---\n")
                .filter(|part| !part.is_empty())
                .map(|part| {
                    let content = part.splitn(2, '\n').nth(1).unwrap_or("");
                    count_tokens(content)
                })
                .sum();
            assert!(total <= budget, "budget {} exceeded: {}", budget, total);
        }
    }

    #[tokio::test]
    async fn test_budget_caps_to_prefix() {
        let store = MemoryStore::new();
        let (embedding, rag) = configs();
        seed(&store, &embedding, &rag).await;

        // Room for exactly the top chunk: the second would overflow.
        let budget = count_tokens(BEST);
        let built = build_context(&store, &embedding, &rag, BEST, None, Some(budget))
            .await
            .unwrap();
        assert_eq!(built.sources.len(), 1);
        assert_eq!(built.sources[0].source, "best.md");
    }

    #[tokio::test]
    async fn test_first_chunk_overflow_gives_empty_context() {
        let store = MemoryStore::new();
        let (embedding, rag) = configs();
        seed(&store, &embedding, &rag).await;

        let budget = count_tokens(BEST) - 1;
        let built = build_context(&store, &embedding, &rag, BEST, None, Some(budget))
            .await
            .unwrap();
        assert!(built.is_empty());
        assert_eq!(built.context, "");
    }

    #[tokio::test]
    async fn test_collection_restriction_flows_through() {
        let store = MemoryStore::new();
        let (embedding, rag) = configs();
        seed(&store, &embedding, &rag).await;
        let indexer = Indexer::new(&store, &embedding, &rag);
        indexer
            .index_document("other", BEST, DocMeta::new("copy.md"), Some("copy".into()), true)
            .await;

        let built = build_context(
            &store,
            &embedding,
            &rag,
            BEST,
            Some(vec!["other".to_string()]),
            Some(10_000),
        )
        .await
        .unwrap();
        assert_eq!(built.sources.len(), 1);
        assert_eq!(built.sources[0].source, "copy.md");
    }
}
