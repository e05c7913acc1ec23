//! # Alcove
//!
//! Org-scoped retrieval-augmented knowledge bases.
//!
//! Alcove indexes documents and relational database schemas into
//! per-organization vector collections, retrieves and reranks chunks by
//! embedding similarity, assembles token-budgeted context for LLM
//! prompts, and can turn a natural-language question into SQL, run it,
//! and explain the rows.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌───────────┐
//! │ Files / DBs  │──▶│ Chunk + Embed│──▶│  SQLite    │
//! │ MCP servers  │   │   Indexer    │   │ per org    │
//! └──────────────┘   └──────────────┘   └─────┬─────┘
//!                                             │
//!                        ┌────────────────────┤
//!                        ▼                    ▼
//!                  ┌───────────┐       ┌───────────┐
//!                  │ Retriever │──────▶│  Context  │──▶ ask / NL-to-SQL
//!                  │  + rerank │       │  builder  │
//!                  └───────────┘       └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! alcove init                          # create the default org
//! alcove index ./docs                  # chunk + embed a directory
//! alcove search "deployment process"   # ranked chunks
//! alcove ask "how do we deploy?"       # grounded LLM answer
//! alcove db index --url data.db        # index a database schema
//! alcove db query --url data.db "how many customers?"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | Global and per-org TOML configuration |
//! | [`org`] | Data-dir layout and org isolation |
//! | [`models`] | Core data types |
//! | [`chunk`] | Word-window text chunking |
//! | [`tokens`] | Token counting for context budgets |
//! | [`embedding`] | Embedding providers (local, ollama, hash) |
//! | [`store`] | Vector store (SQLite on disk, memory for tests) |
//! | [`docs`] | File content extraction and directory walks |
//! | [`indexer`] | Document indexing pipeline |
//! | [`retriever`] | Similarity search, thresholding, rerank |
//! | [`context`] | Token-budgeted context assembly |
//! | [`llm`] | LLM client and one-shot ask |
//! | [`schema`] | Database schema introspection and indexing |
//! | [`nlsql`] | Natural-language-to-SQL pipeline |
//! | [`mcp`] | MCP server registry and indexing |

pub mod chunk;
pub mod config;
pub mod context;
pub mod db_mysql;
pub mod db_postgres;
pub mod db_sqlite;
pub mod docs;
pub mod embedding;
pub mod indexer;
pub mod llm;
pub mod mcp;
pub mod models;
pub mod nlsql;
pub mod org;
pub mod retriever;
pub mod schema;
pub mod store;
pub mod tokens;
