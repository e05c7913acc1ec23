//! # Alcove CLI (`alcove`)
//!
//! Command-line interface over the Alcove library: per-organization
//! document and database-schema indexing, retrieval, context assembly,
//! grounded asking, and natural-language SQL.
//!
//! ## Usage
//!
//! ```bash
//! alcove [--data-dir <dir>] [--org <id>] <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `alcove init` | Create the org's store and persist default config |
//! | `alcove index <path>` | Index a file or directory into a collection |
//! | `alcove search "<query>"` | Print ranked matching chunks |
//! | `alcove context "<query>"` | Print the assembled LLM context |
//! | `alcove ask "<question>"` | Answer a question grounded in the knowledge base |
//! | `alcove collections ...` | List, create, or delete collections |
//! | `alcove stats` | Per-collection chunk counts |
//! | `alcove clear --yes` | Delete every collection in the org |
//! | `alcove config ...` | Show or set per-org retrieval tunables |
//! | `alcove db index --url <url>` | Index a database schema into documents |
//! | `alcove db query --url <url> "<question>"` | NL-to-SQL with insights |
//! | `alcove mcp ...` | Manage and index MCP servers |

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use alcove::config;
use alcove::context::run_context;
use alcove::docs::process_file;
use alcove::indexer::{IndexOutcome, Indexer};
use alcove::llm::{run_ask, AnthropicClient};
use alcove::mcp;
use alcove::nlsql::{self, QueryOptions};
use alcove::org::{self, Org};
use alcove::retriever::{run_search, RetrieveOptions};
use alcove::schema::{index_database, AnyDatabase, SchemaIndexOptions};
use alcove::store::{MetaFilter, VectorStore};

/// Alcove — org-scoped retrieval-augmented knowledge bases.
///
/// All state lives under the data directory (default `~/.alcove`),
/// partitioned per organization. Every command operates on the org named
/// by `--org`.
#[derive(Parser)]
#[command(
    name = "alcove",
    about = "Org-scoped RAG: index documents and database schemas, search, and ask",
    version
)]
struct Cli {
    /// Data directory holding config and all org stores.
    ///
    /// Defaults to `~/.alcove`.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Organization to operate on.
    #[arg(long, global = true, default_value = "default")]
    org: String,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the organization.
    ///
    /// Creates the org directory, persists default configuration, and
    /// opens the vector store once so the database file exists.
    /// Idempotent.
    Init,

    /// Index a file or a directory tree.
    ///
    /// Files are chunked, embedded, and written to the collection.
    /// Directories are walked recursively (skipping `.git`, `target`,
    /// `node_modules`, `__pycache__`, `.venv`), indexing every supported
    /// file type. Unchanged files are skipped on re-index.
    Index {
        /// File or directory to index.
        path: PathBuf,

        /// Target collection.
        #[arg(long, default_value = "documents")]
        collection: String,

        /// Document id override (single file only); defaults to the path.
        #[arg(long)]
        doc_id: Option<String>,

        /// Restrict a directory walk to these extensions (e.g. `md,txt`).
        #[arg(long, value_delimiter = ',')]
        types: Option<Vec<String>>,

        /// Skip documents that are already indexed instead of updating them.
        #[arg(long)]
        no_update: bool,
    },

    /// Search indexed chunks by similarity.
    Search {
        /// The search query.
        query: String,

        /// Collections to search (default: all).
        #[arg(long, value_delimiter = ',')]
        collections: Option<Vec<String>>,

        /// Maximum results (default: configured top_k_results).
        #[arg(long)]
        top_k: Option<usize>,

        /// Metadata equality filter, repeatable (e.g. `--filter type=pdf`).
        #[arg(long = "filter", value_parser = parse_key_val)]
        filters: Vec<(String, String)>,
    },

    /// Assemble and print the context that would be sent to the LLM.
    Context {
        /// The query to build context for.
        query: String,

        /// Collections to draw from (default: all).
        #[arg(long, value_delimiter = ',')]
        collections: Option<Vec<String>>,

        /// Token budget override (default: configured max_context_tokens).
        #[arg(long)]
        max_tokens: Option<usize>,
    },

    /// Ask a question answered from the knowledge base.
    ///
    /// Builds context, sends it with the question to the configured LLM,
    /// and prints the answer with cited sources. Requires the API key
    /// environment variable named in the global config.
    Ask {
        /// The question to answer.
        question: String,

        /// Collections to draw from (default: all).
        #[arg(long, value_delimiter = ',')]
        collections: Option<Vec<String>>,
    },

    /// Manage collections.
    Collections {
        #[command(subcommand)]
        action: CollectionsAction,
    },

    /// Show per-collection chunk counts.
    Stats,

    /// Delete every collection in the organization.
    Clear {
        /// Confirm the deletion.
        #[arg(long)]
        yes: bool,
    },

    /// Show or change per-org retrieval settings.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Index database schemas and run natural-language queries.
    Db {
        #[command(subcommand)]
        action: DbAction,
    },

    /// Manage MCP servers and index their content.
    Mcp {
        #[command(subcommand)]
        action: McpAction,
    },
}

#[derive(Subcommand)]
enum CollectionsAction {
    /// List collection names.
    List,
    /// Create an empty collection.
    Create {
        /// Collection name.
        name: String,
    },
    /// Delete a collection and everything in it.
    Delete {
        /// Collection name.
        name: String,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the org's retrieval settings.
    Show,
    /// Set one retrieval setting and persist it.
    ///
    /// Keys: max_context_tokens, top_k_results, similarity_threshold,
    /// chunk_size, chunk_overlap, rerank.
    Set {
        /// Setting name.
        key: String,
        /// New value.
        value: String,
    },
}

#[derive(Subcommand)]
enum DbAction {
    /// Introspect a database and index its schema as documents.
    ///
    /// Writes one overview document, one schema document per table, and
    /// (unless --sample-rows 0) one sample-data document per non-empty
    /// table. Re-indexing updates the documents in place.
    Index {
        /// Database URL: `sqlite:<path>` (or a bare path),
        /// `postgres://...`, or `mysql://...`.
        #[arg(long)]
        url: String,

        /// Only index these tables (default: all base tables).
        #[arg(long, value_delimiter = ',')]
        tables: Option<Vec<String>>,

        /// Rows per sample-data document; 0 disables samples.
        #[arg(long, default_value_t = 5)]
        sample_rows: usize,

        /// Target collection.
        #[arg(long, default_value = "database")]
        collection: String,
    },

    /// Answer a natural-language question by generating and running SQL.
    ///
    /// Retrieves the indexed schema, asks the LLM for a SQL statement,
    /// executes it, and asks the LLM to explain the rows. Requires the
    /// schema to be indexed first (`alcove db index`).
    Query {
        /// Database URL (same forms as `db index`).
        #[arg(long)]
        url: String,

        /// The question to answer.
        question: String,

        /// Collection holding the schema documents.
        #[arg(long, default_value = "database")]
        collection: String,

        /// Row cap for the result set handed to insight generation.
        #[arg(long, default_value_t = 100)]
        max_rows: usize,
    },
}

#[derive(Subcommand)]
enum McpAction {
    /// Register an MCP server.
    Add {
        /// Server name.
        name: String,
        /// Launch command (e.g. `npx`).
        command: String,
        /// Command arguments; for filesystem servers the last one is the
        /// served root path.
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Remove a registered server.
    Remove {
        /// Server name.
        name: String,
    },
    /// List registered servers.
    List,
    /// Index the content served by filesystem servers.
    Index {
        /// Server to index; omit with --all to index every server.
        name: Option<String>,

        /// Index every registered filesystem server.
        #[arg(long)]
        all: bool,

        /// Target collection (default: `mcp_<name>`).
        #[arg(long)]
        collection: Option<String>,
    },
}

/// Parse a `key=value` pair for `--filter` arguments.
fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no '=' found in '{}'", s))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let data_dir = org::resolve_data_dir(cli.data_dir.as_deref())?;
    let global = config::load_global_config(&org::global_config_path(&data_dir))?;
    let mut org = Org::open(&data_dir, &cli.org)?;
    let store = org.open_store().await?;

    match cli.command {
        Commands::Init => {
            println!("Initialized org '{}' at {}", org.id, org.dir().display());
        }

        Commands::Index {
            path,
            collection,
            doc_id,
            types,
            no_update,
        } => {
            let indexer = Indexer::new(&store, &global.embedding, &org.rag);
            if path.is_dir() {
                if doc_id.is_some() {
                    bail!("--doc-id only applies when indexing a single file");
                }
                let report = indexer
                    .index_directory(&collection, &path, types.as_deref(), !no_update)
                    .await?;
                println!();
                println!(
                    "Indexed {} files ({} skipped, {} failed)",
                    report.indexed, report.skipped, report.failed
                );
            } else {
                let (content, meta) = process_file(&path)?;
                let doc_id = doc_id.unwrap_or_else(|| path.to_string_lossy().to_string());
                match indexer
                    .index_document(&collection, &content, meta, Some(doc_id), !no_update)
                    .await
                {
                    IndexOutcome::Indexed { chunks } => {
                        println!("Indexed: {} ({} chunks)", path.display(), chunks)
                    }
                    IndexOutcome::Skipped => {
                        println!("Skipped: {} (up to date)", path.display())
                    }
                    IndexOutcome::Failed { error } => {
                        bail!("Failed to index {}: {}", path.display(), error)
                    }
                }
            }
        }

        Commands::Search {
            query,
            collections,
            top_k,
            filters,
        } => {
            let mut filter = MetaFilter::new();
            for (key, value) in filters {
                filter.insert(key, serde_json::Value::String(value));
            }
            let opts = RetrieveOptions {
                collections,
                top_k,
                filter,
            };
            run_search(&store, &global.embedding, &org.rag, &query, &opts).await?;
        }

        Commands::Context {
            query,
            collections,
            max_tokens,
        } => {
            run_context(
                &store,
                &global.embedding,
                &org.rag,
                &query,
                collections,
                max_tokens,
            )
            .await?;
        }

        Commands::Ask {
            question,
            collections,
        } => {
            run_ask(
                &store,
                &global.embedding,
                &org.rag,
                &global.llm,
                &question,
                collections,
            )
            .await?;
        }

        Commands::Collections { action } => match action {
            CollectionsAction::List => {
                let collections = store.list_collections().await?;
                if collections.is_empty() {
                    println!("No collections.");
                } else {
                    println!("Collections:");
                    for name in collections {
                        println!("  {}", name);
                    }
                }
            }
            CollectionsAction::Create { name } => {
                store.create_collection(&name, None).await?;
                println!("Created collection '{}'", name);
            }
            CollectionsAction::Delete { name } => {
                store.delete_collection(&name).await?;
                println!("Deleted collection '{}'", name);
            }
        },

        Commands::Stats => {
            let indexer = Indexer::new(&store, &global.embedding, &org.rag);
            let stats = indexer.get_stats().await?;
            if stats.is_empty() {
                println!("No collections.");
            } else {
                println!("Collections:");
                let mut total = 0u64;
                for (name, count) in &stats {
                    println!("  {}: {} chunks", name, count);
                    total += count;
                }
                println!("Total: {} chunks in {} collections", total, stats.len());
            }
        }

        Commands::Clear { yes } => {
            if !yes {
                bail!(
                    "This deletes every collection in org '{}'. Re-run with --yes to confirm.",
                    org.id
                );
            }
            let indexer = Indexer::new(&store, &global.embedding, &org.rag);
            let removed = indexer.clear_all().await?;
            println!("Cleared {} collections", removed);
        }

        Commands::Config { action } => match action {
            ConfigAction::Show => {
                println!("# {}", org.rag_config_path().display());
                print!("{}", toml::to_string_pretty(&org.rag)?);
            }
            ConfigAction::Set { key, value } => {
                org.rag.set(&key, &value)?;
                org.save_rag()?;
                println!("Set {} = {}", key, value);
            }
        },

        Commands::Db { action } => match action {
            DbAction::Index {
                url,
                tables,
                sample_rows,
                collection,
            } => {
                let indexer = Indexer::new(&store, &global.embedding, &org.rag);
                let db = AnyDatabase::connect(&url).await?;
                let opts = SchemaIndexOptions {
                    tables,
                    sample_rows,
                    collection: collection.clone(),
                };
                let report = index_database(&indexer, db.source(), &opts).await?;

                println!(
                    "Indexed database '{}' into collection '{}'",
                    report.database, collection
                );
                println!(
                    "  {} tables, {} documents",
                    report.tables.len(),
                    report.documents
                );
                for (table, error) in &report.failed {
                    eprintln!("Warning: {}: {}", table, error);
                }
            }
            DbAction::Query {
                url,
                question,
                collection,
                max_rows,
            } => {
                // Resolve credentials before touching the database.
                let client = AnthropicClient::from_config(&global.llm)?;
                let db = AnyDatabase::connect(&url).await?;
                let opts = QueryOptions {
                    collection,
                    max_rows,
                };
                let outcome = nlsql::run_query(
                    &store,
                    &global.embedding,
                    &org.rag,
                    &client,
                    db.source(),
                    &question,
                    &opts,
                )
                .await?;
                nlsql::print_outcome(&outcome);
                if let Some(error) = outcome.error {
                    bail!("{}", error);
                }
            }
        },

        Commands::Mcp { action } => {
            let registry_path = org::mcp_registry_path(&data_dir);
            match action {
                McpAction::Add {
                    name,
                    command,
                    args,
                } => {
                    let mut registry = mcp::load_registry(&registry_path)?;
                    registry.add(&name, &command, args);
                    mcp::save_registry(&registry_path, &registry)?;
                    println!("Added MCP server '{}'", name);
                }
                McpAction::Remove { name } => {
                    let mut registry = mcp::load_registry(&registry_path)?;
                    registry.remove(&name)?;
                    mcp::save_registry(&registry_path, &registry)?;
                    println!("Removed MCP server '{}'", name);
                }
                McpAction::List => {
                    mcp::print_servers(&mcp::load_registry(&registry_path)?);
                }
                McpAction::Index {
                    name,
                    all,
                    collection,
                } => {
                    let registry = mcp::load_registry(&registry_path)?;
                    let indexer = Indexer::new(&store, &global.embedding, &org.rag);
                    if all {
                        let reports = mcp::index_all(&indexer, &registry).await?;
                        println!();
                        for (server, report) in &reports {
                            println!(
                                "{}: {} indexed, {} skipped, {} failed",
                                server, report.indexed, report.skipped, report.failed
                            );
                        }
                    } else {
                        let name =
                            name.context("Provide a server name, or --all for every server")?;
                        let report =
                            mcp::index_server(&indexer, &registry, &name, collection).await?;
                        println!();
                        println!(
                            "Indexed {} files ({} skipped, {} failed)",
                            report.indexed, report.skipped, report.failed
                        );
                    }
                }
            }
        }
    }

    Ok(())
}
