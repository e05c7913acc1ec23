//! MCP server registry and filesystem-server indexing.
//!
//! The registry file uses the ecosystem-standard `mcpServers` JSON shape
//! so it can be shared with other MCP-aware tools. Indexing only works
//! for filesystem servers, whose served root is the last `args` element;
//! other server types are listed but skipped.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::docs::{collect_files, process_file};
use crate::indexer::{IndexOutcome, Indexer};
use crate::models::IndexReport;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServer {
    pub command: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct McpRegistry {
    #[serde(rename = "mcpServers", default)]
    pub servers: BTreeMap<String, McpServer>,
}

impl McpRegistry {
    /// Register or replace a server entry.
    pub fn add(&mut self, name: &str, command: &str, args: Vec<String>) {
        self.servers.insert(
            name.to_string(),
            McpServer {
                command: command.to_string(),
                args,
                env: BTreeMap::new(),
            },
        );
    }

    pub fn remove(&mut self, name: &str) -> Result<()> {
        if self.servers.remove(name).is_none() {
            bail!("MCP server '{}' not found", name);
        }
        Ok(())
    }
}

/// A missing registry file is an empty registry, not an error.
pub fn load_registry(path: &Path) -> Result<McpRegistry> {
    if !path.exists() {
        return Ok(McpRegistry::default());
    }
    let text =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("Invalid MCP registry {}", path.display()))
}

pub fn save_registry(path: &Path, registry: &McpRegistry) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let text = serde_json::to_string_pretty(registry)?;
    fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

pub fn is_filesystem_server(name: &str, server: &McpServer) -> bool {
    name.contains("filesystem")
        || server.args.iter().any(|arg| arg.contains("server-filesystem"))
}

/// The served root is the last argument, per the
/// `npx -y @modelcontextprotocol/server-filesystem <path>` convention.
fn server_root(server: &McpServer) -> Option<PathBuf> {
    let last = server.args.last()?;
    if let Some(rest) = last.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return Some(home.join(rest));
        }
    }
    Some(PathBuf::from(last))
}

/// Index every supported file under a filesystem server's root into
/// `collection` (default `mcp_{name}`), tagging each document with the
/// server it came from.
pub async fn index_server(
    indexer: &Indexer<'_>,
    registry: &McpRegistry,
    name: &str,
    collection: Option<String>,
) -> Result<IndexReport> {
    let server = registry
        .servers
        .get(name)
        .with_context(|| format!("MCP server '{}' not found", name))?;
    if server.args.len() < 2 {
        bail!("Invalid filesystem server configuration for '{}'", name);
    }
    let root = match server_root(server) {
        Some(root) if root.exists() => root,
        Some(root) => bail!("Path not found: {}", root.display()),
        None => bail!("Invalid filesystem server configuration for '{}'", name),
    };
    let collection = collection.unwrap_or_else(|| format!("mcp_{}", name));

    let files = collect_files(&root, None)?;
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
        let meta = meta.with("mcp_server", name).with("indexed_via", "mcp");

        let doc_id = path.to_string_lossy().to_string();
        match indexer
            .index_document(&collection, &content, meta, Some(doc_id), true)
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

/// Index every registered filesystem server; other server types are
/// skipped with a note. One failing server does not stop the rest.
pub async fn index_all(
    indexer: &Indexer<'_>,
    registry: &McpRegistry,
) -> Result<Vec<(String, IndexReport)>> {
    let mut reports = Vec::new();
    for (name, server) in &registry.servers {
        if !is_filesystem_server(name, server) {
            println!("  Skipping '{}' (not a filesystem server)", name);
            continue;
        }
        println!("Indexing MCP server '{}'...", name);
        match index_server(indexer, registry, name, None).await {
            Ok(report) => reports.push((name.clone(), report)),
            Err(e) => eprintln!("Warning: Failed to index MCP server '{}': {:#}", name, e),
        }
    }
    Ok(reports)
}

pub fn print_servers(registry: &McpRegistry) {
    if registry.servers.is_empty() {
        println!("No MCP servers installed");
        return;
    }
    println!("Installed MCP servers:");
    for (name, server) in &registry.servers {
        println!("  {}", name);
        println!("    Command: {}", server.command);
        if !server.args.is_empty() {
            println!("    Args: {}", server.args.join(" "));
        }
    }
}
