//! Org handling and on-disk layout.
//!
//! All state lives under a single data directory (default `~/.alcove`):
//!
//! ```text
//! <data-dir>/
//!   config.toml          global LLM + embedding settings
//!   mcp_servers.json     registered MCP servers
//!   orgs/<org>/
//!     rag.toml           per-org retrieval settings
//!     store.db           per-org vector store
//! ```
//!
//! Orgs are fully isolated from each other; nothing is shared below the
//! global config.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::config::{load_rag_config, save_rag_config, RagConfig};
use crate::store::sqlite::SqliteStore;

/// Resolve the data directory from the `--data-dir` flag or the default
/// `~/.alcove`.
pub fn resolve_data_dir(flag: Option<&Path>) -> Result<PathBuf> {
    match flag {
        Some(path) => Ok(path.to_path_buf()),
        None => {
            let home = dirs::home_dir().context("Could not determine home directory")?;
            Ok(home.join(".alcove"))
        }
    }
}

pub fn global_config_path(data_dir: &Path) -> PathBuf {
    data_dir.join("config.toml")
}

pub fn mcp_registry_path(data_dir: &Path) -> PathBuf {
    data_dir.join("mcp_servers.json")
}

/// Org ids become directory names, so only ASCII letters, digits, `-`
/// and `_` are allowed.
pub fn validate_org_id(id: &str) -> Result<()> {
    if id.is_empty() {
        bail!("Org id must not be empty");
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        bail!(
            "Invalid org id '{}'. Use ASCII letters, digits, '-' or '_'.",
            id
        );
    }
    Ok(())
}

/// An opened org: its directory exists and its retrieval config is loaded.
pub struct Org {
    pub id: String,
    dir: PathBuf,
    pub rag: RagConfig,
}

impl Org {
    /// Open (creating if needed) the org under `data_dir`.
    pub fn open(data_dir: &Path, id: &str) -> Result<Self> {
        validate_org_id(id)?;
        let dir = data_dir.join("orgs").join(id);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create org directory {}", dir.display()))?;
        let rag = load_rag_config(&dir.join("rag.toml"))?;
        Ok(Self {
            id: id.to_string(),
            dir,
            rag,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn rag_config_path(&self) -> PathBuf {
        self.dir.join("rag.toml")
    }

    pub fn store_path(&self) -> PathBuf {
        self.dir.join("store.db")
    }

    pub async fn open_store(&self) -> Result<SqliteStore> {
        SqliteStore::open(&self.store_path()).await
    }

    /// Persist the in-memory retrieval config back to `rag.toml`.
    pub fn save_rag(&self) -> Result<()> {
        save_rag_config(&self.rag_config_path(), &self.rag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_org_id() {
        assert!(validate_org_id("default").is_ok());
        assert!(validate_org_id("acme-corp_2").is_ok());
        assert!(validate_org_id("").is_err());
        assert!(validate_org_id("has space").is_err());
        assert!(validate_org_id("dots.bad").is_err());
        assert!(validate_org_id("../escape").is_err());
    }

    #[test]
    fn test_open_creates_layout_and_persists_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let org = Org::open(dir.path(), "acme").unwrap();

        assert!(org.dir().is_dir());
        assert!(org.rag_config_path().is_file());
        assert_eq!(org.rag, RagConfig::default());
        assert_eq!(org.store_path(), dir.path().join("orgs/acme/store.db"));
    }

    #[test]
    fn test_config_edits_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();

        let mut org = Org::open(dir.path(), "acme").unwrap();
        org.rag.set("top_k_results", "9").unwrap();
        org.save_rag().unwrap();

        let reopened = Org::open(dir.path(), "acme").unwrap();
        assert_eq!(reopened.rag.top_k_results, 9);
    }

    #[test]
    fn test_orgs_are_isolated() {
        let dir = tempfile::tempdir().unwrap();

        let mut a = Org::open(dir.path(), "a").unwrap();
        a.rag.set("chunk_size", "123").unwrap();
        a.save_rag().unwrap();

        let b = Org::open(dir.path(), "b").unwrap();
        assert_eq!(b.rag.chunk_size, RagConfig::default().chunk_size);
    }
}
