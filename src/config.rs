use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Global configuration shared by every org: LLM access and the
/// embedding provider. Lives at `<data-dir>/config.toml`; defaults are
/// written there on first use so the file is editable in place.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_llm_max_tokens")]
    pub max_tokens: u32,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Override for the API base URL (proxies, test servers).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_llm_model(),
            max_tokens: default_llm_max_tokens(),
            api_key_env: default_api_key_env(),
            base_url: None,
        }
    }
}

fn default_llm_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}
fn default_llm_max_tokens() -> u32 {
    4096
}
fn default_api_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// One of `local`, `ollama`, `hash`.
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Vector dimensionality. Only the `hash` provider consumes this;
    /// model-backed providers infer it from the model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dims: Option<usize>,
    /// Ollama endpoint (default `http://localhost:11434`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_embedding_provider() -> String {
    "local".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

/// Per-org retrieval tunables. Lives at `orgs/<org>/rag.toml`; defaults
/// are persisted on first use and the file is rewritten on every
/// `config set`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RagConfig {
    /// Token budget for assembled context.
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: usize,
    /// Result count after merging and reranking.
    #[serde(default = "default_top_k_results")]
    pub top_k_results: usize,
    /// Minimum similarity (in [0, 1]) for a chunk to be surfaced.
    /// 0.0 disables the filter.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    /// Words per chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Words shared between consecutive chunks; must be < chunk_size.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    /// Apply the lexical-overlap rerank pass after similarity ranking.
    #[serde(default = "default_rerank")]
    pub rerank: bool,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            max_context_tokens: default_max_context_tokens(),
            top_k_results: default_top_k_results(),
            similarity_threshold: default_similarity_threshold(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            rerank: default_rerank(),
        }
    }
}

fn default_max_context_tokens() -> usize {
    3000
}
fn default_top_k_results() -> usize {
    5
}
fn default_similarity_threshold() -> f64 {
    0.2
}
fn default_chunk_size() -> usize {
    500
}
fn default_chunk_overlap() -> usize {
    50
}
fn default_rerank() -> bool {
    true
}

impl RagConfig {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            bail!("chunk_size must be > 0");
        }
        if self.chunk_overlap >= self.chunk_size {
            bail!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk_overlap,
                self.chunk_size
            );
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            bail!("similarity_threshold must be in [0.0, 1.0]");
        }
        if self.top_k_results == 0 {
            bail!("top_k_results must be >= 1");
        }
        if self.max_context_tokens == 0 {
            bail!("max_context_tokens must be > 0");
        }
        Ok(())
    }

    /// Set one tunable from its string form, then re-validate the whole
    /// config so cross-field rules (overlap < size) hold afterward.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "max_context_tokens" => self.max_context_tokens = parse_num(key, value)?,
            "top_k_results" => self.top_k_results = parse_num(key, value)?,
            "chunk_size" => self.chunk_size = parse_num(key, value)?,
            "chunk_overlap" => self.chunk_overlap = parse_num(key, value)?,
            "similarity_threshold" => {
                self.similarity_threshold = value.parse::<f64>().map_err(|_| {
                    anyhow::anyhow!("similarity_threshold must be a number, got '{}'", value)
                })?
            }
            "rerank" => {
                self.rerank = value
                    .parse::<bool>()
                    .map_err(|_| anyhow::anyhow!("rerank must be true or false, got '{}'", value))?
            }
            other => bail!(
                "Unknown config key '{}'. Valid keys: max_context_tokens, top_k_results, \
                 similarity_threshold, chunk_size, chunk_overlap, rerank",
                other
            ),
        }
        self.validate()
    }
}

fn parse_num(key: &str, value: &str) -> Result<usize> {
    value
        .parse::<usize>()
        .map_err(|_| anyhow::anyhow!("{} must be a non-negative integer, got '{}'", key, value))
}

fn validate_global(config: &GlobalConfig) -> Result<()> {
    match config.embedding.provider.as_str() {
        "local" | "hash" => {}
        "ollama" => {
            if config.embedding.model.is_none() {
                bail!("embedding.model must be set when provider is 'ollama'");
            }
        }
        other => bail!(
            "Unknown embedding provider: '{}'. Must be local, ollama, or hash.",
            other
        ),
    }
    if config.embedding.dims == Some(0) {
        bail!("embedding.dims must be > 0 when set");
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }
    if config.llm.model.is_empty() {
        bail!("llm.model must not be empty");
    }
    if config.llm.max_tokens == 0 {
        bail!("llm.max_tokens must be > 0");
    }
    Ok(())
}

/// Load the global config, writing the defaults first if the file does
/// not exist yet.
pub fn load_global_config(path: &Path) -> Result<GlobalConfig> {
    if !path.exists() {
        write_toml(path, &GlobalConfig::default())?;
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config: GlobalConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
    validate_global(&config)?;
    Ok(config)
}

/// Load an org's RAG config, writing the defaults first if the file
/// does not exist yet.
pub fn load_rag_config(path: &Path) -> Result<RagConfig> {
    if !path.exists() {
        write_toml(path, &RagConfig::default())?;
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config: RagConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

pub fn save_rag_config(path: &Path, config: &RagConfig) -> Result<()> {
    config.validate()?;
    write_toml(path, config)
}

fn write_toml<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let rendered = toml::to_string_pretty(value).context("Failed to render config")?;
    std::fs::write(path, rendered)
        .with_context(|| format!("Failed to write config file: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_toml() {
        let rag: RagConfig = toml::from_str("").unwrap();
        assert_eq!(rag, RagConfig::default());
        assert_eq!(rag.chunk_size, 500);
        assert_eq!(rag.chunk_overlap, 50);
        assert!(rag.rerank);

        let global: GlobalConfig = toml::from_str("").unwrap();
        assert_eq!(global.embedding.provider, "local");
        assert_eq!(global.llm.api_key_env, "ANTHROPIC_API_KEY");
    }

    #[test]
    fn test_set_and_validate() {
        let mut rag = RagConfig::default();
        rag.set("top_k_results", "10").unwrap();
        assert_eq!(rag.top_k_results, 10);
        rag.set("similarity_threshold", "0.35").unwrap();
        assert!((rag.similarity_threshold - 0.35).abs() < 1e-9);
        rag.set("rerank", "false").unwrap();
        assert!(!rag.rerank);

        // Cross-field rule: overlap must stay below chunk_size.
        assert!(rag.set("chunk_overlap", "500").is_err());
        assert!(rag.set("similarity_threshold", "1.5").is_err());
        assert!(rag.set("nonsense", "1").is_err());
        assert!(rag.set("top_k_results", "abc").is_err());
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let parsed: GlobalConfig = toml::from_str("[embedding]\nprovider = \"openai\"\n").unwrap();
        assert!(validate_global(&parsed).is_err());
    }

    #[test]
    fn test_ollama_requires_model() {
        let parsed: GlobalConfig = toml::from_str("[embedding]\nprovider = \"ollama\"\n").unwrap();
        assert!(validate_global(&parsed).is_err());

        let parsed: GlobalConfig =
            toml::from_str("[embedding]\nprovider = \"ollama\"\nmodel = \"nomic-embed-text\"\n")
                .unwrap();
        assert!(validate_global(&parsed).is_ok());
    }

    #[test]
    fn test_load_persists_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rag.toml");
        assert!(!path.exists());

        let first = load_rag_config(&path).unwrap();
        assert!(path.exists());
        assert_eq!(first, RagConfig::default());

        // Edits survive a reload.
        let mut edited = first;
        edited.set("chunk_size", "120").unwrap();
        save_rag_config(&path, &edited).unwrap();
        let reloaded = load_rag_config(&path).unwrap();
        assert_eq!(reloaded.chunk_size, 120);
    }
}
