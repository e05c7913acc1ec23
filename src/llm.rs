//! LLM client abstraction and the hosted-API implementation.
//!
//! The trait exists so the NL-to-SQL pipeline and `ask` can be tested
//! against a scripted client; production use goes through
//! [`AnthropicClient`], which reads its key from the environment variable
//! named in the config.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{EmbeddingConfig, LlmConfig, RagConfig};
use crate::context::{build_context, BuiltContext};
use crate::store::VectorStore;

pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send one message exchange and return the model's text reply.
    async fn complete(&self, system: Option<&str>, messages: &[ChatMessage]) -> Result<String>;
}

/// Client for the Anthropic Messages API.
#[derive(Debug)]
pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    max_tokens: u32,
    base_url: String,
}

impl AnthropicClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .with_context(|| format!("{} environment variable not set", config.api_key_env))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| ANTHROPIC_BASE_URL.to_string());
        Ok(Self {
            http,
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            base_url,
        })
    }
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, system: Option<&str>, messages: &[ChatMessage]) -> Result<String> {
        let mut body = serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": messages,
        });
        if let Some(system) = system {
            body["system"] = serde_json::Value::String(system.to_string());
        }

        let response = self
            .http
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .context("LLM request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("LLM API error {}: {}", status, body_text);
        }

        let parsed: MessagesResponse =
            response.json().await.context("Invalid LLM response")?;
        let text: String = parsed
            .content
            .iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text.as_str())
            .collect::<Vec<_>>()
            .join("");
        if text.is_empty() {
            bail!("LLM returned no text content");
        }
        Ok(text)
    }
}

/// Answer `question`, grounding the model in the built context when there
/// is one. With an empty knowledge base the question goes out bare.
pub async fn ask(
    client: &dyn LlmClient,
    context: &BuiltContext,
    question: &str,
) -> Result<String> {
    let system = if context.is_empty() {
        None
    } else {
        Some(format!(
            "You are a helpful assistant with access to a knowledge base. \
             Prefer the knowledge base when it is relevant to the question, \
             and cite supporting passages as [Source N].\n\n\
             <knowledge_base>\n{}\n</knowledge_base>",
            context.context
        ))
    };
    client
        .complete(system.as_deref(), &[ChatMessage::user(question)])
        .await
}

/// CLI entry point for `ask`.
pub async fn run_ask(
    store: &dyn VectorStore,
    embedding: &EmbeddingConfig,
    rag: &RagConfig,
    llm: &LlmConfig,
    question: &str,
    collections: Option<Vec<String>>,
) -> Result<()> {
    // Resolve credentials before doing any retrieval work.
    let client = AnthropicClient::from_config(llm)?;
    let built = build_context(store, embedding, rag, question, collections, None).await?;

    let answer = ask(&client, &built, question).await?;
    println!("{}", answer);

    if !built.sources.is_empty() {
        println!();
        println!("Sources:");
        for source in &built.sources {
            println!(
                "  {}. {} (relevance: {:.3})",
                source.index, source.source, source.relevance
            );
        }
    }
    Ok(())
}
