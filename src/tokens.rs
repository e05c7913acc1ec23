//! Token counting for context budgeting.
//!
//! Uses the `cl100k_base` BPE encoding. The encoder is initialized once
//! per process; if its tables cannot be loaded we fall back to the usual
//! four-characters-per-token estimate rather than failing retrieval.

use std::sync::OnceLock;

use tiktoken_rs::CoreBPE;

static ENCODER: OnceLock<Option<CoreBPE>> = OnceLock::new();

/// Count the tokens in `text` under the cl100k_base encoding.
pub fn count_tokens(text: &str) -> usize {
    match ENCODER.get_or_init(|| tiktoken_rs::cl100k_base().ok()) {
        Some(bpe) => bpe.encode_with_special_tokens(text).len(),
        None => estimate_tokens(text),
    }
}

/// Rough estimate: ~4 characters per token for English text.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}
