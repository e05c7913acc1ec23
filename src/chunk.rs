//! Word-window text chunker.
//!
//! Splits text on whitespace into fixed-size word windows that overlap
//! by a configurable amount, so a sentence straddling a window boundary
//! stays retrievable from both sides.
//!
//! Chunking is deterministic: identical input and settings always produce
//! identical windows, which keeps derived chunk ids stable across
//! re-indexing runs.

use anyhow::{bail, Result};

/// Split `text` into windows of `chunk_size` words, advancing the start
/// by `chunk_size - chunk_overlap` words per step. The final window may
/// be shorter than `chunk_size`; it is never dropped.
///
/// Empty or whitespace-only input yields an empty result. A
/// `chunk_overlap >= chunk_size` would make the step non-positive and is
/// rejected as a configuration error.
pub fn chunk_words(text: &str, chunk_size: usize, chunk_overlap: usize) -> Result<Vec<String>> {
    if chunk_size == 0 {
        bail!("chunk_size must be > 0");
    }
    if chunk_overlap >= chunk_size {
        bail!(
            "chunk_overlap ({}) must be less than chunk_size ({})",
            chunk_overlap,
            chunk_size
        );
    }

    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return Ok(Vec::new());
    }

    let step = chunk_size - chunk_overlap;
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < words.len() {
        let end = usize::min(start + chunk_size, words.len());
        chunks.push(words[start..end].join(" "));
        start += step;
    }

    Ok(chunks)
}
