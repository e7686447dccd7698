//! Token-window chunking.
//!
//! Chunks are non-overlapping windows of at most [`MAX_TOKENS_PER_CHUNK`]
//! tokens under the `cl100k_base` encoding, in source order. Boundaries are
//! deterministic: the same text always yields the same chunks, which is what
//! makes the completed-iff-all-chunks-stored invariant checkable.

use std::sync::OnceLock;

use anyhow::{Context, Result, anyhow};
use tiktoken_rs::{CoreBPE, cl100k_base};

pub const MAX_TOKENS_PER_CHUNK: usize = 500;

/// The tokenizer loads vocabulary data on first use; keep one per process.
static ENCODER: OnceLock<Option<CoreBPE>> = OnceLock::new();

fn encoder() -> Result<&'static CoreBPE> {
    ENCODER
        .get_or_init(|| cl100k_base().ok())
        .as_ref()
        .ok_or_else(|| anyhow!("failed to initialize cl100k_base tokenizer"))
}

pub fn chunk_text(text: &str) -> Result<Vec<String>> {
    let bpe = encoder()?;
    let tokens = bpe.encode_ordinary(text);
    let mut chunks = Vec::with_capacity(tokens.len().div_ceil(MAX_TOKENS_PER_CHUNK.max(1)));
    for window in tokens.chunks(MAX_TOKENS_PER_CHUNK) {
        let chunk = bpe
            .decode(window.to_vec())
            .context("decode token window")?;
        chunks.push(chunk);
    }
    Ok(chunks)
}
