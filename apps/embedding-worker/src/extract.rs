//! Document text extraction, keyed by file extension.
//!
//! PDF parsing is CPU-bound; callers run this on the blocking pool.

use anyhow::{Context, Result, bail};

pub fn extract_text(storage_path: &str, data: &[u8]) -> Result<String> {
    let lower = storage_path.to_ascii_lowercase();
    if lower.ends_with(".pdf") {
        pdf_extract::extract_text_from_mem(data)
            .with_context(|| format!("extract text from PDF '{storage_path}'"))
    } else if lower.ends_with(".txt") || lower.ends_with(".md") {
        String::from_utf8(data.to_vec())
            .with_context(|| format!("'{storage_path}' is not valid UTF-8"))
    } else {
        bail!("unsupported file type: {storage_path}")
    }
}
