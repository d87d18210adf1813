//! Deterministic token counting for prompts and scanned files.

use std::sync::OnceLock;
use tiktoken_rs::{o200k_base, CoreBPE};

static BPE: OnceLock<Option<CoreBPE>> = OnceLock::new();

fn bpe() -> Option<&'static CoreBPE> {
    BPE.get_or_init(|| match o200k_base() {
        Ok(bpe) => Some(bpe),
        Err(e) => {
            tracing::error!("Failed to load o200k_base tokenizer, using word count: {}", e);
            None
        }
    })
    .as_ref()
}

/// Counts tokens in `text` with the o200k BPE.
///
/// Falls back to a whitespace word count if the encoder could not be loaded.
/// Either way the count only depends on the input text.
pub fn count_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    match bpe() {
        Some(bpe) => bpe.encode_with_special_tokens(text).len(),
        None => text.split_whitespace().count(),
    }
}
