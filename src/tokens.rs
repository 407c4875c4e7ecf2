//! C3 — Token Estimator: deterministic fallback when a provider omits usage.

use crate::messages::{concat_text, UnifiedMessage};
use once_cell::sync::Lazy;
use tiktoken_rs::CoreBPE;

/// Defensive ceiling from spec §4.3 — never report more than this many tokens.
const MAX_ESTIMATED_TOKENS: u32 = 1_000_000;

static CL100K: Lazy<Option<CoreBPE>> = Lazy::new(|| tiktoken_rs::cl100k_base().ok());

/// Estimates prompt tokens for a message list, used only when the provider's
/// response carries no `usage` block (§4.3).
pub fn estimate_prompt_tokens(messages: &[UnifiedMessage]) -> u32 {
    estimate_text_tokens(&concat_text(messages))
}

/// Estimates tokens for arbitrary text: a BPE tokenizer when available, else
/// `max(1, len(text)/4)`.
pub fn estimate_text_tokens(text: &str) -> u32 {
    if text.is_empty() {
        return 0;
    }

    let count = match CL100K.as_ref() {
        Some(bpe) => bpe.encode_with_special_tokens(text).len() as u32,
        None => (text.len() as u32 / 4).max(1),
    };

    count.min(MAX_ESTIMATED_TOKENS)
}
