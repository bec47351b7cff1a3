
use std::borrow::Cow;

use tracing::warn;

use super::EmbeddingError;

/// Token budget kept under the 8192-token input ceiling of `text-embedding-3-small`
pub const DEFAULT_MAX_TOKENS: usize = 8000;

/// Rough characters-per-token ratio used for all token estimates
const CHARS_PER_TOKEN: usize = 4;

/// USD per token for `text-embedding-3-small` ($0.02 per 1M tokens)
const COST_PER_TOKEN: f64 = 0.02 / 1_000_000.0;

const FIELD_SEPARATOR: &str = " | ";

/// Clean text for embedding: trim it and collapse every run of newlines into a single space.
///
/// Returns [`EmbeddingError::EmptyInput`] when nothing is left after trimming.
#[inline]
pub fn normalize(text: &str) -> Result<String, EmbeddingError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(EmbeddingError::EmptyInput);
    }

    let mut cleaned = String::with_capacity(trimmed.len());
    let mut in_newline_run = false;
    for c in trimmed.chars() {
        if c == '\n' {
            if !in_newline_run {
                cleaned.push(' ');
                in_newline_run = true;
            }
        } else {
            cleaned.push(c);
            in_newline_run = false;
        }
    }

    Ok(cleaned)
}

/// Estimate the token count of `text` as `ceil(chars / 4)`
#[inline]
pub fn estimate_token_count(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// Hard-cut `text` to `max_tokens * 4` characters when its estimated token count exceeds `max_tokens`.
///
/// The cut is not sentence-aware. Truncation is logged as a warning, never reported as an error.
#[inline]
pub fn truncate_to_token_limit(text: &str, max_tokens: usize) -> Cow<'_, str> {
    let estimated_tokens = estimate_token_count(text);
    if estimated_tokens <= max_tokens {
        return Cow::Borrowed(text);
    }

    let max_chars = max_tokens.saturating_mul(CHARS_PER_TOKEN);
    let cut = text
        .char_indices()
        .nth(max_chars)
        .map_or(text.len(), |(byte_index, _)| byte_index);

    warn!(
        "Text truncated from ~{} tokens to ~{} tokens",
        estimated_tokens, max_tokens
    );

    Cow::Owned(text.get(..cut).unwrap_or(text).to_string())
}

/// Join the non-empty parts with `" | "`, keeping their order
#[inline]
pub fn combine_fields(parts: &[Option<&str>]) -> String {
    parts
        .iter()
        .filter_map(|part| part.filter(|p| !p.is_empty()))
        .collect::<Vec<_>>()
        .join(FIELD_SEPARATOR)
}

/// Advisory USD cost of embedding `text`
#[inline]
pub fn estimate_cost(text: &str) -> f64 {
    estimate_token_count(text) as f64 * COST_PER_TOKEN
}
