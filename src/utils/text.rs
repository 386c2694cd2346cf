//! Entry content normalization.
//!
//! Normalized text is authoritative for everything downstream of a write:
//! the blob store, the version repository, and the word count all see the
//! same normalized form.

/// Strips NUL bytes and normalizes all line-ending variants to `\n`.
///
/// Idempotent: normalizing already-normalized content is a no-op.
pub fn normalize_content(content: &str) -> String {
    content
        .replace('\0', "")
        .replace("\r\n", "\n")
        .replace('\r', "\n")
}

/// Number of whitespace-delimited tokens in `content`.
pub fn count_words(content: &str) -> usize {
    content.split_whitespace().count()
}
