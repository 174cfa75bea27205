//! Optimistic staleness check for a proposed edit.
//!
//! Clients describe the neighborhood of the token they intend to replace;
//! the server compares that description against its current content
//! snapshot. This detects stale indices, it does not lock anything.

use crate::tokenize::{normalized, tokens};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The supplied index does not resolve to a token in the current snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("no token at index {0}")]
pub struct WordNotFound(pub usize);

/// Client-supplied neighborhood of a target token: up to 2 tokens before,
/// the token itself, and up to 2 tokens after.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditContext {
    /// Tokens preceding the target, space-separated.
    pub before: String,
    /// The target token as the client last saw it.
    pub word: String,
    /// Tokens following the target, space-separated.
    pub after: String,
    /// The target token's index in the client's snapshot.
    pub index: usize,
}

/// How many neighbor tokens on each side participate in the comparison.
const WINDOW: usize = 2;

fn normalized_seq(s: &str) -> Vec<String> {
    s.split_whitespace().map(normalized).collect()
}

impl EditContext {
    /// Check whether this context still describes the token at
    /// `self.index` in `text`.
    ///
    /// Comparison is normalized on both sides (case-folded, markdown and
    /// punctuation stripped, link labels extracted). Returns
    /// [`WordNotFound`] if the index is out of bounds for the current
    /// snapshot; `Ok(false)` means the index resolves but the
    /// neighborhood has drifted.
    pub fn matches(&self, text: &str) -> Result<bool, WordNotFound> {
        let toks: Vec<String> = tokens(text).map(|t| normalized(t.text)).collect();
        if self.index >= toks.len() {
            return Err(WordNotFound(self.index));
        }

        let start = self.index.saturating_sub(WINDOW);
        let end = (self.index + 1 + WINDOW).min(toks.len());

        let word_ok = toks[self.index] == normalized(&self.word);
        let before_ok = toks[start..self.index] == normalized_seq(&self.before)[..];
        let after_ok = toks[self.index + 1..end] == normalized_seq(&self.after)[..];

        Ok(word_ok && before_ok && after_ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEXT: &str = "the quick brown fox jumps over";

    fn ctx(before: &str, word: &str, after: &str, index: usize) -> EditContext {
        EditContext {
            before: before.into(),
            word: word.into(),
            after: after.into(),
            index,
        }
    }

    #[test]
    fn test_fresh_context_matches() {
        assert_eq!(ctx("quick brown", "fox", "jumps over", 3).matches(TEXT), Ok(true));
    }

    #[test]
    fn test_normalization_is_forgiving() {
        assert_eq!(
            ctx("Quick Brown,", "**Fox**", "jumps over", 3).matches(TEXT),
            Ok(true)
        );
    }

    #[test]
    fn test_drifted_neighborhood_is_stale() {
        assert_eq!(ctx("slow brown", "fox", "jumps over", 3).matches(TEXT), Ok(false));
        assert_eq!(ctx("quick brown", "cat", "jumps over", 3).matches(TEXT), Ok(false));
    }

    #[test]
    fn test_window_clamps_at_document_edges() {
        assert_eq!(ctx("", "the", "quick brown", 0).matches(TEXT), Ok(true));
        assert_eq!(ctx("jumps", "over", "", 5).matches(TEXT), Ok(false));
        assert_eq!(ctx("fox jumps", "over", "", 5).matches(TEXT), Ok(true));
    }

    #[test]
    fn test_out_of_bounds_index() {
        assert_eq!(ctx("", "x", "", 42).matches(TEXT), Err(WordNotFound(42)));
    }

    #[test]
    fn test_deserializes_from_wire_shape() {
        let ctx: EditContext = serde_json::from_str(
            r#"{"before":"quick brown","word":"fox","after":"jumps over","index":3}"#,
        )
        .unwrap();
        assert_eq!(ctx.index, 3);
        assert_eq!(ctx.matches(TEXT), Ok(true));
    }
}
