//! Denylist content filter.
//!
//! Pure and deterministic: normalize, then compare each whitespace-split
//! piece against every denylisted term by equality, substring
//! containment, and character-frequency cosine similarity. The fuzzy
//! match catches obfuscated variants that survive transliteration.

use deunicode::deunicode;
use std::collections::HashMap;
use unicode_normalization::UnicodeNormalization;

/// Similarity above this threshold counts as a match.
const SIMILARITY_THRESHOLD: f64 = 0.80;

/// Rejects text matching a configured denylist.
#[derive(Debug, Clone, Default)]
pub struct ModerationFilter {
    terms: Vec<String>,
}

impl ModerationFilter {
    /// Create a filter over the given terms. Terms are case-folded once
    /// at construction.
    #[must_use]
    pub fn new(terms: impl IntoIterator<Item = String>) -> Self {
        Self {
            terms: terms
                .into_iter()
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    /// Number of configured terms.
    #[must_use]
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// Whether the filter has no terms (and therefore rejects nothing).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Transliterate to latin, case-fold, compatibility-decompose, and
    /// split on whitespace.
    fn clean_up(text: &str) -> Vec<String> {
        let latin = deunicode(text);
        let folded: String = latin.trim().to_lowercase().nfkd().collect();
        folded.split_whitespace().map(str::to_string).collect()
    }

    /// Check whether `text` hits the denylist.
    #[must_use]
    pub fn is_disallowed(&self, text: &str) -> bool {
        if self.terms.is_empty() {
            return false;
        }

        Self::clean_up(text).iter().any(|input| {
            self.terms.iter().any(|term| {
                input == term
                    || input.contains(term.as_str())
                    || cosine_similarity(input, term) > SIMILARITY_THRESHOLD
            })
        })
    }
}

fn char_counts(s: &str) -> HashMap<char, u32> {
    let mut counts = HashMap::new();
    for c in s.chars() {
        *counts.entry(c).or_insert(0) += 1;
    }
    counts
}

/// Cosine similarity of character-frequency vectors. 1.0 for identical
/// multisets of characters, 0.0 for disjoint ones.
fn cosine_similarity(a: &str, b: &str) -> f64 {
    let va = char_counts(a);
    let vb = char_counts(b);
    if va.is_empty() || vb.is_empty() {
        return 0.0;
    }

    let dot: f64 = va
        .iter()
        .filter_map(|(c, &ca)| vb.get(c).map(|&cb| f64::from(ca) * f64::from(cb)))
        .sum();
    let norm = |v: &HashMap<char, u32>| {
        v.values()
            .map(|&c| f64::from(c) * f64::from(c))
            .sum::<f64>()
            .sqrt()
    };

    dot / (norm(&va) * norm(&vb))
}
