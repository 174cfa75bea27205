//! Word-offset tokenization over article text.
//!
//! A token is a maximal run of non-whitespace characters, or one of three
//! special forms: bold (`**text**`), italic (`*text*`), or a markdown
//! link (`[label](url)`). Token indices are 0-based positions in the
//! token sequence of the document with the summary block and heading
//! lines stripped; spans always point into the original content so a
//! replacement can be spliced in place.

use regex::Regex;
use std::ops::Range;
use std::sync::LazyLock;

/// One regex alternation, first match wins at each position: bold with no
/// interior `*`, italic with no interior `*`, link with no interior `]`
/// or `)` in the label, else any non-whitespace run.
static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\*\*[^*]+\*\*|\*[^*]+\*|\[[^\]*]+\]\([^)]+\)|\S+").expect("token pattern")
});

/// Summary blocks (`:::summary ... :::`) are rendered as an infobox and
/// are not word-addressable.
static SUMMARY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s):::summary\n.*?:::").expect("summary pattern"));

static LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[([^\]]+)\]\([^)]+\)$").expect("link pattern"));

/// An addressable token and its byte span in the original content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    /// The token text, exactly as it appears in the content.
    pub text: &'a str,
    /// Byte range of the token in the content string.
    pub span: Range<usize>,
}

/// Byte ranges of the content that are word-addressable: everything
/// except the summary block and heading lines.
fn editable_spans(text: &str) -> Vec<Range<usize>> {
    let mut masked: Vec<Range<usize>> = Vec::new();

    if let Some(m) = SUMMARY_RE.find(text) {
        masked.push(m.range());
    }

    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        let start = offset;
        offset += line.len();
        if line.trim_start().starts_with('#') {
            masked.push(start..offset);
        }
    }

    masked.sort_by_key(|r| r.start);

    let mut spans = Vec::new();
    let mut cursor = 0;
    for r in masked {
        if r.start > cursor {
            spans.push(cursor..r.start);
        }
        cursor = cursor.max(r.end);
    }
    if cursor < text.len() {
        spans.push(cursor..text.len());
    }
    spans
}

/// Iterate the addressable tokens of `text` in document order.
///
/// Pure function of the input: finite, restartable, recomputed on every
/// call.
pub fn tokens(text: &str) -> impl Iterator<Item = Token<'_>> {
    editable_spans(text).into_iter().flat_map(move |span| {
        let base = span.start;
        TOKEN_RE.find_iter(&text[span]).map(move |m| Token {
            text: m.as_str(),
            span: base + m.start()..base + m.end(),
        })
    })
}

/// Get the token at `index`, or `None` if the index is out of bounds for
/// this content snapshot.
#[must_use]
pub fn token_at(text: &str, index: usize) -> Option<&str> {
    tokens(text).nth(index).map(|t| t.text)
}

/// Replace the token at `index` with `new_token`.
///
/// Returns the text unchanged (not an error) if the index cannot be
/// resolved against this snapshot; callers detect the no-op by comparing
/// content equality.
#[must_use]
pub fn replace_token_at(text: &str, index: usize, new_token: &str) -> String {
    match tokens(text).nth(index) {
        Some(tok) => {
            let mut out =
                String::with_capacity(text.len() - tok.text.len() + new_token.len());
            out.push_str(&text[..tok.span.start]);
            out.push_str(new_token);
            out.push_str(&text[tok.span.end..]);
            out
        }
        None => text.to_string(),
    }
}

/// Normalize a token for comparison: link labels are extracted, markdown
/// markers and trailing punctuation are stripped, and the result is
/// case-folded.
#[must_use]
pub fn normalized(token: &str) -> String {
    let inner = LINK_RE
        .captures(token)
        .and_then(|c| c.get(1))
        .map_or(token, |m| m.as_str());

    inner
        .chars()
        .filter(|c| !matches!(c, '*' | '_' | '.' | ','))
        .flat_map(char::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_tokens_in_order() {
        let toks: Vec<_> = tokens("one two  three").map(|t| t.text).collect();
        assert_eq!(toks, vec!["one", "two", "three"]);
    }

    #[test]
    fn test_special_forms() {
        let toks: Vec<_> = tokens("a **bold** *it* [label](https://example.com) b")
            .map(|t| t.text)
            .collect();
        assert_eq!(
            toks,
            vec!["a", "**bold**", "*it*", "[label](https://example.com)", "b"]
        );
    }

    #[test]
    fn test_summary_and_headings_are_not_addressable() {
        let text = ":::summary\n**Founded:** 1999\n:::\n# Heading\nbody words here\n## Sub\ntail";
        let toks: Vec<_> = tokens(text).map(|t| t.text).collect();
        assert_eq!(toks, vec!["body", "words", "here", "tail"]);
    }

    #[test]
    fn test_token_at_bounds() {
        let text = "alpha beta";
        assert_eq!(token_at(text, 0), Some("alpha"));
        assert_eq!(token_at(text, 1), Some("beta"));
        assert_eq!(token_at(text, 2), None);
    }

    #[test]
    fn test_replace_token_preserves_surroundings() {
        let text = "the quick brown fox";
        assert_eq!(replace_token_at(text, 1, "slow"), "the slow brown fox");
    }

    #[test]
    fn test_replace_out_of_bounds_is_a_noop() {
        let text = "just three words";
        assert_eq!(replace_token_at(text, 10, "nope"), text);
    }

    #[test]
    fn test_replace_repeated_word_targets_the_right_occurrence() {
        let text = "ha ha ha";
        assert_eq!(replace_token_at(text, 2, "ho"), "ha ha ho");
    }

    #[test]
    fn test_replace_then_read_round_trips() {
        let text = "alpha beta gamma delta";
        for (i, word) in ["**one**", "two", "*three*", "four,"].iter().enumerate() {
            let replaced = replace_token_at(text, i, word);
            assert_eq!(
                normalized(token_at(&replaced, i).unwrap()),
                normalized(word)
            );
        }
    }

    #[test]
    fn test_tokenize_rejoin_round_trip() {
        // Re-joining with single spaces round-trips a space-normalized document.
        let text = "one  two\tthree   four";
        let joined = tokens(text).map(|t| t.text).collect::<Vec<_>>().join(" ");
        assert_eq!(joined, "one two three four");
        let rejoined = tokens(&joined).map(|t| t.text).collect::<Vec<_>>().join(" ");
        assert_eq!(rejoined, joined);
    }

    #[test]
    fn test_normalized() {
        assert_eq!(normalized("**Bold**"), "bold");
        assert_eq!(normalized("word,"), "word");
        assert_eq!(normalized("[Label](https://example.com)"), "label");
    }
}
