//! Surface-syntax validation for replacement tokens.
//!
//! `is_valid_token` only constrains syntax, not semantic content; it is
//! not a security boundary on its own. Moderation (denylist matching)
//! and authentication are separate layers.

use regex::Regex;
use std::sync::LazyLock;

/// Maximum accepted token length, in characters.
pub const MAX_TOKEN_LEN: usize = 100;

/// Maximum accepted link URL length, in characters.
pub const MAX_LINK_URL_LEN: usize = 100;

/// A "word": one or more Unicode letters/numbers, optionally containing
/// internal `_` or `-` but never starting or ending with them.
const WORD: &str = r"[\p{L}\p{N}](?:[\p{L}\p{N}_-]*[\p{L}\p{N}])?";

static BOLD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"^\*\*{WORD}\*\*$")).expect("bold pattern"));

static ITALIC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"^\*{WORD}\*$")).expect("italic pattern"));

static PLAIN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"^{WORD}[.,]?$")).expect("plain pattern"));

static LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^\[{WORD}\]\((https?://[^\s)]+)\)$")).expect("link pattern")
});

/// Zero-width, invisible, and bidi-control codepoints that would render
/// confusingly or not at all. Unpaired surrogate halves cannot occur in a
/// Rust `&str`, so they need no check here.
fn is_invisible(c: char) -> bool {
    matches!(
        c,
        '\u{00AD}'
            | '\u{034F}'
            | '\u{061C}'
            | '\u{115F}'
            | '\u{1160}'
            | '\u{17B4}'
            | '\u{17B5}'
            | '\u{180B}'..='\u{180E}'
            | '\u{200B}'..='\u{200F}'
            | '\u{202A}'..='\u{202E}'
            | '\u{2060}'..='\u{2064}'
            | '\u{2066}'..='\u{2069}'
            | '\u{FEFF}'
            | '\u{FFA0}'
    )
}

/// Check whether `candidate` is acceptable as a replacement token.
///
/// Accepts exactly one of: bold (`**word**`), italic (`*word*`), a plain
/// word optionally followed by a single `.` or `,`, or a link
/// (`[word](http(s)://...)`) with a URL of at most [`MAX_LINK_URL_LEN`]
/// characters.
#[must_use]
pub fn is_valid_token(candidate: &str) -> bool {
    if candidate.is_empty() || candidate.chars().count() > MAX_TOKEN_LEN {
        return false;
    }
    if candidate.chars().any(is_invisible) {
        return false;
    }

    if BOLD_RE.is_match(candidate)
        || ITALIC_RE.is_match(candidate)
        || PLAIN_RE.is_match(candidate)
    {
        return true;
    }

    LINK_RE
        .captures(candidate)
        .and_then(|c| c.get(1))
        .is_some_and(|url| url.as_str().chars().count() <= MAX_LINK_URL_LEN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_plain_words() {
        assert!(is_valid_token("hello"));
        assert!(is_valid_token("test123"));
        assert!(is_valid_token("lorem_ipsum"));
        assert!(is_valid_token("hello-world"));
        assert!(is_valid_token("hello,"));
        assert!(is_valid_token("lorem."));
        assert!(is_valid_token("café"));
        assert!(is_valid_token("niño"));
    }

    #[test]
    fn test_accepts_formatting() {
        assert!(is_valid_token("**bold**"));
        assert!(is_valid_token("*italic*"));
        assert!(is_valid_token("**hello-world**"));
        assert!(is_valid_token("[text](https://example.com)"));
        assert!(is_valid_token("[text](http://example.com/page)"));
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(!is_valid_token(""));
        assert!(!is_valid_token(&"a".repeat(101)));
        assert!(!is_valid_token("hello world"));
        assert!(!is_valid_token("***over***"));
        assert!(!is_valid_token("hello!"));
        assert!(!is_valid_token(",hello"));
        assert!(!is_valid_token("test_"));
        assert!(!is_valid_token("hello-"));
        assert!(!is_valid_token("[a](not-a-url not escaped with space)"));
        assert!(!is_valid_token("[a](ftp://example.com)"));
    }

    #[test]
    fn test_rejects_oversized_link_url() {
        let url = format!("https://example.com/{}", "a".repeat(100));
        assert!(!is_valid_token(&format!("[a]({url})")));
    }

    #[test]
    fn test_rejects_invisible_codepoints() {
        assert!(!is_valid_token("hel\u{200B}lo"));
        assert!(!is_valid_token("\u{202E}drow"));
        assert!(!is_valid_token("word\u{FEFF}"));
    }
}
