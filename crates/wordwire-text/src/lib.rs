//! # wordwire-text
//!
//! Text handling for the Wordwire realtime wiki editor.
//!
//! This crate is the pure, I/O-free leaf of the workspace:
//!
//! - **Tokenize** - Split article text into addressable word tokens
//! - **Validate** - Check a proposed replacement token's surface syntax
//! - **Context** - Optimistic staleness check for a proposed edit
//! - **Moderation** - Denylist filter with normalization and fuzzy matching
//!
//! Tokens are recomputed from the content string on every call; there is
//! no persistent token index. An index is only meaningful against the
//! exact content snapshot it was computed from.

pub mod context;
pub mod moderation;
pub mod tokenize;
pub mod validate;

pub use context::{EditContext, WordNotFound};
pub use moderation::ModerationFilter;
pub use tokenize::{normalized, replace_token_at, token_at, tokens, Token};
pub use validate::{is_valid_token, MAX_LINK_URL_LEN, MAX_TOKEN_LEN};
