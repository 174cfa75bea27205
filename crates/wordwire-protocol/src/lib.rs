//! # wordwire-protocol
//!
//! Wire protocol definitions for the Wordwire realtime layer.
//!
//! Frames are JSON text in both directions. Inbound frames carry their
//! fields at the top level next to a `type` tag; outbound frames wrap
//! their payload in a `data` object:
//!
//! ```json
//! {"type": "word_hover", "wordIndex": 3, "newWord": "**foo**"}
//! {"type": "active_users_update", "data": {"count": 2}}
//! ```
//!
//! The decode path implements the silent-drop policy: oversized,
//! malformed, and unknown-type frames are indistinguishable from noise
//! and produce no reply.

pub mod channel;
pub mod close;
pub mod codec;
pub mod envelope;

pub use channel::{article_of_channel, update_channel};
pub use close::{
    CLOSE_AUTH_REQUIRED, CLOSE_AUTH_REQUIRED_REASON, CLOSE_SUPERSEDED, CLOSE_SUPERSEDED_REASON,
};
pub use codec::{decode_client, encode_server, MAX_INBOUND_FRAME_CHARS};
pub use envelope::{
    ActiveArticle, ArticleRef, ClientMessage, ErrorCode, ErrorData, ServerMessage, WordHoverData,
};
