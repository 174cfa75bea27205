//! JSON text-frame encode/decode.

use crate::envelope::{ClientMessage, ServerMessage};

/// Maximum accepted inbound frame length, in characters. Anything larger
/// is dropped without a reply.
pub const MAX_INBOUND_FRAME_CHARS: usize = 2000;

/// Decode an inbound text frame.
///
/// Returns `None` for oversized, malformed, and unknown-type frames
/// alike; callers drop these silently rather than answering, so a bad
/// frame can never be used to solicit traffic.
#[must_use]
pub fn decode_client(text: &str) -> Option<ClientMessage> {
    if text.len() > MAX_INBOUND_FRAME_CHARS && text.chars().count() > MAX_INBOUND_FRAME_CHARS {
        return None;
    }
    serde_json::from_str(text).ok()
}

/// Encode an outbound envelope as a JSON text frame.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode_server(msg: &ServerMessage) -> Result<String, serde_json::Error> {
    serde_json::to_string(msg)
}
