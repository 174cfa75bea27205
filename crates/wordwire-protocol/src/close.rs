//! WebSocket close codes in the application range.

/// A newer editor-role connection for the same user took over.
pub const CLOSE_SUPERSEDED: u16 = 4000;

/// Reason string sent with [`CLOSE_SUPERSEDED`].
pub const CLOSE_SUPERSEDED_REASON: &str = "New editor connection opened elsewhere";

/// The connection was never authenticated.
pub const CLOSE_AUTH_REQUIRED: u16 = 4001;

/// Reason string sent with [`CLOSE_AUTH_REQUIRED`].
pub const CLOSE_AUTH_REQUIRED_REASON: &str = "Authentication required";
