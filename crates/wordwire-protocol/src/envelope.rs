//! Message envelopes exchanged over a realtime connection.

use serde::{Deserialize, Serialize};

/// Reference to an article in a client message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleRef {
    /// Opaque article identifier.
    pub id: String,
}

/// An inbound message from a connected client.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Bind this connection to an article, leaving any previous one.
    SetArticle {
        /// The article to watch.
        article: ArticleRef,
    },

    /// Ask for the list of articles with at least one viewer.
    GetActiveArticles,

    /// Preview a word replacement to the other viewers.
    WordHover {
        /// 0-based token index into the current content snapshot.
        #[serde(rename = "wordIndex")]
        word_index: usize,
        /// The proposed replacement token.
        #[serde(rename = "newWord")]
        new_word: String,
    },

    /// The editor stopped hovering a token without committing.
    WordLeave {
        /// 0-based token index into the current content snapshot.
        #[serde(rename = "wordIndex")]
        word_index: usize,
    },

    /// Heartbeat reply.
    Pong,
}

/// An outbound envelope sent to a connected client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Viewer count changed for the article this connection watches.
    ActiveUsersUpdate {
        /// Number of distinct users currently viewing.
        count: usize,
    },

    /// Reply to `get_active_articles`.
    ActiveArticles(Vec<ActiveArticle>),

    /// A word replacement preview from an editor.
    WordHover(WordHoverData),

    /// An editor stopped hovering a token.
    WordLeave {
        #[serde(rename = "wordIndex")]
        word_index: usize,
        #[serde(rename = "editorId")]
        editor_id: String,
    },

    /// A user's last connection for this article went away.
    UserDisconnected {
        #[serde(rename = "editorId")]
        editor_id: String,
    },

    /// Typed error, delivered to the sender only.
    Error(ErrorData),

    /// Heartbeat probe; clients answer with `pong`.
    Ping,
}

/// One entry in an `active_articles` reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveArticle {
    pub title: String,
    pub slug: String,
    #[serde(rename = "activeUsers")]
    pub active_users: usize,
}

/// Payload of a `word_hover` broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordHoverData {
    #[serde(rename = "newWord")]
    pub new_word: String,
    #[serde(rename = "wordIndex")]
    pub word_index: usize,
    #[serde(rename = "editorId")]
    pub editor_id: String,
    #[serde(rename = "editorName")]
    pub editor_name: String,
    #[serde(rename = "editorImage")]
    pub editor_image: Option<String>,
}

/// Machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// The proposed token failed syntax validation or moderation.
    InvalidWord,
    /// The user is rate limited.
    Cooldown,
    /// The broadcast could not be published.
    BroadcastFailed,
}

/// Payload of an `error` envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorData {
    pub code: ErrorCode,
    pub message: String,
    /// Milliseconds until the cooldown expires; only set for `COOLDOWN`.
    #[serde(rename = "remainingTime", skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub remaining_time: Option<u64>,
}

impl ServerMessage {
    /// Create an `error` envelope.
    #[must_use]
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerMessage::Error(ErrorData {
            code,
            message: message.into(),
            remaining_time: None,
        })
    }

    /// Create a `COOLDOWN` error envelope with the remaining time.
    #[must_use]
    pub fn cooldown_error(remaining_ms: u64) -> Self {
        ServerMessage::Error(ErrorData {
            code: ErrorCode::Cooldown,
            message: "You are editing too fast".into(),
            remaining_time: Some(remaining_ms),
        })
    }
}
