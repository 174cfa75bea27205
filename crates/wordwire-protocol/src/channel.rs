//! Bus channel naming.
//!
//! One broadcast channel per article with active viewers.

/// Prefix of per-article broadcast channels.
pub const UPDATE_CHANNEL_PREFIX: &str = "updates:";

/// The broadcast channel for an article.
#[must_use]
pub fn update_channel(article_id: &str) -> String {
    format!("{UPDATE_CHANNEL_PREFIX}{article_id}")
}

/// The article id a broadcast channel belongs to, if it is one.
#[must_use]
pub fn article_of_channel(channel: &str) -> Option<&str> {
    channel.strip_prefix(UPDATE_CHANNEL_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_round_trip() {
        assert_eq!(update_channel("a1"), "updates:a1");
        assert_eq!(article_of_channel("updates:a1"), Some("a1"));
        assert_eq!(article_of_channel("other:a1"), None);
    }
}
