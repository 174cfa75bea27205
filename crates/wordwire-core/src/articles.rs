//! Read-only client for the article-metadata collaborator.
//!
//! Only used to answer `get_active_articles`; a lookup failure excludes
//! that article from the listing rather than failing the response.

use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Metadata the collaborator returns for one article.
#[derive(Debug, Clone, Deserialize)]
pub struct ArticleInfo {
    pub id: String,
    pub title: String,
    pub slug: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub revision: i64,
}

/// Article lookup errors.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// The request failed or returned a non-success status.
    #[error("article lookup failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// HTTP client for the collaborator's article endpoint.
#[derive(Debug, Clone)]
pub struct ArticleDirectory {
    http: reqwest::Client,
    base_url: String,
}

impl ArticleDirectory {
    /// Create a client against the collaborator at `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .user_agent(concat!("wordwire/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("HTTP client");
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    /// Fetch one article's metadata by id.
    pub async fn fetch(&self, article_id: &str) -> Result<ArticleInfo, DirectoryError> {
        let url = format!(
            "{}/api/articles/{}?byId=true",
            self.base_url.trim_end_matches('/'),
            article_id
        );
        let info = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json::<ArticleInfo>()
            .await?;
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_article_info_parses_collaborator_shape() {
        let info: ArticleInfo = serde_json::from_str(
            r#"{"id":"a1","title":"Rust","slug":"rust","content":"words here","revision":7}"#,
        )
        .unwrap();
        assert_eq!(info.slug, "rust");
        assert_eq!(info.revision, 7);
    }

    #[test]
    fn test_article_info_tolerates_missing_optionals() {
        let info: ArticleInfo =
            serde_json::from_str(r#"{"id":"a1","title":"Rust","slug":"rust"}"#).unwrap();
        assert!(info.content.is_empty());
        assert_eq!(info.revision, 0);
    }
}
