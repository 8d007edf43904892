use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

// ============================================================================
// Identifiers
// ============================================================================

/// Stable article identifier.
///
/// The content API sends ids as either JSON strings or numbers; both are
/// normalized to their string form so `42` and `"42"` name the same article.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ArticleId(String);

impl ArticleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArticleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ArticleId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ArticleId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<i64> for ArticleId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl<'de> Deserialize<'de> for ArticleId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Signed(i64),
            Unsigned(u64),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Text(s) => ArticleId(s),
            RawId::Signed(n) => ArticleId(n.to_string()),
            RawId::Unsigned(n) => ArticleId(n.to_string()),
        })
    }
}

// ============================================================================
// Articles
// ============================================================================

/// Identifies an article. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArticleRef {
    pub id: ArticleId,
    pub source_id: String,
    pub slug: String,
}

/// Article as returned by the content API.
///
/// Engagement fields are only meaningful for authenticated requests; the
/// server omits them (or reports `false`/`0`) for anonymous callers.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub id: ArticleId,
    #[serde(default)]
    pub source_id: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub published_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub is_liked: Option<bool>,
    #[serde(default)]
    pub is_saved: Option<bool>,
    #[serde(default)]
    pub likes_count: Option<i64>,
}

impl Article {
    pub fn article_ref(&self) -> ArticleRef {
        ArticleRef {
            id: self.id.clone(),
            source_id: self.source_id.clone(),
            slug: self.slug.clone(),
        }
    }

    /// Server-reported like count, floored at zero.
    pub fn server_likes(&self) -> u64 {
        self.likes_count.unwrap_or(0).max(0) as u64
    }
}

// ============================================================================
// Response Envelopes
// ============================================================================

#[derive(Debug, Deserialize)]
pub(crate) struct ArticleListResponse {
    #[serde(default)]
    pub articles: Vec<Article>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ArticleResponse {
    pub article: Article,
}

/// Body of engagement mutation responses: `{}` on success, `{"error": "..."}`
/// when the server refused the mutation.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct MutationResponse {
    #[serde(default)]
    pub error: Option<String>,
}
