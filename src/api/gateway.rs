use async_trait::async_trait;
use thiserror::Error;

use super::types::{Article, ArticleId};

/// Errors from the remote content and engagement API.
///
/// Every failure of a network call is reported through this type; callers
/// never see a panic or an untyped error from the gateway.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Request timed out after {0}s")]
    Timeout(u64),
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Server rejected request: {0}")]
    Rejected(String),
    #[error("Invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Response too large (exceeds {0} bytes)")]
    ResponseTooLarge(usize),
    #[error("Invalid UTF-8 in response")]
    InvalidUtf8,
    #[error("Invalid base URL: {0}")]
    InvalidBaseUrl(String),
    #[error("Insecure base URL: HTTPS required (except localhost for testing)")]
    InsecureBaseUrl,
}

/// Parameters for the categorical (non-personalized) feed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedParams {
    pub limit: u32,
    pub offset: u32,
    pub category: Option<String>,
    pub countries: Option<Vec<String>>,
}

/// Parameters for the personalized feed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersonalizedParams {
    pub limit: u32,
    pub offset: u32,
    pub exclude_read: bool,
    pub diversity: f32,
    pub countries: Option<Vec<String>>,
}

/// Parameters for article search.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchParams {
    pub query: String,
    pub limit: u32,
    pub offset: u32,
    pub category: Option<String>,
}

/// Read side of the content API.
#[async_trait]
pub trait ContentApi: Send + Sync {
    async fn get_feed(&self, params: &FeedParams) -> Result<Vec<Article>, ApiError>;
    async fn get_personalized_feed(
        &self,
        params: &PersonalizedParams,
    ) -> Result<Vec<Article>, ApiError>;
    async fn search(&self, params: &SearchParams) -> Result<Vec<Article>, ApiError>;
    async fn get_by_source_slug(&self, source: &str, slug: &str) -> Result<Article, ApiError>;
    async fn get_by_id(&self, id: &ArticleId) -> Result<Article, ApiError>;
    async fn get_news_bytes_feed(&self, limit: u32) -> Result<Vec<Article>, ApiError>;
}

/// Engagement mutations for authenticated sessions.
///
/// The toggles are server-side flips: the server holds the authoritative
/// state and the client only asks it to invert.
#[async_trait]
pub trait RemoteEngagementGateway: Send + Sync {
    async fn toggle_like(&self, id: &ArticleId) -> Result<(), ApiError>;
    async fn toggle_bookmark(&self, id: &ArticleId) -> Result<(), ApiError>;
    async fn track_view(&self, id: &ArticleId) -> Result<(), ApiError>;
}
