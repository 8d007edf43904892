use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

use super::planner::{FeedMode, FeedQuery};
use super::quota::GuestQuotaGuard;
use crate::api::{
    ApiError, Article, ArticleId, ContentApi, FeedParams, PersonalizedParams, SearchParams,
};
use crate::util::is_absolute_image_url;

/// A feed or article load that the user should see as an error state with a
/// retry action. Loads are never retried automatically.
#[derive(Debug, Error)]
pub enum FeedLoadError {
    #[error("Failed to load feed: {0}")]
    Feed(#[source] ApiError),
    #[error("Failed to load article: {0}")]
    Article(#[source] ApiError),
    #[error("Search query is empty")]
    EmptySearch,
}

/// One page of a feed.
#[derive(Debug, Clone)]
pub struct FeedPage {
    pub articles: Vec<Article>,
    /// Offset for the next page, or `None` once the server returned a short
    /// page.
    pub next_offset: Option<u32>,
}

/// Executes planned queries against the content API.
#[derive(Clone)]
pub struct FeedLoader {
    api: Arc<dyn ContentApi>,
    is_authenticated: bool,
}

impl FeedLoader {
    pub fn new(api: Arc<dyn ContentApi>, is_authenticated: bool) -> Self {
        Self {
            api,
            is_authenticated,
        }
    }

    /// Issue the single fetch described by `query`.
    pub async fn load(&self, query: &FeedQuery) -> Result<FeedPage, FeedLoadError> {
        let result = match query.mode {
            FeedMode::Personalized => {
                self.api
                    .get_personalized_feed(&PersonalizedParams {
                        limit: query.limit,
                        offset: query.offset,
                        exclude_read: query.exclude_read.unwrap_or(true),
                        diversity: query.diversity.unwrap_or(0.0).clamp(0.0, 1.0),
                        countries: query.countries.clone(),
                    })
                    .await
            }
            FeedMode::Categorical => {
                self.api
                    .get_feed(&FeedParams {
                        limit: query.limit,
                        offset: query.offset,
                        category: query.category.clone(),
                        countries: query.countries.clone(),
                    })
                    .await
            }
            FeedMode::Search => {
                let Some(search) = query.search_query.clone() else {
                    return Err(FeedLoadError::EmptySearch);
                };
                self.api
                    .search(&SearchParams {
                        query: search,
                        limit: query.limit,
                        offset: query.offset,
                        category: query.category.clone(),
                    })
                    .await
            }
        };

        let articles = match result {
            Ok(articles) => articles,
            Err(e) => {
                tracing::warn!(mode = ?query.mode, offset = query.offset, error = %e, "Feed load failed");
                return Err(FeedLoadError::Feed(e));
            }
        };

        let received = articles.len();
        let articles = GuestQuotaGuard::enforce(articles, self.is_authenticated);
        let next_offset = if received > 0 && received >= query.limit as usize {
            let kept = u32::try_from(articles.len()).unwrap_or(u32::MAX);
            Some(query.offset.saturating_add(kept))
        } else {
            None
        };

        tracing::debug!(
            mode = ?query.mode,
            offset = query.offset,
            count = articles.len(),
            "Feed page loaded"
        );
        Ok(FeedPage {
            articles,
            next_offset,
        })
    }

    /// Fetch the NewsBytes vertical feed, dropping articles that have no
    /// usable absolute image URL.
    pub async fn load_bytes(&self, limit: u32) -> Result<Vec<Article>, FeedLoadError> {
        let limit = GuestQuotaGuard::clamp_limit(limit, self.is_authenticated);
        let articles = self
            .api
            .get_news_bytes_feed(limit)
            .await
            .map_err(FeedLoadError::Feed)?;

        let before = articles.len();
        let bytes: Vec<Article> = articles
            .into_iter()
            .filter(|a| a.image_url.as_deref().is_some_and(is_absolute_image_url))
            .collect();
        if bytes.len() < before {
            tracing::debug!(
                dropped = before - bytes.len(),
                "Dropped bytes without a valid image URL"
            );
        }
        Ok(GuestQuotaGuard::enforce(bytes, self.is_authenticated))
    }

    pub async fn load_article(&self, id: &ArticleId) -> Result<Article, FeedLoadError> {
        self.api.get_by_id(id).await.map_err(FeedLoadError::Article)
    }

    pub async fn load_article_by_slug(
        &self,
        source: &str,
        slug: &str,
    ) -> Result<Article, FeedLoadError> {
        self.api
            .get_by_source_slug(source, slug)
            .await
            .map_err(FeedLoadError::Article)
    }
}

/// Append a later page to an existing list, skipping ids already shown.
///
/// Returns the number of articles appended.
pub fn merge_page(existing: &mut Vec<Article>, page: Vec<Article>) -> usize {
    let mut seen: HashSet<ArticleId> = existing.iter().map(|a| a.id.clone()).collect();
    let before = existing.len();
    for article in page {
        if seen.insert(article.id.clone()) {
            existing.push(article);
        }
    }
    existing.len() - before
}
