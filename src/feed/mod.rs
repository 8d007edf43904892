//! Feed composition: which articles to request and how to fetch them.
//!
//! - [`planner`] - pure mapping from UI context to a [`FeedQuery`]
//! - [`quota`] - the guest article ceiling
//! - [`loader`] - executes queries against the content API
//!
//! # Example
//!
//! ```ignore
//! use crate::feed::{plan, FeedContext, FeedLoader};
//!
//! let query = plan(&FeedContext {
//!     is_authenticated: false,
//!     selected_category: Some("sports"),
//!     guest_preferences: &prefs,
//!     offset: 0,
//! });
//! let page = loader.load(&query).await?;
//! ```

mod loader;
mod planner;
mod quota;

pub use loader::{merge_page, FeedLoadError, FeedLoader, FeedPage};
pub use planner::{
    plan, plan_search, FeedContext, FeedMode, FeedQuery, AUTHENTICATED_FEED_LIMIT,
    GUEST_FEED_LIMIT, PERSONALIZED_DIVERSITY, SEARCH_LIMIT,
};
pub use quota::{GuestQuotaGuard, GUEST_ARTICLE_LIMIT};
