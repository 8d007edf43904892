//! Feed request planning.
//!
//! Turns the UI's current context into exactly one [`FeedQuery`]. Planning is
//! a pure function of its inputs and cannot fail; fetch failures belong to
//! the loader.
use super::quota::GuestQuotaGuard;
use crate::storage::GuestPreferences;
use crate::util::MAX_SEARCH_QUERY_LENGTH;

/// Page size for signed-in feeds.
pub const AUTHENTICATED_FEED_LIMIT: u32 = 30;
/// Page size requested for guest feeds, before the guest clamp.
pub const GUEST_FEED_LIMIT: u32 = 50;
/// Page size for search results.
pub const SEARCH_LIMIT: u32 = 20;
/// Diversity weight sent with personalized feed requests.
pub const PERSONALIZED_DIVERSITY: f32 = 0.3;

/// Which feed variant a query targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedMode {
    Personalized,
    Categorical,
    Search,
}

/// Everything the planner looks at.
#[derive(Debug, Clone, Copy)]
pub struct FeedContext<'a> {
    pub is_authenticated: bool,
    pub selected_category: Option<&'a str>,
    pub guest_preferences: &'a GuestPreferences,
    pub offset: u32,
}

/// A single feed request, built fresh for every fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedQuery {
    pub mode: FeedMode,
    pub category: Option<String>,
    pub countries: Option<Vec<String>>,
    pub limit: u32,
    pub offset: u32,
    /// In `[0, 1]`; only set for personalized queries.
    pub diversity: Option<f32>,
    pub exclude_read: Option<bool>,
    /// Only set for search queries.
    pub search_query: Option<String>,
}

/// Decide which feed to request.
///
/// 1. Signed in with no category selected: personalized feed, 30 articles,
///    already-read articles excluded, diversity 0.3.
/// 2. Otherwise: categorical feed for the selected category (or all
///    categories), 30 articles when signed in and 50 for guests.
///
/// In both cases the guest's country preferences are forwarded when present.
pub fn plan(ctx: &FeedContext<'_>) -> FeedQuery {
    let countries = ctx.guest_preferences.country_filter();

    if ctx.is_authenticated && ctx.selected_category.is_none() {
        return FeedQuery {
            mode: FeedMode::Personalized,
            category: None,
            countries,
            limit: GuestQuotaGuard::clamp_limit(AUTHENTICATED_FEED_LIMIT, true),
            offset: ctx.offset,
            diversity: Some(PERSONALIZED_DIVERSITY),
            exclude_read: Some(true),
            search_query: None,
        };
    }

    let requested = if ctx.is_authenticated {
        AUTHENTICATED_FEED_LIMIT
    } else {
        GUEST_FEED_LIMIT
    };

    FeedQuery {
        mode: FeedMode::Categorical,
        category: ctx.selected_category.map(str::to_string),
        countries,
        limit: GuestQuotaGuard::clamp_limit(requested, ctx.is_authenticated),
        offset: ctx.offset,
        diversity: None,
        exclude_read: None,
        search_query: None,
    }
}

/// Plan a category-filtered search.
///
/// Returns `None` for a blank query: there is nothing to request. Queries
/// longer than [`MAX_SEARCH_QUERY_LENGTH`] characters are truncated.
pub fn plan_search(ctx: &FeedContext<'_>, query: &str) -> Option<FeedQuery> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return None;
    }
    let query: String = trimmed.chars().take(MAX_SEARCH_QUERY_LENGTH).collect();

    Some(FeedQuery {
        mode: FeedMode::Search,
        category: ctx.selected_category.map(str::to_string),
        countries: None,
        limit: GuestQuotaGuard::clamp_limit(SEARCH_LIMIT, ctx.is_authenticated),
        offset: ctx.offset,
        diversity: None,
        exclude_read: None,
        search_query: Some(query),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ctx<'a>(
        is_authenticated: bool,
        selected_category: Option<&'a str>,
        prefs: &'a GuestPreferences,
    ) -> FeedContext<'a> {
        FeedContext {
            is_authenticated,
            selected_category,
            guest_preferences: prefs,
            offset: 0,
        }
    }

    #[test]
    fn test_authenticated_without_category_is_personalized() {
        let prefs = GuestPreferences::default();
        let query = plan(&ctx(true, None, &prefs));
        assert_eq!(
            query,
            FeedQuery {
                mode: FeedMode::Personalized,
                category: None,
                countries: None,
                limit: 30,
                offset: 0,
                diversity: Some(0.3),
                exclude_read: Some(true),
                search_query: None,
            }
        );
    }

    #[test]
    fn test_authenticated_with_category_is_categorical() {
        let prefs = GuestPreferences::default();
        let query = plan(&ctx(true, Some("sports"), &prefs));
        assert_eq!(query.mode, FeedMode::Categorical);
        assert_eq!(query.category.as_deref(), Some("sports"));
        assert_eq!(query.limit, 30);
        assert_eq!(query.diversity, None);
        assert_eq!(query.exclude_read, None);
    }

    #[test]
    fn test_guest_is_categorical_with_guest_limit() {
        let prefs = GuestPreferences::default();
        let query = plan(&ctx(false, None, &prefs));
        assert_eq!(query.mode, FeedMode::Categorical);
        assert_eq!(query.category, None);
        assert_eq!(query.limit, 50);

        let query = plan(&ctx(false, Some("politics"), &prefs));
        assert_eq!(query.category.as_deref(), Some("politics"));
        assert_eq!(query.limit, 50);
    }

    #[test]
    fn test_countries_forwarded_only_when_set() {
        let empty = GuestPreferences::default();
        assert_eq!(plan(&ctx(true, None, &empty)).countries, None);

        let prefs = GuestPreferences::new(vec!["ng".into(), "za".into()], vec![]);
        let expected = Some(vec!["ng".to_string(), "za".to_string()]);
        assert_eq!(plan(&ctx(true, None, &prefs)).countries, expected);
        assert_eq!(plan(&ctx(false, Some("tech"), &prefs)).countries, expected);
    }

    #[test]
    fn test_offset_passed_through() {
        let prefs = GuestPreferences::default();
        let mut context = ctx(true, None, &prefs);
        context.offset = 60;
        assert_eq!(plan(&context).offset, 60);
    }

    #[test]
    fn test_plan_search_blank_query() {
        let prefs = GuestPreferences::default();
        assert_eq!(plan_search(&ctx(false, None, &prefs), "   "), None);
    }

    #[test]
    fn test_plan_search_trims_and_keeps_category() {
        let prefs = GuestPreferences::default();
        let query = plan_search(&ctx(false, Some("sports"), &prefs), "  afcon  ").unwrap();
        assert_eq!(query.mode, FeedMode::Search);
        assert_eq!(query.search_query.as_deref(), Some("afcon"));
        assert_eq!(query.category.as_deref(), Some("sports"));
        assert_eq!(query.limit, SEARCH_LIMIT);
    }

    #[test]
    fn test_plan_search_truncates_long_query() {
        let prefs = GuestPreferences::default();
        let long = "é".repeat(MAX_SEARCH_QUERY_LENGTH + 10);
        let query = plan_search(&ctx(true, None, &prefs), &long).unwrap();
        assert_eq!(
            query.search_query.unwrap().chars().count(),
            MAX_SEARCH_QUERY_LENGTH
        );
    }
}
