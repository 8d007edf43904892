use crate::api::Article;

/// Ceiling on articles per request for anonymous sessions.
pub const GUEST_ARTICLE_LIMIT: u32 = 50;

/// Guest-session limits, kept separate from the planner so the policy lives in
/// one place.
///
/// Authenticated requests pass through untouched; the server enforces its own
/// ceiling for them.
#[derive(Debug, Clone, Copy, Default)]
pub struct GuestQuotaGuard;

impl GuestQuotaGuard {
    /// Bound a requested page size for the given session.
    pub fn clamp_limit(requested: u32, is_authenticated: bool) -> u32 {
        if is_authenticated {
            requested
        } else {
            requested.min(GUEST_ARTICLE_LIMIT)
        }
    }

    /// How many of `len` fetched articles a session may keep.
    fn kept_len(len: usize, is_authenticated: bool) -> usize {
        if is_authenticated {
            len
        } else {
            len.min(GUEST_ARTICLE_LIMIT as usize)
        }
    }

    /// Truncate a fetched page to the guest ceiling.
    ///
    /// Applied after the fetch so an over-long response from the server still
    /// cannot grow an anonymous device's state.
    pub fn enforce(mut articles: Vec<Article>, is_authenticated: bool) -> Vec<Article> {
        let cap = Self::kept_len(articles.len(), is_authenticated);
        if articles.len() > cap {
            tracing::debug!(
                received = articles.len(),
                cap,
                "Truncating guest feed page to quota"
            );
            articles.truncate(cap);
        }
        articles
    }
}
