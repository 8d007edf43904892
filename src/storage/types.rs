use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another instance of the application has locked the database
    #[error("Another instance of newsbyte appears to be running. Please close it and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        if is_lock_message(&err.to_string()) {
            return DatabaseError::InstanceLocked;
        }
        DatabaseError::Other(err)
    }
}

/// SQLITE_BUSY (5), SQLITE_LOCKED (6) and SQLITE_CANTOPEN (14) all surface as
/// one of these messages.
pub(crate) fn is_lock_message(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("database is locked")
        || message.contains("database table is locked")
        || message.contains("sqlite_busy")
        || message.contains("sqlite_locked")
        || message.contains("unable to open database file")
}

// ============================================================================
// Data Structures
// ============================================================================

/// Feed filters chosen by an anonymous reader.
///
/// Persisted under the `guest.*` keys and read once at startup. Entries are
/// lowercased and deduplicated on write, so `["NG", "ng"]` stores as `["ng"]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestPreferences {
    pub countries: Vec<String>,
    pub categories: Vec<String>,
}

impl GuestPreferences {
    pub fn new(countries: Vec<String>, categories: Vec<String>) -> Self {
        Self {
            countries: normalize(countries),
            categories: normalize(categories),
        }
    }

    /// Countries to send with a feed request, or `None` when the reader has no
    /// country filter.
    pub fn country_filter(&self) -> Option<Vec<String>> {
        if self.countries.is_empty() {
            None
        } else {
            Some(self.countries.clone())
        }
    }
}

fn normalize(values: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(values.len());
    for value in values {
        let value = value.trim().to_lowercase();
        if !value.is_empty() && !out.contains(&value) {
            out.push(value);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guest_preferences_normalized() {
        let prefs = GuestPreferences::new(
            vec!["NG".into(), " ng ".into(), "ke".into(), "".into()],
            vec!["Sports".into()],
        );
        assert_eq!(prefs.countries, vec!["ng", "ke"]);
        assert_eq!(prefs.categories, vec!["sports"]);
    }

    #[test]
    fn test_country_filter_empty_is_none() {
        assert_eq!(GuestPreferences::default().country_filter(), None);
        let prefs = GuestPreferences::new(vec!["gh".into()], vec![]);
        assert_eq!(prefs.country_filter(), Some(vec!["gh".to_string()]));
    }

    #[test]
    fn test_lock_messages_detected() {
        assert!(is_lock_message("error returned from database: database is locked"));
        assert!(is_lock_message("SQLITE_BUSY"));
        assert!(!is_lock_message("no such table: kv_store"));
    }
}
