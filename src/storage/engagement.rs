//! On-device engagement lists for anonymous sessions.
//!
//! Liked and saved article ids are kept as two JSON arrays under fixed keys.
//! Every write is read-before-write with no merge: two overlapping writers can
//! lose an update, which is accepted for anonymous devices.
use anyhow::Result;
use async_trait::async_trait;

use super::schema::Database;
use crate::api::ArticleId;

pub const LIKED_KEY: &str = "engagement.liked";
pub const SAVED_KEY: &str = "engagement.saved";

/// Storage contract used by the engagement engine for anonymous sessions.
#[async_trait]
pub trait EngagementStorage: Send + Sync {
    async fn liked_ids(&self) -> Result<Vec<ArticleId>>;
    async fn saved_ids(&self) -> Result<Vec<ArticleId>>;
    async fn set_liked_ids(&self, ids: &[ArticleId]) -> Result<()>;
    async fn set_saved_ids(&self, ids: &[ArticleId]) -> Result<()>;

    /// Add `id` to the liked list if absent, remove it if present.
    /// Returns whether the article is liked afterwards.
    async fn toggle_liked(&self, id: &ArticleId) -> Result<bool> {
        let mut ids = self.liked_ids().await?;
        let now_member = toggle_membership(&mut ids, id);
        self.set_liked_ids(&ids).await?;
        Ok(now_member)
    }

    /// Add `id` to the saved list if absent, remove it if present.
    /// Returns whether the article is saved afterwards.
    async fn toggle_saved(&self, id: &ArticleId) -> Result<bool> {
        let mut ids = self.saved_ids().await?;
        let now_member = toggle_membership(&mut ids, id);
        self.set_saved_ids(&ids).await?;
        Ok(now_member)
    }

    /// Write the liked flag for `id` to match `liked` exactly.
    async fn set_liked(&self, id: &ArticleId, liked: bool) -> Result<()> {
        let mut ids = self.liked_ids().await?;
        if set_membership(&mut ids, id, liked) {
            self.set_liked_ids(&ids).await?;
        }
        Ok(())
    }

    /// Write the saved flag for `id` to match `saved` exactly.
    async fn set_saved(&self, id: &ArticleId, saved: bool) -> Result<()> {
        let mut ids = self.saved_ids().await?;
        if set_membership(&mut ids, id, saved) {
            self.set_saved_ids(&ids).await?;
        }
        Ok(())
    }
}

/// Returns true if `id` is a member after the toggle.
fn toggle_membership(ids: &mut Vec<ArticleId>, id: &ArticleId) -> bool {
    if let Some(pos) = ids.iter().position(|existing| existing == id) {
        ids.remove(pos);
        false
    } else {
        ids.push(id.clone());
        true
    }
}

/// Returns true if the list changed.
fn set_membership(ids: &mut Vec<ArticleId>, id: &ArticleId, member: bool) -> bool {
    let present = ids.contains(id);
    match (present, member) {
        (false, true) => {
            ids.push(id.clone());
            true
        }
        (true, false) => {
            ids.retain(|existing| existing != id);
            true
        }
        _ => false,
    }
}

/// SQLite-backed [`EngagementStorage`].
#[derive(Clone)]
pub struct LocalEngagementStore {
    db: Database,
}

impl LocalEngagementStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    async fn read(&self, key: &str) -> Result<Vec<ArticleId>> {
        let raw = self.db.get_string_list(key).await?;
        let mut ids: Vec<ArticleId> = Vec::with_capacity(raw.len());
        for id in raw.into_iter().map(ArticleId::from) {
            // Lists written by older builds may contain duplicates
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    async fn write(&self, key: &str, ids: &[ArticleId]) -> Result<()> {
        let raw: Vec<String> = ids.iter().map(|id| id.as_str().to_string()).collect();
        self.db.set_string_list(key, &raw).await?;
        tracing::debug!(key = %key, count = ids.len(), "Engagement list written");
        Ok(())
    }
}

#[async_trait]
impl EngagementStorage for LocalEngagementStore {
    async fn liked_ids(&self) -> Result<Vec<ArticleId>> {
        self.read(LIKED_KEY).await
    }

    async fn saved_ids(&self) -> Result<Vec<ArticleId>> {
        self.read(SAVED_KEY).await
    }

    async fn set_liked_ids(&self, ids: &[ArticleId]) -> Result<()> {
        self.write(LIKED_KEY, ids).await
    }

    async fn set_saved_ids(&self, ids: &[ArticleId]) -> Result<()> {
        self.write(SAVED_KEY, ids).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> LocalEngagementStore {
        LocalEngagementStore::new(Database::open(":memory:").await.unwrap())
    }

    #[tokio::test]
    async fn test_empty_store() {
        let store = test_store().await;
        assert!(store.liked_ids().await.unwrap().is_empty());
        assert!(store.saved_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_toggle_saved_twice_returns_to_empty() {
        let store = test_store().await;
        let id = ArticleId::from("a1");

        assert!(store.toggle_saved(&id).await.unwrap());
        assert_eq!(store.saved_ids().await.unwrap(), vec![id.clone()]);

        assert!(!store.toggle_saved(&id).await.unwrap());
        assert!(store.saved_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_liked_and_saved_are_independent() {
        let store = test_store().await;
        let id = ArticleId::from("a1");

        store.toggle_liked(&id).await.unwrap();
        assert_eq!(store.liked_ids().await.unwrap(), vec![id.clone()]);
        assert!(store.saved_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_set_liked_never_duplicates() {
        let store = test_store().await;
        let id = ArticleId::from(9);

        store.set_liked(&id, true).await.unwrap();
        store.set_liked(&id, true).await.unwrap();
        assert_eq!(store.liked_ids().await.unwrap(), vec![id.clone()]);

        store.set_liked(&id, false).await.unwrap();
        store.set_liked(&id, false).await.unwrap();
        assert!(store.liked_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_entries_collapsed_on_read() {
        let store = test_store().await;
        store
            .db
            .set_value(SAVED_KEY, r#"["a","b","a"]"#)
            .await
            .unwrap();

        let ids = store.saved_ids().await.unwrap();
        assert_eq!(ids, vec![ArticleId::from("a"), ArticleId::from("b")]);

        // Toggling "a" removes it entirely rather than leaving the duplicate
        assert!(!store.toggle_saved(&ArticleId::from("a")).await.unwrap());
        assert_eq!(store.saved_ids().await.unwrap(), vec![ArticleId::from("b")]);
    }

    #[tokio::test]
    async fn test_lists_survive_reopen_of_store_handle() {
        let db = Database::open(":memory:").await.unwrap();
        LocalEngagementStore::new(db.clone())
            .toggle_liked(&ArticleId::from("x"))
            .await
            .unwrap();

        let reopened = LocalEngagementStore::new(db);
        assert_eq!(
            reopened.liked_ids().await.unwrap(),
            vec![ArticleId::from("x")]
        );
    }
}
