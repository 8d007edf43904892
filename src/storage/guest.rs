use anyhow::Result;

use super::schema::Database;
use super::types::GuestPreferences;

const COUNTRIES_KEY: &str = "guest.countries";
const CATEGORIES_KEY: &str = "guest.categories";

impl Database {
    // ========================================================================
    // Guest Preference Operations
    // ========================================================================

    /// Load the persisted guest preferences. Missing keys read as empty lists.
    pub async fn load_guest_preferences(&self) -> Result<GuestPreferences> {
        let countries = self.get_string_list(COUNTRIES_KEY).await?;
        let categories = self.get_string_list(CATEGORIES_KEY).await?;
        Ok(GuestPreferences::new(countries, categories))
    }

    /// Replace the persisted guest preferences.
    ///
    /// This is the only write path for guest preferences; values are
    /// normalized before they are stored.
    pub async fn save_guest_preferences(&self, prefs: &GuestPreferences) -> Result<()> {
        let prefs = GuestPreferences::new(prefs.countries.clone(), prefs.categories.clone());
        let mut tx = self.pool.begin().await?;
        for (key, values) in [
            (COUNTRIES_KEY, &prefs.countries),
            (CATEGORIES_KEY, &prefs.categories),
        ] {
            sqlx::query(
                r#"
                INSERT INTO kv_store (key, value, updated_at)
                VALUES (?, ?, datetime('now'))
                ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
            )
            .bind(key)
            .bind(serde_json::to_string(values)?)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        tracing::info!(
            countries = prefs.countries.len(),
            categories = prefs.categories.len(),
            "Guest preferences saved"
        );
        Ok(())
    }
}
