use anyhow::Result;

use super::schema::Database;

impl Database {
    // ========================================================================
    // Key-Value Operations
    // ========================================================================

    /// Get a single value by key.
    ///
    /// # Returns
    ///
    /// The stored value if the key exists, or `None` if not set.
    pub async fn get_value(&self, key: &str) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM kv_store WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|(value,)| value))
    }

    /// Set a value (UPSERT).
    ///
    /// Inserts the key-value pair if it doesn't exist, or replaces the value
    /// and timestamp if it does. No merge: the caller's value wins.
    pub async fn set_value(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO kv_store (key, value, updated_at)
            VALUES (?, ?, datetime('now'))
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
        "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Read a JSON-encoded string list. Missing or corrupt entries read as empty.
    pub(crate) async fn get_string_list(&self, key: &str) -> Result<Vec<String>> {
        let Some(raw) = self.get_value(key).await? else {
            return Ok(Vec::new());
        };
        match serde_json::from_str::<Vec<String>>(&raw) {
            Ok(list) => Ok(list),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Corrupt list in kv_store, treating as empty");
                Ok(Vec::new())
            }
        }
    }

    pub(crate) async fn set_string_list(&self, key: &str, values: &[String]) -> Result<()> {
        let encoded = serde_json::to_string(values)?;
        self.set_value(key, &encoded).await
    }
}
