//! Local settings repository implementation

use libsql::Connection;

use crate::error::StoreError;

/// Trait for the tenant-agnostic key/value area (async)
#[allow(async_fn_in_trait)]
pub trait SettingsRepository {
    /// Read a value
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a value
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove a value
    async fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Delete every key not named in `keep`
    async fn retain(&self, keep: &[&str]) -> Result<usize, StoreError>;
}

/// libSQL implementation of `SettingsRepository`
pub struct LibSqlSettingsRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlSettingsRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        let mut rows = self
            .conn
            .query("SELECT key FROM local_settings", ())
            .await?;
        let mut keys = Vec::new();
        while let Some(row) = rows.next().await? {
            keys.push(row.get::<String>(0)?);
        }
        Ok(keys)
    }
}

impl SettingsRepository for LibSqlSettingsRepository<'_> {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut rows = self
            .conn
            .query("SELECT value FROM local_settings WHERE key = ?", [key])
            .await?;

        if let Some(row) = rows.next().await? {
            Ok(Some(row.get(0)?))
        } else {
            Ok(None)
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO local_settings (key, value) VALUES (?, ?)",
                [key, value],
            )
            .await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.conn
            .execute("DELETE FROM local_settings WHERE key = ?", [key])
            .await?;
        Ok(())
    }

    async fn retain(&self, keep: &[&str]) -> Result<usize, StoreError> {
        let mut removed = 0;
        for key in self.keys().await? {
            if keep.contains(&key.as_str()) {
                continue;
            }
            self.remove(&key).await?;
            removed += 1;
        }
        Ok(removed)
    }
}
