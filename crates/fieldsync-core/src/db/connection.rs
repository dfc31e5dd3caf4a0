//! Database connection management

use libsql::{Builder, Connection, Database as LibSqlDatabase};
use std::path::Path;

use crate::error::StoreError;

use super::migrations;

/// Database wrapper for a local libSQL connection
pub struct Database {
    _db: LibSqlDatabase,
    conn: Connection,
}

impl Database {
    /// Open a database at the given path, creating it if it doesn't exist
    ///
    /// Runs migrations automatically.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        let db = Builder::new_local(&path_str).build().await?;
        Self::from_engine(db, true).await
    }

    /// Open an in-memory database (useful for testing)
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let db = Builder::new_local(":memory:").build().await?;
        Self::from_engine(db, false).await
    }

    async fn from_engine(db: LibSqlDatabase, on_disk: bool) -> Result<Self, StoreError> {
        let conn = db.connect()?;
        let database = Self { _db: db, conn };
        database.configure(on_disk).await?;
        migrations::run(&database.conn).await?;
        Ok(database)
    }

    async fn configure(&self, on_disk: bool) -> Result<(), StoreError> {
        if on_disk {
            // journal_mode returns a row; WAL may be unavailable on some filesystems
            if let Err(error) = self.conn.query("PRAGMA journal_mode = WAL;", ()).await {
                tracing::warn!("Could not enable WAL journal: {error}");
            }
            self.conn
                .execute("PRAGMA synchronous = NORMAL;", ())
                .await
                .ok();
        }
        self.conn
            .execute("PRAGMA busy_timeout = 5000;", ())
            .await
            .ok();
        Ok(())
    }

    /// Get a reference to the underlying connection
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }
}

/// Start an explicit transaction on `conn`.
pub(crate) async fn begin(conn: &Connection) -> Result<(), StoreError> {
    conn.execute("BEGIN TRANSACTION", ()).await?;
    Ok(())
}

/// Commit, or roll back and return the outcome's error.
pub(crate) async fn finish<T>(
    conn: &Connection,
    outcome: Result<T, StoreError>,
) -> Result<T, StoreError> {
    match outcome {
        Ok(value) => {
            if let Err(error) = conn.execute("COMMIT", ()).await {
                conn.execute("ROLLBACK", ()).await.ok();
                return Err(error.into());
            }
            Ok(value)
        }
        Err(error) => {
            conn.execute("ROLLBACK", ()).await.ok();
            Err(error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_open_in_memory() {
        let db = Database::open_in_memory().await.unwrap();
        let mut rows = db.connection().query("SELECT 1", ()).await.unwrap();
        let row = rows.next().await.unwrap().unwrap();
        assert_eq!(row.get::<i64>(0).unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_open_creates_file() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("fieldsync.db");
        Database::open(&path).await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failed_transaction_rolls_back() {
        let db = Database::open_in_memory().await.unwrap();
        let conn = db.connection();

        begin(conn).await.unwrap();
        conn.execute(
            "INSERT INTO local_settings (key, value) VALUES ('app_version', '1.0')",
            (),
        )
        .await
        .unwrap();
        let outcome: Result<(), StoreError> = Err(StoreError::InvalidRecord("boom".into()));
        assert!(finish(conn, outcome).await.is_err());

        let mut rows = conn
            .query("SELECT COUNT(*) FROM local_settings", ())
            .await
            .unwrap();
        let count: i64 = rows.next().await.unwrap().unwrap().get(0).unwrap();
        assert_eq!(count, 0);
    }
}
