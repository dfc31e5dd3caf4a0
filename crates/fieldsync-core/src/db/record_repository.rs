//! Record repository implementation

use libsql::{params, Connection, Row};

use crate::error::StoreError;
use crate::models::{Collection, Record, RecordId};

/// Trait for record storage operations (async)
#[allow(async_fn_in_trait)]
pub trait RecordRepository {
    /// Get a record by collection and id
    async fn get(&self, collection: Collection, id: &RecordId) -> Result<Option<Record>, StoreError>;

    /// List every record in a collection, ordered by id
    async fn list(&self, collection: Collection) -> Result<Vec<Record>, StoreError>;

    /// Whether a record exists
    async fn exists(&self, collection: Collection, id: &RecordId) -> Result<bool, StoreError>;

    /// Insert or replace a record, returning its new revision
    async fn upsert(&self, record: &Record, payload: &str, synced: bool) -> Result<i64, StoreError>;

    /// Delete a record, returning whether a row was removed
    async fn delete(&self, collection: Collection, id: &RecordId) -> Result<bool, StoreError>;

    /// Number of records in a collection
    async fn count(&self, collection: Collection) -> Result<usize, StoreError>;

    /// Flip `synced` if the stored revision still matches
    async fn mark_synced(
        &self,
        collection: Collection,
        id: &RecordId,
        revision: i64,
    ) -> Result<bool, StoreError>;

    /// Delete every record in every collection
    async fn clear(&self) -> Result<(), StoreError>;
}

/// libSQL implementation of `RecordRepository`
pub struct LibSqlRecordRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlRecordRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_record(collection: Collection, row: &Row) -> Result<Record, StoreError> {
        let id: String = row.get(0)?;
        let payload: String = row.get(1)?;
        let payload = serde_json::from_str(&payload).map_err(|error| {
            StoreError::Corrupted(format!("{collection}/{id} payload: {error}"))
        })?;
        let id = RecordId::new(id)
            .map_err(|_| StoreError::Corrupted(format!("blank id in {collection}")))?;
        Ok(Record {
            id,
            collection,
            payload,
            synced: row.get::<i64>(2)? != 0,
            revision: row.get(3)?,
            updated_at: row.get(4)?,
        })
    }

    /// Revisions come from a store-wide counter so a re-created record never
    /// reuses a revision from before its delete.
    async fn next_revision(&self) -> Result<i64, StoreError> {
        self.conn
            .execute("UPDATE revision_counter SET value = value + 1 WHERE id = 1", ())
            .await?;
        let mut rows = self
            .conn
            .query("SELECT value FROM revision_counter WHERE id = 1", ())
            .await?;
        let row = rows
            .next()
            .await?
            .ok_or_else(|| StoreError::Corrupted("revision counter missing".to_string()))?;
        Ok(row.get(0)?)
    }
}

impl RecordRepository for LibSqlRecordRepository<'_> {
    async fn get(&self, collection: Collection, id: &RecordId) -> Result<Option<Record>, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, payload, synced, revision, updated_at FROM records
                 WHERE collection = ?1 AND id = ?2",
                params![collection.as_str(), id.as_str()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_record(collection, &row)?)),
            None => Ok(None),
        }
    }

    async fn list(&self, collection: Collection) -> Result<Vec<Record>, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, payload, synced, revision, updated_at FROM records
                 WHERE collection = ?1 ORDER BY id",
                params![collection.as_str()],
            )
            .await?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(Self::parse_record(collection, &row)?);
        }
        Ok(records)
    }

    async fn exists(&self, collection: Collection, id: &RecordId) -> Result<bool, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT EXISTS(SELECT 1 FROM records WHERE collection = ?1 AND id = ?2)",
                params![collection.as_str(), id.as_str()],
            )
            .await?;

        Ok(match rows.next().await? {
            Some(row) => row.get::<i64>(0)? != 0,
            None => false,
        })
    }

    async fn upsert(&self, record: &Record, payload: &str, synced: bool) -> Result<i64, StoreError> {
        let revision = self.next_revision().await?;
        self.conn
            .execute(
                "INSERT INTO records (collection, id, payload, synced, revision, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(collection, id) DO UPDATE SET
                     payload = excluded.payload,
                     synced = excluded.synced,
                     revision = excluded.revision,
                     updated_at = excluded.updated_at",
                params![
                    record.collection.as_str(),
                    record.id.as_str(),
                    payload,
                    i64::from(synced),
                    revision,
                    record.updated_at
                ],
            )
            .await?;
        Ok(revision)
    }

    async fn delete(&self, collection: Collection, id: &RecordId) -> Result<bool, StoreError> {
        let affected = self
            .conn
            .execute(
                "DELETE FROM records WHERE collection = ?1 AND id = ?2",
                params![collection.as_str(), id.as_str()],
            )
            .await?;
        Ok(affected > 0)
    }

    async fn count(&self, collection: Collection) -> Result<usize, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM records WHERE collection = ?1",
                params![collection.as_str()],
            )
            .await?;

        let count: i64 = match rows.next().await? {
            Some(row) => row.get(0)?,
            None => 0,
        };
        Ok(usize::try_from(count).unwrap_or_default())
    }

    async fn mark_synced(
        &self,
        collection: Collection,
        id: &RecordId,
        revision: i64,
    ) -> Result<bool, StoreError> {
        let affected = self
            .conn
            .execute(
                "UPDATE records SET synced = 1
                 WHERE collection = ?1 AND id = ?2 AND revision = ?3",
                params![collection.as_str(), id.as_str(), revision],
            )
            .await?;
        Ok(affected > 0)
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.conn.execute("DELETE FROM records", ()).await?;
        Ok(())
    }
}
