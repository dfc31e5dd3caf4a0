//! Sync queue repository implementation

use libsql::{params, Connection, Row};

use crate::error::StoreError;
use crate::models::{EntryStatus, Operation, QueueEntry, RecordId};

/// Trait for queue storage operations (async)
#[allow(async_fn_in_trait)]
pub trait QueueRepository {
    /// Append a pending entry
    async fn insert(
        &self,
        collection: crate::models::Collection,
        record_id: &RecordId,
        operation: Operation,
        timestamp: &str,
    ) -> Result<QueueEntry, StoreError>;

    /// Entries with the given status
    async fn list_by_status(&self, status: EntryStatus) -> Result<Vec<QueueEntry>, StoreError>;

    /// Every entry, oldest first
    async fn list_all(&self) -> Result<Vec<QueueEntry>, StoreError>;

    /// Number of entries with the given status
    async fn count_by_status(&self, status: EntryStatus) -> Result<usize, StoreError>;

    /// Flip an entry to synced, returning whether it existed
    async fn mark_synced(&self, entry_id: i64) -> Result<bool, StoreError>;

    /// Delete every entry
    async fn clear(&self) -> Result<(), StoreError>;
}

/// libSQL implementation of `QueueRepository`
pub struct LibSqlQueueRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlQueueRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_entry(row: &Row) -> Result<QueueEntry, StoreError> {
        let id: i64 = row.get(0)?;
        let corrupted = |field: &str, error: &dyn std::fmt::Display| {
            StoreError::Corrupted(format!("queue entry {id} {field}: {error}"))
        };

        let collection: String = row.get(1)?;
        let record_id: String = row.get(2)?;
        let operation: String = row.get(3)?;
        let status: String = row.get(4)?;

        Ok(QueueEntry {
            id,
            collection: collection
                .parse()
                .map_err(|error| corrupted("collection", &error))?,
            record_id: RecordId::new(record_id).map_err(|error| corrupted("record_id", &error))?,
            operation: operation
                .parse()
                .map_err(|error| corrupted("operation", &error))?,
            status: status.parse().map_err(|error| corrupted("status", &error))?,
            timestamp: row.get(5)?,
        })
    }

    async fn collect(&self, mut rows: libsql::Rows) -> Result<Vec<QueueEntry>, StoreError> {
        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(Self::parse_entry(&row)?);
        }
        Ok(entries)
    }
}

const SELECT_ENTRY: &str =
    "SELECT id, collection, record_id, operation, status, timestamp FROM sync_queue";

impl QueueRepository for LibSqlQueueRepository<'_> {
    async fn insert(
        &self,
        collection: crate::models::Collection,
        record_id: &RecordId,
        operation: Operation,
        timestamp: &str,
    ) -> Result<QueueEntry, StoreError> {
        self.conn
            .execute(
                "INSERT INTO sync_queue (collection, record_id, operation, status, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    collection.as_str(),
                    record_id.as_str(),
                    operation.as_str(),
                    EntryStatus::Pending.as_str(),
                    timestamp
                ],
            )
            .await?;

        Ok(QueueEntry {
            id: self.conn.last_insert_rowid(),
            collection,
            record_id: record_id.clone(),
            operation,
            status: EntryStatus::Pending,
            timestamp: timestamp.to_string(),
        })
    }

    async fn list_by_status(&self, status: EntryStatus) -> Result<Vec<QueueEntry>, StoreError> {
        let rows = self
            .conn
            .query(
                &format!("{SELECT_ENTRY} WHERE status = ?1"),
                params![status.as_str()],
            )
            .await?;
        self.collect(rows).await
    }

    async fn list_all(&self) -> Result<Vec<QueueEntry>, StoreError> {
        let rows = self
            .conn
            .query(&format!("{SELECT_ENTRY} ORDER BY id"), ())
            .await?;
        self.collect(rows).await
    }

    async fn count_by_status(&self, status: EntryStatus) -> Result<usize, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM sync_queue WHERE status = ?1",
                params![status.as_str()],
            )
            .await?;

        let count: i64 = match rows.next().await? {
            Some(row) => row.get(0)?,
            None => 0,
        };
        Ok(usize::try_from(count).unwrap_or_default())
    }

    async fn mark_synced(&self, entry_id: i64) -> Result<bool, StoreError> {
        let affected = self
            .conn
            .execute(
                "UPDATE sync_queue SET status = ?1 WHERE id = ?2",
                params![EntryStatus::Synced.as_str(), entry_id],
            )
            .await?;
        Ok(affected > 0)
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.conn.execute("DELETE FROM sync_queue", ()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::Collection;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_insert_assigns_increasing_ids() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = LibSqlQueueRepository::new(db.connection());
        let id = RecordId::new("C1").unwrap();

        let first = repo
            .insert(Collection::Checklists, &id, Operation::Create, "2026-01-01T00:00:00Z")
            .await
            .unwrap();
        let second = repo
            .insert(Collection::Checklists, &id, Operation::Update, "2026-01-01T00:00:01Z")
            .await
            .unwrap();

        assert!(second.id > first.id);
        assert_eq!(repo.count_by_status(EntryStatus::Pending).await.unwrap(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_mark_synced_flips_status() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = LibSqlQueueRepository::new(db.connection());
        let entry = repo
            .insert(
                Collection::Checklists,
                &RecordId::new("C1").unwrap(),
                Operation::Create,
                "2026-01-01T00:00:00Z",
            )
            .await
            .unwrap();

        assert!(repo.mark_synced(entry.id).await.unwrap());
        assert!(!repo.mark_synced(entry.id + 100).await.unwrap());
        assert!(repo
            .list_by_status(EntryStatus::Pending)
            .await
            .unwrap()
            .is_empty());

        let all = repo.list_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].status, EntryStatus::Synced);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unknown_operation_is_corruption() {
        let db = Database::open_in_memory().await.unwrap();
        db.connection()
            .execute(
                "INSERT INTO sync_queue (collection, record_id, operation, timestamp)
                 VALUES ('checklists', 'C1', 'merge', '2026-01-01T00:00:00Z')",
                (),
            )
            .await
            .unwrap();

        let repo = LibSqlQueueRepository::new(db.connection());
        let error = repo.list_all().await.unwrap_err();
        assert!(matches!(error, StoreError::Corrupted(_)));
    }
}
