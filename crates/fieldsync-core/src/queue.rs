//! Sync queue: status-tracked log of mutations awaiting remote acknowledgment.

use crate::db::{LibSqlQueueRepository, QueueRepository};
use crate::error::QueueError;
use crate::models::{Collection, EntryStatus, Operation, QueueEntry, RecordId};
use crate::store::LocalStore;

/// Queue layered on the local store's engine.
#[derive(Clone)]
pub struct SyncQueue {
    store: LocalStore,
}

impl SyncQueue {
    pub const fn new(store: LocalStore) -> Self {
        Self { store }
    }

    /// Append a pending entry.
    ///
    /// Checklist writes should go through [`LocalStore::write_and_enqueue`]
    /// instead, which couples the record write and the entry in one
    /// transaction.
    pub async fn enqueue(
        &self,
        collection: Collection,
        record_id: &RecordId,
        operation: Operation,
    ) -> Result<QueueEntry, QueueError> {
        let db = self.store.lock().await?;
        LibSqlQueueRepository::new(db.connection())
            .insert(collection, record_id, operation, &crate::util::rfc3339_now())
            .await
    }

    /// Entries still awaiting acknowledgment, in no guaranteed order.
    pub async fn pending(&self) -> Result<Vec<QueueEntry>, QueueError> {
        let db = self.store.lock().await?;
        LibSqlQueueRepository::new(db.connection())
            .list_by_status(EntryStatus::Pending)
            .await
    }

    pub async fn pending_count(&self) -> Result<usize, QueueError> {
        let db = self.store.lock().await?;
        LibSqlQueueRepository::new(db.connection())
            .count_by_status(EntryStatus::Pending)
            .await
    }

    /// Flip an entry to synced. Marking an already synced entry is a no-op.
    pub async fn mark_synced(&self, entry_id: i64) -> Result<(), QueueError> {
        let db = self.store.lock().await?;
        let found = LibSqlQueueRepository::new(db.connection())
            .mark_synced(entry_id)
            .await?;
        if found {
            Ok(())
        } else {
            Err(QueueError::NotFound(format!("queue entry {entry_id}")))
        }
    }

    /// Full audit log, oldest first.
    pub async fn entries(&self) -> Result<Vec<QueueEntry>, QueueError> {
        let db = self.store.lock().await?;
        LibSqlQueueRepository::new(db.connection()).list_all().await
    }

    /// Drop every entry. Reserved for the tenant wipe.
    pub(crate) async fn clear(&self) -> Result<(), QueueError> {
        let db = self.store.lock().await?;
        LibSqlQueueRepository::new(db.connection()).clear().await?;
        tracing::info!("Cleared sync queue");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use pretty_assertions::assert_eq;

    fn queue() -> SyncQueue {
        SyncQueue::new(LocalStore::in_memory())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn pending_excludes_synced_entries() {
        let queue = queue();
        let id = RecordId::new("C1").unwrap();
        let first = queue
            .enqueue(Collection::Checklists, &id, Operation::Create)
            .await
            .unwrap();
        queue
            .enqueue(Collection::Checklists, &id, Operation::Update)
            .await
            .unwrap();

        queue.mark_synced(first.id).await.unwrap();

        let pending = queue.pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].operation, Operation::Update);
        assert_eq!(queue.pending_count().await.unwrap(), 1);
        assert_eq!(queue.entries().await.unwrap().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn mark_synced_unknown_entry_is_not_found() {
        let queue = queue();
        let error = queue.mark_synced(42).await.unwrap_err();
        assert!(matches!(error, StoreError::NotFound(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn mark_synced_twice_is_idempotent() {
        let queue = queue();
        let entry = queue
            .enqueue(
                Collection::Checklists,
                &RecordId::new("C1").unwrap(),
                Operation::Create,
            )
            .await
            .unwrap();

        queue.mark_synced(entry.id).await.unwrap();
        queue.mark_synced(entry.id).await.unwrap();
        assert_eq!(queue.pending_count().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn entry_timestamp_is_rfc3339() {
        let queue = queue();
        let entry = queue
            .enqueue(
                Collection::Checklists,
                &RecordId::new("C1").unwrap(),
                Operation::Create,
            )
            .await
            .unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(&entry.timestamp).is_ok());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn clear_removes_audit_log() {
        let queue = queue();
        queue
            .enqueue(
                Collection::Checklists,
                &RecordId::new("C1").unwrap(),
                Operation::Create,
            )
            .await
            .unwrap();
        queue.clear().await.unwrap();
        assert!(queue.entries().await.unwrap().is_empty());
    }
}
