//! Local persistent store shared by the queue, orchestrator and tenant manager.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard, OnceCell};

use crate::db::{
    self, Database, LibSqlQueueRepository, LibSqlRecordRepository, LibSqlSettingsRepository,
    QueueRepository, RecordRepository, SettingsRepository,
};
use crate::error::StoreError;
use crate::models::{Collection, Operation, QueueEntry, Record, RecordId};

/// Default per-record payload limit (5 MiB).
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 5 * 1024 * 1024;

/// Well-known keys in the local settings area.
pub mod keys {
    pub const APP_VERSION: &str = "app_version";
    pub const INSTALL_FLAG: &str = "install_flag";
    pub const UPDATE_PROMPT_SHOWN: &str = "update_prompt_shown";
    pub const CURRENT_TENANT_ID: &str = "current_tenant_id";
    pub const PREVIOUS_TENANT_ID: &str = "previous_tenant_id";
    pub const TENANT_WIPE_PENDING: &str = "tenant_wipe_pending";

    /// Keys that survive a tenant wipe.
    pub const PRESERVED: [&str; 6] = [
        APP_VERSION,
        INSTALL_FLAG,
        UPDATE_PROMPT_SHOWN,
        CURRENT_TENANT_ID,
        PREVIOUS_TENANT_ID,
        TENANT_WIPE_PENDING,
    ];

    /// Key holding the last successful snapshot fetch for a collection.
    pub fn last_fetch(collection: crate::models::Collection) -> String {
        format!("last_fetch:{collection}")
    }
}

/// Store tuning knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Largest serialized payload accepted by a single write
    pub max_payload_bytes: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
        }
    }
}

#[derive(Debug, Clone)]
enum Location {
    Path(PathBuf),
    Memory,
}

struct Inner {
    location: Location,
    config: StoreConfig,
    db: OnceCell<Mutex<Database>>,
}

/// Durable, collection-oriented record store.
///
/// Cloning is cheap; clones share one engine. The engine is opened on first
/// use (or by [`LocalStore::init`]).
#[derive(Clone)]
pub struct LocalStore {
    inner: Arc<Inner>,
}

impl LocalStore {
    /// Store backed by a file at `path`. Parent directories are created on init.
    pub fn open_path(path: impl Into<PathBuf>, config: StoreConfig) -> Self {
        Self::with_location(Location::Path(path.into()), config)
    }

    /// Store backed by an in-memory database (primarily for tests).
    pub fn in_memory() -> Self {
        Self::with_location(Location::Memory, StoreConfig::default())
    }

    /// In-memory store with custom limits.
    pub fn in_memory_with(config: StoreConfig) -> Self {
        Self::with_location(Location::Memory, config)
    }

    fn with_location(location: Location, config: StoreConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                location,
                config,
                db: OnceCell::new(),
            }),
        }
    }

    /// Open the engine and run migrations.
    ///
    /// Idempotent. Concurrent callers await the same initialization.
    pub async fn init(&self) -> Result<(), StoreError> {
        self.database().await.map(|_| ())
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    async fn database(&self) -> Result<&Mutex<Database>, StoreError> {
        self.inner
            .db
            .get_or_try_init(|| async {
                let db = match &self.inner.location {
                    Location::Path(path) => {
                        if let Some(parent) = path.parent() {
                            std::fs::create_dir_all(parent)?;
                        }
                        tracing::info!("Opening local store at {}", path.display());
                        Database::open(path).await?
                    }
                    Location::Memory => Database::open_in_memory().await?,
                };
                Ok::<_, StoreError>(Mutex::new(db))
            })
            .await
    }

    /// Exclusive access to the engine for multi-statement work.
    pub(crate) async fn lock(&self) -> Result<MutexGuard<'_, Database>, StoreError> {
        Ok(self.database().await?.lock().await)
    }

    fn encode(&self, record: &Record) -> Result<String, StoreError> {
        let payload = serde_json::to_string(&record.payload)
            .map_err(|error| StoreError::NotSerializable(error.to_string()))?;
        let limit = self.inner.config.max_payload_bytes;
        if payload.len() > limit {
            return Err(StoreError::QuotaExceeded {
                size: payload.len(),
                limit,
            });
        }
        Ok(payload)
    }

    /// Upsert a record without touching the sync queue.
    ///
    /// The record's own `synced` flag is stored as given. Collections that
    /// track sync are rejected; they only change through
    /// [`LocalStore::write_and_enqueue`].
    pub async fn put(&self, record: &Record) -> Result<(), StoreError> {
        if record.collection.tracks_sync() {
            return Err(StoreError::InvalidRecord(format!(
                "{} writes must go through the sync queue",
                record.collection
            )));
        }
        let payload = self.encode(record)?;
        let db = self.lock().await?;
        LibSqlRecordRepository::new(db.connection())
            .upsert(record, &payload, record.synced)
            .await?;
        Ok(())
    }

    /// Upsert a record as unsynced and append its queue entry atomically.
    pub async fn write_and_enqueue(&self, record: &Record) -> Result<QueueEntry, StoreError> {
        let payload = self.encode(record)?;
        let db = self.lock().await?;
        let conn = db.connection();

        db::begin(conn).await?;
        let outcome = async {
            let records = LibSqlRecordRepository::new(conn);
            let operation = if records.exists(record.collection, &record.id).await? {
                Operation::Update
            } else {
                Operation::Create
            };
            records.upsert(record, &payload, false).await?;
            LibSqlQueueRepository::new(conn)
                .insert(
                    record.collection,
                    &record.id,
                    operation,
                    &crate::util::rfc3339_now(),
                )
                .await
        }
        .await;
        let entry = db::finish(conn, outcome).await?;

        tracing::debug!(
            "Queued {} for {}/{} as entry {}",
            entry.operation,
            entry.collection,
            entry.record_id,
            entry.id
        );
        Ok(entry)
    }

    /// Delete a record and append a `delete` queue entry atomically.
    ///
    /// Returns `None` when the record did not exist.
    pub async fn delete_and_enqueue(
        &self,
        collection: Collection,
        id: &RecordId,
    ) -> Result<Option<QueueEntry>, StoreError> {
        let db = self.lock().await?;
        let conn = db.connection();

        db::begin(conn).await?;
        let outcome = async {
            if !LibSqlRecordRepository::new(conn).delete(collection, id).await? {
                return Ok(None);
            }
            LibSqlQueueRepository::new(conn)
                .insert(collection, id, Operation::Delete, &crate::util::rfc3339_now())
                .await
                .map(Some)
        }
        .await;
        db::finish(conn, outcome).await
    }

    pub async fn get(
        &self,
        collection: Collection,
        id: &RecordId,
    ) -> Result<Option<Record>, StoreError> {
        let db = self.lock().await?;
        LibSqlRecordRepository::new(db.connection())
            .get(collection, id)
            .await
    }

    /// Every record in a collection, ordered by id.
    pub async fn get_all(&self, collection: Collection) -> Result<Vec<Record>, StoreError> {
        let db = self.lock().await?;
        LibSqlRecordRepository::new(db.connection())
            .list(collection)
            .await
    }

    /// Delete a record. Deleting a missing record is not an error.
    pub async fn delete(&self, collection: Collection, id: &RecordId) -> Result<(), StoreError> {
        let db = self.lock().await?;
        LibSqlRecordRepository::new(db.connection())
            .delete(collection, id)
            .await?;
        Ok(())
    }

    pub async fn count(&self, collection: Collection) -> Result<usize, StoreError> {
        let db = self.lock().await?;
        LibSqlRecordRepository::new(db.connection())
            .count(collection)
            .await
    }

    /// Mark a record synced if it still carries `revision`.
    ///
    /// Returns false when a newer local write landed after the send.
    pub async fn mark_record_synced(
        &self,
        collection: Collection,
        id: &RecordId,
        revision: i64,
    ) -> Result<bool, StoreError> {
        let db = self.lock().await?;
        LibSqlRecordRepository::new(db.connection())
            .mark_synced(collection, id, revision)
            .await
    }

    /// Wipe every collection and every setting outside [`keys::PRESERVED`].
    pub(crate) async fn clear_all(&self) -> Result<(), StoreError> {
        let db = self.lock().await?;
        let conn = db.connection();

        db::begin(conn).await?;
        let outcome = async {
            LibSqlRecordRepository::new(conn).clear().await?;
            LibSqlSettingsRepository::new(conn)
                .retain(&keys::PRESERVED)
                .await
        }
        .await;
        let removed = db::finish(conn, outcome).await?;

        tracing::info!("Cleared all collections and {removed} local settings");
        Ok(())
    }

    pub async fn get_setting(&self, key: &str) -> Result<Option<String>, StoreError> {
        let db = self.lock().await?;
        LibSqlSettingsRepository::new(db.connection()).get(key).await
    }

    pub async fn set_setting(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let db = self.lock().await?;
        LibSqlSettingsRepository::new(db.connection())
            .set(key, value)
            .await
    }

    pub async fn remove_setting(&self, key: &str) -> Result<(), StoreError> {
        let db = self.lock().await?;
        LibSqlSettingsRepository::new(db.connection())
            .remove(key)
            .await
    }
}
