//! Sync orchestration: single-flight queue drain, backoff, full resync and events.

mod events;
mod orchestrator;
mod scheduler;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::StoreError;
use crate::gateway::GatewayError;
use crate::models::Collection;

pub use events::{EventBus, Progress, Subscription, SyncEvent, SyncEventKind};
pub use orchestrator::SyncOrchestrator;
pub use scheduler::{backoff_delay, RetryScheduler, TokioRetryScheduler, Wake};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_RETRY_BASE: Duration = Duration::from_millis(1000);
pub const DEFAULT_RETRY_CAP: Duration = Duration::from_millis(30_000);
pub const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 5;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("Sync interrupted: {0}")]
    Interrupted(String),
    #[error("Device is offline")]
    Offline,
}

impl SyncError {
    /// Whether the orchestrator schedules a retry for this failure.
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Gateway(error) => error.is_transient(),
            Self::Store(_) | Self::Interrupted(_) | Self::Offline => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Bound on every gateway call
    pub request_timeout: Duration,
    pub retry_base: Duration,
    pub retry_cap: Duration,
    /// Failures in a row before switching to local-only mode
    pub max_consecutive_failures: u32,
    /// Periodic background sync while the driver runs
    pub auto_sync_interval: Option<Duration>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            retry_base: DEFAULT_RETRY_BASE,
            retry_cap: DEFAULT_RETRY_CAP,
            max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
            auto_sync_interval: None,
        }
    }
}

/// Mutual-exclusion token shared by sync sessions and the tenant wipe.
#[derive(Clone, Default)]
pub struct SyncGate {
    lock: Arc<Mutex<()>>,
}

/// Held for the duration of one sync session or wipe.
pub struct SyncPermit {
    _guard: OwnedMutexGuard<()>,
}

impl SyncGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the gate if nobody holds it.
    pub fn try_acquire(&self) -> Option<SyncPermit> {
        Arc::clone(&self.lock)
            .try_lock_owned()
            .ok()
            .map(|guard| SyncPermit { _guard: guard })
    }

    /// Wait for the current holder (FIFO) and take the gate.
    pub async fn acquire(&self) -> SyncPermit {
        SyncPermit {
            _guard: Arc::clone(&self.lock).lock_owned().await,
        }
    }

    pub fn is_held(&self) -> bool {
        self.lock.try_lock().is_err()
    }
}

/// Outcome of one collection's snapshot fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSync {
    pub collection: Collection,
    /// Records written to the store
    pub fetched: usize,
    /// Local records dropped because the snapshot no longer lists them
    pub removed: usize,
    pub error: Option<String>,
}

/// Per-collection result of [`SyncOrchestrator::perform_full_sync`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FullSyncReport {
    pub collections: Vec<CollectionSync>,
}

impl FullSyncReport {
    pub fn is_complete(&self) -> bool {
        self.collections.iter().all(|outcome| outcome.error.is_none())
    }

    pub fn failed(&self) -> impl Iterator<Item = &CollectionSync> {
        self.collections
            .iter()
            .filter(|outcome| outcome.error.is_some())
    }

    pub fn get(&self, collection: Collection) -> Option<&CollectionSync> {
        self.collections
            .iter()
            .find(|outcome| outcome.collection == collection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn gate_is_exclusive() {
        let gate = SyncGate::new();
        let permit = gate.try_acquire().unwrap();
        assert!(gate.is_held());
        assert!(gate.try_acquire().is_none());

        drop(permit);
        assert!(!gate.is_held());
        let _again = gate.acquire().await;
    }

    #[test]
    fn only_transient_gateway_errors_retry() {
        assert!(SyncError::Gateway(GatewayError::Network("reset".into())).is_retryable());
        assert!(!SyncError::Interrupted("offline".into()).is_retryable());
        assert!(!SyncError::Store(StoreError::NotFound("entry".into())).is_retryable());
    }

    #[test]
    fn report_without_errors_is_complete() {
        let report = FullSyncReport {
            collections: vec![
                CollectionSync {
                    collection: Collection::Templates,
                    fetched: 3,
                    removed: 0,
                    error: None,
                },
                CollectionSync {
                    collection: Collection::Vehicles,
                    fetched: 0,
                    removed: 0,
                    error: Some("timed out".into()),
                },
            ],
        };
        assert!(!report.is_complete());
        assert_eq!(report.failed().count(), 1);
        assert_eq!(report.get(Collection::Templates).unwrap().fetched, 3);
    }
}
