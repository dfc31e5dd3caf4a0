//! fieldsync-core - Offline-first data core for field apps
//!
//! A durable local store that keeps working without connectivity, a queue of
//! not-yet-acknowledged writes, and the control plane that reconciles both
//! with a remote gateway: connectivity monitoring, a single-flight sync
//! orchestrator with exponential backoff, and tenant data isolation.

pub mod config;
pub mod connectivity;
pub mod db;
pub mod error;
pub mod gateway;
pub mod models;
pub mod queue;
pub mod runtime;
pub mod state;
pub mod store;
pub mod sync;
pub mod tenant;
pub mod util;

#[cfg(test)]
mod testing;

pub use config::FieldSyncConfig;
pub use connectivity::{Connectivity, ConnectivityMonitor};
pub use error::{Error, QueueError, Result, StoreError};
pub use models::{Collection, QueueEntry, Record, RecordId};
pub use queue::SyncQueue;
pub use runtime::{FieldSync, LoginOutcome};
pub use state::{SyncState, SyncStatus};
pub use store::LocalStore;
pub use sync::{SyncEvent, SyncEventKind, SyncOrchestrator};
pub use tenant::TenantManager;
