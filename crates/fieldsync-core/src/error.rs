//! Error types for fieldsync-core

use thiserror::Error;

use crate::gateway::GatewayError;
use crate::sync::SyncError;
use crate::tenant::TenantError;

/// Result type alias using fieldsync-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the local store and the sync queue.
///
/// The store never retries; callers decide whether to surface or skip.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Payload cannot be represented in the storage format
    #[error("Record payload is not serializable: {0}")]
    NotSerializable(String),

    /// Record failed validation before reaching the engine
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// Payload exceeds the configured per-record quota
    #[error("Storage quota exceeded: payload is {size} bytes, limit is {limit} bytes")]
    QuotaExceeded { size: usize, limit: usize },

    /// Queue entry or record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Stored row could not be decoded
    #[error("Corrupted store row: {0}")]
    Corrupted(String),

    /// libSQL engine error
    #[error("libSQL error: {0}")]
    Engine(#[from] libsql::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Whether the error is a per-record validation failure rather than an
    /// engine fault.
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::NotSerializable(_) | Self::InvalidRecord(_) | Self::QuotaExceeded { .. }
        )
    }
}

/// Queue errors share the store's durability substrate.
pub type QueueError = StoreError;

/// Top-level errors for fieldsync-core operations
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Tenant(#[from] TenantError),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}
