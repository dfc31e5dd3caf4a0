use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] fieldsync_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("No record payload provided")]
    EmptyPayload,
    #[error("Record payload must be valid JSON: {0}")]
    InvalidPayload(String),
    #[error("Record not found: {collection}/{id}")]
    RecordNotFound { collection: String, id: String },
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Server unreachable; run the command again once online")]
    Offline,
    #[error(
        "Sync is not configured. Run `fieldsync config init --api-url <URL>` or set FIELDSYNC_API_URL."
    )]
    SyncNotConfigured,
}

impl From<fieldsync_core::StoreError> for CliError {
    fn from(error: fieldsync_core::StoreError) -> Self {
        Self::Core(error.into())
    }
}

impl From<fieldsync_core::sync::SyncError> for CliError {
    fn from(error: fieldsync_core::sync::SyncError) -> Self {
        Self::Core(error.into())
    }
}
