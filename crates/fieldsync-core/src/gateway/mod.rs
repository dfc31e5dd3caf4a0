//! Remote data gateway boundary.
//!
//! The orchestrator depends only on [`RemoteGateway`]; the HTTP specifics
//! live in [`HttpGateway`].

mod http;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{Attachment, AttachmentRef, Collection, Record, RecordId};

pub use http::{HttpGateway, DEFAULT_INLINE_THRESHOLD_BYTES};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Remote call timed out after {0:?}")]
    Timeout(Duration),
    #[error("Remote rejected request with HTTP {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("Invalid remote payload: {0}")]
    InvalidPayload(String),
    #[error("Invalid gateway configuration: {0}")]
    InvalidConfiguration(String),
}

impl GatewayError {
    /// Whether retrying the same call later may succeed.
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) => true,
            Self::Rejected { status, .. } => matches!(*status, 408 | 425 | 429 | 500..=599),
            Self::InvalidPayload(_) | Self::InvalidConfiguration(_) => false,
        }
    }
}

/// Backend API the sync orchestrator talks to.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    /// Authoritative snapshot of a collection, optionally only records
    /// updated after `since`.
    async fn fetch_collection(
        &self,
        collection: Collection,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Record>, GatewayError>;

    /// Create or replace a record remotely.
    async fn submit(&self, collection: Collection, record: &Record) -> Result<(), GatewayError>;

    /// Delete a record remotely. Deleting an unknown record succeeds.
    async fn delete(&self, collection: Collection, id: &RecordId) -> Result<(), GatewayError>;

    async fn upload_attachment(
        &self,
        attachment: &Attachment,
    ) -> Result<AttachmentRef, GatewayError>;
}
