//! Data models for fieldsync

mod attachment;
mod queue_entry;
mod record;
mod tenant;

use thiserror::Error;

pub use attachment::{Attachment, AttachmentRef};
pub use queue_entry::{EntryStatus, Operation, QueueEntry};
pub use record::{Collection, Record, RecordId};
pub use tenant::TenantContext;

/// Unknown name for one of the model enums.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind}: {value}")]
pub struct ParseError {
    kind: &'static str,
    value: String,
}

impl ParseError {
    pub(crate) fn new(kind: &'static str, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}
