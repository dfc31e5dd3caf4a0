//! Binary attachment model

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Blob captured by a collaborator (photo, voice note) awaiting upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Original file name, if known.
    pub filename: Option<String>,
    /// Content MIME type.
    pub mime_type: String,
    /// Raw bytes.
    pub bytes: Vec<u8>,
}

impl Attachment {
    /// Create an attachment, rejecting empty blobs and blank MIME types.
    pub fn new(mime_type: impl Into<String>, bytes: Vec<u8>) -> Result<Self, StoreError> {
        let mime_type = mime_type.into().trim().to_ascii_lowercase();
        if mime_type.is_empty() {
            return Err(StoreError::InvalidRecord(
                "attachment MIME type must not be empty".to_string(),
            ));
        }
        if bytes.is_empty() {
            return Err(StoreError::InvalidRecord(
                "attachment must not be empty".to_string(),
            ));
        }
        Ok(Self {
            filename: None,
            mime_type,
            bytes,
        })
    }

    #[must_use]
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = crate::util::normalize_text_option(Some(filename.into()));
        self
    }

    pub fn size_bytes(&self) -> usize {
        self.bytes.len()
    }
}

/// Where an uploaded attachment can be referenced from a record payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum AttachmentRef {
    /// Remote URL returned by the gateway
    Url(String),
    /// `data:` URI carrying the base64-encoded bytes
    Inline(String),
}

impl AttachmentRef {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Url(value) | Self::Inline(value) => value,
        }
    }
}
