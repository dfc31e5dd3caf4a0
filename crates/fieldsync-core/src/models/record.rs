//! Record model

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::StoreError;

use super::ParseError;

/// Fixed set of named collections in the local store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    /// Field checklists captured on device; the only collection pushed upstream
    Checklists,
    /// Checklist templates (server snapshot)
    Templates,
    /// Vehicle registry (server snapshot)
    Vehicles,
    /// Server-side settings for the active tenant
    Settings,
}

impl Collection {
    /// Every collection, in schema order.
    pub const ALL: [Self; 4] = [
        Self::Checklists,
        Self::Templates,
        Self::Vehicles,
        Self::Settings,
    ];

    /// Collections pulled wholesale by a full resync.
    pub const SNAPSHOTS: [Self; 2] = [Self::Templates, Self::Vehicles];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Checklists => "checklists",
            Self::Templates => "templates",
            Self::Vehicles => "vehicles",
            Self::Settings => "settings",
        }
    }

    /// Whether every local write to this collection must reach the remote.
    pub const fn tracks_sync(self) -> bool {
        matches!(self, Self::Checklists)
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "checklists" => Ok(Self::Checklists),
            "templates" => Ok(Self::Templates),
            "vehicles" => Ok(Self::Vehicles),
            "settings" => Ok(Self::Settings),
            other => Err(ParseError::new("collection", other)),
        }
    }
}

/// Identifier of a record, unique within its collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Wrap a caller-supplied id. Surrounding whitespace is trimmed.
    pub fn new(id: impl Into<String>) -> Result<Self, StoreError> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(StoreError::InvalidRecord(
                "record id must not be empty".to_string(),
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Generate a new time-sortable id (UUID v7).
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RecordId {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// A domain item stored under a collection and id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Identifier, unique within `collection`
    pub id: RecordId,
    /// Owning collection
    pub collection: Collection,
    /// JSON payload
    pub payload: serde_json::Value,
    /// Remote has acknowledged the latest local write
    pub synced: bool,
    /// Local write counter, bumped by the store on every upsert
    pub revision: i64,
    /// Last local write (Unix ms)
    pub updated_at: i64,
}

impl Record {
    /// Build an unsaved record around an already-serialized payload.
    #[must_use]
    pub fn new(collection: Collection, id: RecordId, payload: serde_json::Value) -> Self {
        Self {
            id,
            collection,
            payload,
            synced: false,
            revision: 0,
            updated_at: crate::util::unix_millis_now(),
        }
    }

    /// Build a record from any serializable value.
    ///
    /// Values that refuse to serialize (handles, callbacks, maps with
    /// non-string keys) are rejected before they reach the store or queue.
    pub fn from_serializable<T>(
        collection: Collection,
        id: RecordId,
        payload: &T,
    ) -> Result<Self, StoreError>
    where
        T: Serialize + ?Sized,
    {
        let payload = serde_json::to_value(payload)
            .map_err(|error| StoreError::NotSerializable(error.to_string()))?;
        Ok(Self::new(collection, id, payload))
    }

    /// Decode the payload into a typed value.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}
