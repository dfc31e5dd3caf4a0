//! Shared sync state types for status indicators.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Orchestrator session state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Idle,
    Syncing,
}

/// Read-only snapshot of the orchestrator's session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    pub state: SyncState,
    pub retry_count: u32,
    pub consecutive_failures: u32,
    pub last_sync_time: Option<DateTime<Utc>>,
    /// Remote calls suspended after repeated failures
    pub local_only: bool,
}

impl SyncStatus {
    /// One-line summary for status bars.
    pub fn summary(&self) -> String {
        if self.state == SyncState::Syncing {
            return "Syncing".to_string();
        }
        if self.local_only {
            return format!(
                "Local-only after {} failed attempts",
                self.consecutive_failures
            );
        }
        match self.last_sync_time {
            Some(at) => format!("Last synced {}", at.format("%Y-%m-%d %H:%M:%S UTC")),
            None => "Never synced".to_string(),
        }
    }
}
