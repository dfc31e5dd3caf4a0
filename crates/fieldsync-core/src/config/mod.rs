//! Runtime configuration shared by the CLI and embedding apps.
//!
//! Stored as JSON. Every field is optional on disk; missing values fall back
//! to the crate defaults. Secrets may be supplied through the environment
//! instead of the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::connectivity::{
    ConnectivityConfig, DEFAULT_DEBOUNCE, DEFAULT_PROBE_INTERVAL, DEFAULT_PROBE_TIMEOUT,
};
use crate::store::{StoreConfig, DEFAULT_MAX_PAYLOAD_BYTES};
use crate::sync::{
    SyncConfig, DEFAULT_MAX_CONSECUTIVE_FAILURES, DEFAULT_REQUEST_TIMEOUT, DEFAULT_RETRY_BASE,
    DEFAULT_RETRY_CAP,
};
use crate::util::{normalize_http_base_url, normalize_text_option};

pub const ENV_API_URL: &str = "FIELDSYNC_API_URL";
pub const ENV_API_TOKEN: &str = "FIELDSYNC_API_TOKEN";

#[allow(clippy::cast_possible_truncation)]
const fn millis(duration: Duration) -> u64 {
    duration.as_millis() as u64
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct FieldSyncConfig {
    /// Remote gateway base URL; sync is disabled when unset
    pub api_url: Option<String>,
    pub api_token: Option<String>,
    /// Local database file; callers pick a platform default when unset
    pub database_path: Option<PathBuf>,
    /// Health endpoint for the reachability probe; defaults to `api_url`
    pub probe_url: Option<String>,
    pub request_timeout_ms: u64,
    pub probe_timeout_ms: u64,
    pub debounce_ms: u64,
    pub probe_interval_secs: u64,
    pub retry_base_ms: u64,
    pub retry_cap_ms: u64,
    pub max_consecutive_failures: u32,
    pub auto_sync_interval_secs: Option<u64>,
    pub max_payload_bytes: usize,
}

impl Default for FieldSyncConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            api_token: None,
            database_path: None,
            probe_url: None,
            request_timeout_ms: millis(DEFAULT_REQUEST_TIMEOUT),
            probe_timeout_ms: millis(DEFAULT_PROBE_TIMEOUT),
            debounce_ms: millis(DEFAULT_DEBOUNCE),
            probe_interval_secs: DEFAULT_PROBE_INTERVAL.as_secs(),
            retry_base_ms: millis(DEFAULT_RETRY_BASE),
            retry_cap_ms: millis(DEFAULT_RETRY_CAP),
            max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
            auto_sync_interval_secs: None,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
        }
    }
}

impl FieldSyncConfig {
    /// Load from `path`, returning defaults when the file does not exist.
    pub fn load_from_path(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|error| format!("Failed to read config at {}: {}", path.display(), error))?;
        Self::parse(&raw)
            .map_err(|error| format!("Failed to parse config at {}: {}", path.display(), error))
    }

    pub fn parse(raw: &str) -> Result<Self, String> {
        let mut config =
            serde_json::from_str::<Self>(raw).map_err(|error| error.to_string())?;
        config.normalize();
        Ok(config)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|error| {
                format!(
                    "Failed to create config directory {}: {}",
                    parent.display(),
                    error
                )
            })?;
        }

        let mut normalized = self.clone();
        normalized.normalize();
        let serialized = serde_json::to_string_pretty(&normalized)
            .map_err(|error| format!("Failed to serialize config: {error}"))?;
        std::fs::write(path, serialized)
            .map_err(|error| format!("Failed to write config at {}: {}", path.display(), error))
    }

    /// Overlay `FIELDSYNC_API_URL` / `FIELDSYNC_API_TOKEN` from `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = normalize_text_option(lookup(ENV_API_URL)) {
            self.api_url = Some(url);
        }
        if let Some(token) = normalize_text_option(lookup(ENV_API_TOKEN)) {
            self.api_token = Some(token);
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if let Some(url) = &self.api_url {
            normalize_http_base_url(url, "api_url")?;
        }
        if let Some(url) = &self.probe_url {
            normalize_http_base_url(url, "probe_url")?;
        }
        if self.request_timeout_ms == 0 {
            return Err("request_timeout_ms must be greater than zero".to_string());
        }
        if self.probe_timeout_ms == 0 {
            return Err("probe_timeout_ms must be greater than zero".to_string());
        }
        if self.retry_base_ms > self.retry_cap_ms {
            return Err(format!(
                "retry_base_ms ({}) must not exceed retry_cap_ms ({})",
                self.retry_base_ms, self.retry_cap_ms
            ));
        }
        if self.max_consecutive_failures == 0 {
            return Err("max_consecutive_failures must be at least 1".to_string());
        }
        if self.max_payload_bytes == 0 {
            return Err("max_payload_bytes must be greater than zero".to_string());
        }
        Ok(())
    }

    pub fn is_sync_configured(&self) -> bool {
        self.api_url.is_some()
    }

    /// Probe target, falling back to the API base URL.
    pub fn effective_probe_url(&self) -> Option<&str> {
        self.probe_url.as_deref().or(self.api_url.as_deref())
    }

    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub const fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub const fn store_config(&self) -> StoreConfig {
        StoreConfig {
            max_payload_bytes: self.max_payload_bytes,
        }
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            request_timeout: self.request_timeout(),
            retry_base: Duration::from_millis(self.retry_base_ms),
            retry_cap: Duration::from_millis(self.retry_cap_ms),
            max_consecutive_failures: self.max_consecutive_failures,
            auto_sync_interval: self
                .auto_sync_interval_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
        }
    }

    pub const fn connectivity_config(&self) -> ConnectivityConfig {
        ConnectivityConfig {
            debounce: Duration::from_millis(self.debounce_ms),
            probe_interval: Duration::from_secs(self.probe_interval_secs),
        }
    }

    fn normalize(&mut self) {
        self.api_url = normalize_text_option(self.api_url.take())
            .map(|url| url.trim_end_matches('/').to_string());
        self.api_token = normalize_text_option(self.api_token.take());
        self.probe_url = normalize_text_option(self.probe_url.take());
    }
}
