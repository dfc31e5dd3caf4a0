use std::env;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};

use chrono::Utc;
use fieldsync_core::{
    Collection, Connectivity, FieldSync, FieldSyncConfig, LocalStore, QueueEntry, Record,
};
use serde::Serialize;

use crate::error::CliError;

const CONFIG_FILE_NAME: &str = "config.json";
const DB_FILE_NAME: &str = "fieldsync.db";

/// Paths and settings resolved once per invocation.
#[derive(Debug, Clone)]
pub struct Context {
    pub config_path: PathBuf,
    pub db_path: PathBuf,
    pub config: FieldSyncConfig,
}

impl Context {
    pub fn resolve(
        cli_config_path: Option<PathBuf>,
        cli_db_path: Option<PathBuf>,
    ) -> Result<Self, CliError> {
        let config_path = match cli_config_path {
            Some(path) => path,
            None => default_config_path()?,
        };
        let config = load_config(&config_path, |key| env::var(key).ok())?;
        let db_path = resolve_db_path(cli_db_path, &config)?;
        Ok(Self {
            config_path,
            db_path,
            config,
        })
    }

    /// Local store only; no network access.
    pub async fn open_store(&self) -> Result<LocalStore, CliError> {
        let store = LocalStore::open_path(self.db_path.clone(), self.config.store_config());
        store.init().await?;
        Ok(store)
    }

    /// Full runtime with a fresh connectivity probe.
    ///
    /// The background driver is never started; each command runs its sync
    /// pass explicitly and owns it until shutdown.
    pub async fn connect(&self) -> Result<FieldSync, CliError> {
        if !self.config.is_sync_configured() {
            return Err(CliError::SyncNotConfigured);
        }
        let app = FieldSync::from_config(&self.config, self.db_path.clone())?;
        app.init().await?;
        if app.refresh_connectivity(true).await == Connectivity::Offline {
            tracing::warn!("Server is unreachable; working offline");
        }
        Ok(app)
    }
}

pub fn default_config_path() -> Result<PathBuf, CliError> {
    dirs::config_dir()
        .map(|dir| dir.join("fieldsync").join(CONFIG_FILE_NAME))
        .ok_or_else(|| CliError::Config("Failed to resolve config directory".to_string()))
}

pub fn load_config<F>(path: &Path, lookup: F) -> Result<FieldSyncConfig, CliError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = FieldSyncConfig::load_from_path(path).map_err(CliError::Config)?;
    config.apply_env_overrides(lookup);
    config.validate().map_err(CliError::Config)?;
    Ok(config)
}

pub fn resolve_db_path(
    cli_db_path: Option<PathBuf>,
    config: &FieldSyncConfig,
) -> Result<PathBuf, CliError> {
    if let Some(path) = cli_db_path
        .or_else(|| env::var_os("FIELDSYNC_DB_PATH").map(PathBuf::from))
        .or_else(|| config.database_path.clone())
    {
        return Ok(path);
    }
    default_db_path()
}

pub fn default_db_path() -> Result<PathBuf, CliError> {
    dirs::data_dir()
        .map(|dir| dir.join("fieldsync").join(DB_FILE_NAME))
        .ok_or_else(|| CliError::Config("Failed to resolve data directory".to_string()))
}

/// Persist through the runtime when a server is configured, otherwise queue
/// locally for a later sync.
pub async fn save_record(context: &Context, record: &Record) -> Result<Option<QueueEntry>, CliError> {
    if context.config.is_sync_configured() {
        let app = context.connect().await?;
        let entry = app.save(record).await;
        app.shutdown();
        return Ok(entry?);
    }
    let store = context.open_store().await?;
    Ok(Some(store.write_and_enqueue(record).await?))
}

#[derive(Debug, Serialize)]
pub struct RecordListItem {
    pub id: String,
    pub collection: String,
    pub synced: bool,
    pub revision: i64,
    pub updated_at: i64,
    pub relative_time: String,
    pub payload: serde_json::Value,
}

pub fn record_to_list_item(record: &Record) -> RecordListItem {
    let now_ms = Utc::now().timestamp_millis();
    RecordListItem {
        id: record.id.to_string(),
        collection: record.collection.to_string(),
        synced: record.synced,
        revision: record.revision,
        updated_at: record.updated_at,
        relative_time: format_relative_time(record.updated_at, now_ms),
        payload: record.payload.clone(),
    }
}

pub fn format_record_lines(records: &[Record]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    records
        .iter()
        .map(|record| {
            let id = record.id.to_string();
            let short_id = id.chars().take(13).collect::<String>();
            let marker = if record.synced { " " } else { "*" };
            let preview = payload_preview(&record.payload, 48);
            let relative_time = format_relative_time(record.updated_at, now_ms);
            format!("{marker} {short_id:<13}  {preview:<48}  {relative_time}")
        })
        .collect()
}

#[derive(Debug, Serialize)]
pub struct QueueEntryItem {
    pub id: i64,
    pub collection: String,
    pub record_id: String,
    pub operation: String,
    pub status: String,
    pub timestamp: String,
}

pub fn queue_entry_to_item(entry: &QueueEntry) -> QueueEntryItem {
    QueueEntryItem {
        id: entry.id,
        collection: entry.collection.to_string(),
        record_id: entry.record_id.to_string(),
        operation: entry.operation.to_string(),
        status: entry.status.to_string(),
        timestamp: entry.timestamp.clone(),
    }
}

pub fn format_queue_lines(entries: &[QueueEntry]) -> Vec<String> {
    entries
        .iter()
        .map(|entry| {
            format!(
                "#{:<5} {:<7} {:<10} {}  {}  {}",
                entry.id,
                entry.status.as_str(),
                entry.collection.as_str(),
                entry.operation.as_str(),
                entry.record_id,
                entry.timestamp
            )
        })
        .collect()
}

/// Single-line rendering of a JSON payload, truncated to `max_chars`.
pub fn payload_preview(payload: &serde_json::Value, max_chars: usize) -> String {
    let rendered = payload.to_string();
    if rendered.chars().count() <= max_chars {
        rendered
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = rendered.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

pub fn parse_payload(raw: &str) -> Result<serde_json::Value, CliError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CliError::EmptyPayload);
    }
    serde_json::from_str(trimmed).map_err(|error| CliError::InvalidPayload(error.to_string()))
}

/// Payload from the argument, falling back to piped stdin.
pub fn resolve_payload(argument: Option<&str>) -> Result<serde_json::Value, CliError> {
    if let Some(raw) = argument.filter(|raw| *raw != "-") {
        return parse_payload(raw);
    }
    match read_piped_stdin()? {
        Some(raw) => parse_payload(&raw),
        None => Err(CliError::EmptyPayload),
    }
}

pub fn read_piped_stdin() -> Result<Option<String>, CliError> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }

    let mut buffer = String::new();
    stdin.lock().read_to_string(&mut buffer)?;
    let trimmed = buffer.trim();
    Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
}

pub fn not_found(collection: Collection, id: &str) -> CliError {
    CliError::RecordNotFound {
        collection: collection.to_string(),
        id: id.to_string(),
    }
}
