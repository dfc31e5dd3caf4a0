use std::collections::HashMap;
use std::path::PathBuf;

use fieldsync_core::sync::SyncEvent;
use fieldsync_core::{Collection, FieldSyncConfig, RecordId, SyncQueue};
use pretty_assertions::assert_eq;
use serde_json::json;

use clap_complete::Shell;

use crate::cli::{Cli, CollectionArg};
use crate::commands::common::{
    format_relative_time, load_config, parse_payload, payload_preview, resolve_db_path, Context,
};
use crate::commands::config::apply_init_values;
use crate::commands::delete::run_delete;
use crate::commands::get::run_get;
use crate::commands::save::run_save;
use crate::commands::status::collect_status;
use crate::commands::sync::{render_event, run_sync};
use crate::error::CliError;

fn local_context(dir: &tempfile::TempDir) -> Context {
    Context {
        config_path: dir.path().join("config.json"),
        db_path: dir.path().join("fieldsync.db"),
        config: FieldSyncConfig::default(),
    }
}

#[test]
fn format_relative_time_units() {
    let now = 10_000_000_000;
    assert_eq!(format_relative_time(now - 30_000, now), "just now");
    assert_eq!(format_relative_time(now - 120_000, now), "2m ago");
    assert_eq!(format_relative_time(now - 2 * 60 * 60_000, now), "2h ago");
    assert_eq!(format_relative_time(now - 3 * 24 * 60 * 60_000, now), "3d ago");
}

#[test]
fn parse_payload_requires_json() {
    assert!(matches!(parse_payload("  "), Err(CliError::EmptyPayload)));
    assert!(matches!(
        parse_payload("{not json"),
        Err(CliError::InvalidPayload(_))
    ));
    assert_eq!(
        parse_payload(r#" {"odometer": 120} "#).unwrap(),
        json!({"odometer": 120})
    );
}

#[test]
fn payload_preview_truncates_long_payloads() {
    let payload = json!({"notes": "a".repeat(100)});
    let preview = payload_preview(&payload, 20);
    assert_eq!(preview.chars().count(), 20);
    assert!(preview.ends_with("..."));
    assert_eq!(payload_preview(&json!({"a": 1}), 20), r#"{"a":1}"#);
}

#[test]
fn collection_arg_maps_to_core_collection() {
    assert_eq!(Collection::from(CollectionArg::Checklists), Collection::Checklists);
    assert_eq!(Collection::from(CollectionArg::Vehicles), Collection::Vehicles);
}

#[test]
fn load_config_applies_env_overrides() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{"api_url": "https://file.test", "debounce_ms": 250}"#).unwrap();

    let env = HashMap::from([("FIELDSYNC_API_TOKEN", "from-env".to_string())]);
    let config = load_config(&path, |key| env.get(key).cloned()).unwrap();
    assert_eq!(config.api_url.as_deref(), Some("https://file.test"));
    assert_eq!(config.api_token.as_deref(), Some("from-env"));
    assert_eq!(config.debounce_ms, 250);
}

#[test]
fn load_config_rejects_unknown_fields() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{"proxy_url": "https://x.test"}"#).unwrap();

    let error = load_config(&path, |_| None).unwrap_err();
    assert!(matches!(error, CliError::Config(message) if message.contains("unknown field")));
}

#[test]
fn resolve_db_path_prefers_explicit_path() {
    let config = FieldSyncConfig {
        database_path: Some(PathBuf::from("/from/config.db")),
        ..Default::default()
    };
    let resolved = resolve_db_path(Some(PathBuf::from("/explicit.db")), &config).unwrap();
    assert_eq!(resolved, PathBuf::from("/explicit.db"));
}

#[test]
fn apply_init_values_validates_urls() {
    let mut config = FieldSyncConfig::default();
    let error = apply_init_values(
        &mut config,
        Some("api.fieldsync.test".to_string()),
        None,
        None,
        None,
    )
    .unwrap_err();
    assert!(matches!(error, CliError::Config(_)));

    apply_init_values(
        &mut config,
        Some("https://api.fieldsync.test/".to_string()),
        Some("  ".to_string()),
        None,
        Some(0),
    )
    .unwrap();
    assert_eq!(config.api_url.as_deref(), Some("https://api.fieldsync.test"));
    assert_eq!(config.api_token, None);
    assert_eq!(config.auto_sync_interval_secs, None);
}

#[test]
fn render_event_skips_progress_ticks() {
    assert_eq!(render_event(&SyncEvent::progress(1, 3)), None);
    assert_eq!(
        render_event(&SyncEvent::error("Network error: reset")).as_deref(),
        Some("! Network error: reset")
    );
}

#[test]
fn completion_scripts_name_the_binary() {
    for shell in [Shell::Bash, Shell::Zsh, Shell::Fish, Shell::PowerShell] {
        let script = String::from_utf8(Cli::completion_script(shell)).unwrap();
        assert!(script.contains("fieldsync"), "{shell} script lacks binary name");
    }
    let fish = String::from_utf8(Cli::completion_script(Shell::Fish)).unwrap();
    assert!(fish.contains("complete -c fieldsync"));
}

#[test]
fn completions_can_be_written_to_a_file() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("fieldsync.bash");
    crate::write_completions(Shell::Bash, Some(&output)).unwrap();
    let script = std::fs::read(&output).unwrap();
    assert_eq!(script, Cli::completion_script(Shell::Bash));
}

#[tokio::test(flavor = "multi_thread")]
async fn save_without_server_queues_every_write() {
    let dir = tempfile::tempdir().unwrap();
    let context = local_context(&dir);

    run_save(
        Collection::Vehicles,
        Some(r#"{"plate": "FS-001"}"#),
        Some("V1"),
        &context,
    )
    .await
    .unwrap();
    run_save(
        Collection::Checklists,
        Some(r#"{"vehicle": "V1", "done": false}"#),
        Some("C1"),
        &context,
    )
    .await
    .unwrap();

    let store = context.open_store().await.unwrap();
    let pending = SyncQueue::new(store.clone()).pending().await.unwrap();
    assert_eq!(pending.len(), 2);
    let record = store
        .get(Collection::Vehicles, &RecordId::new("V1").unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.payload, json!({"plate": "FS-001"}));
    assert!(!record.synced);
}

#[tokio::test(flavor = "multi_thread")]
async fn delete_queues_removal_and_get_reports_missing() {
    let dir = tempfile::tempdir().unwrap();
    let context = local_context(&dir);
    run_save(Collection::Checklists, Some("{}"), Some("C1"), &context)
        .await
        .unwrap();

    run_delete(Collection::Checklists, "C1", &context)
        .await
        .unwrap();

    let error = run_get(Collection::Checklists, "C1", &context)
        .await
        .unwrap_err();
    assert!(matches!(error, CliError::RecordNotFound { .. }));
    let error = run_delete(Collection::Checklists, "C1", &context)
        .await
        .unwrap_err();
    assert!(matches!(error, CliError::RecordNotFound { .. }));

    let store = context.open_store().await.unwrap();
    let operations: Vec<_> = SyncQueue::new(store)
        .pending()
        .await
        .unwrap()
        .iter()
        .map(|entry| entry.operation.as_str())
        .collect();
    assert_eq!(operations, vec!["create", "delete"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn sync_requires_server_configuration() {
    let dir = tempfile::tempdir().unwrap();
    let context = local_context(&dir);

    let error = run_sync(false, &context).await.unwrap_err();
    assert!(matches!(error, CliError::SyncNotConfigured));
}

#[tokio::test(flavor = "multi_thread")]
async fn status_reports_local_queue_without_server() {
    let dir = tempfile::tempdir().unwrap();
    let context = local_context(&dir);
    run_save(Collection::Checklists, Some("{}"), Some("C1"), &context)
        .await
        .unwrap();

    let report = collect_status(&context).await.unwrap();
    assert_eq!(report.tenant, None);
    assert_eq!(report.pending, 1);
    assert_eq!(report.unsynced_checklists, 1);
    assert_eq!(report.connectivity, None);
    assert_eq!(report.last_fetch.len(), 2);
}
