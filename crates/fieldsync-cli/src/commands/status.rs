use fieldsync_core::store::keys;
use fieldsync_core::{Collection, SyncQueue};
use serde::Serialize;

use crate::commands::common::Context;
use crate::commands::sync::connectivity_label;
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub database: String,
    pub tenant: Option<String>,
    pub pending: usize,
    pub unsynced_checklists: usize,
    pub api_url: Option<String>,
    pub connectivity: Option<&'static str>,
    pub last_fetch: Vec<(String, Option<String>)>,
}

pub async fn run_status(as_json: bool, context: &Context) -> Result<(), CliError> {
    let report = collect_status(context).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Database:     {}", report.database);
    println!(
        "Tenant:       {}",
        report.tenant.as_deref().unwrap_or("(not logged in)")
    );
    println!("Pending:      {}", report.pending);
    println!("Unsynced:     {} checklists", report.unsynced_checklists);
    println!(
        "Server:       {}",
        report.api_url.as_deref().unwrap_or("(not configured)")
    );
    if let Some(connectivity) = report.connectivity {
        println!("Connectivity: {connectivity}");
    }
    for (collection, fetched_at) in &report.last_fetch {
        println!(
            "{:<13} {}",
            format!("{collection}:"),
            fetched_at.as_deref().unwrap_or("never fetched")
        );
    }
    Ok(())
}

pub async fn collect_status(context: &Context) -> Result<StatusReport, CliError> {
    let store = context.open_store().await?;
    let tenant = store.get_setting(keys::CURRENT_TENANT_ID).await?;
    let pending = SyncQueue::new(store.clone()).pending_count().await?;
    let unsynced_checklists = store
        .get_all(Collection::Checklists)
        .await?
        .iter()
        .filter(|record| !record.synced)
        .count();

    let mut last_fetch = Vec::new();
    for collection in Collection::SNAPSHOTS {
        last_fetch.push((
            collection.to_string(),
            store.get_setting(&keys::last_fetch(collection)).await?,
        ));
    }
    drop(store);

    let connectivity = if context.config.is_sync_configured() {
        let app = context.connect().await?;
        let state = app.monitor().subscribe().current();
        app.shutdown();
        Some(connectivity_label(state))
    } else {
        None
    };

    Ok(StatusReport {
        database: context.db_path.display().to_string(),
        tenant,
        pending,
        unsynced_checklists,
        api_url: context.config.api_url.clone(),
        connectivity,
        last_fetch,
    })
}
