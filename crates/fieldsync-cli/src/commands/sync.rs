use fieldsync_core::sync::{Subscription, SyncEvent, SyncEventKind};
use fieldsync_core::{Connectivity, FieldSync};

use crate::commands::common::{
    format_queue_lines, queue_entry_to_item, Context, QueueEntryItem,
};
use crate::error::CliError;

pub async fn run_sync(force: bool, context: &Context) -> Result<(), CliError> {
    let app = context.connect().await?;
    let outcome = drain(&app, force).await;
    app.shutdown();

    if outcome? {
        let remaining = app.queue().pending_count().await?;
        println!("Sync completed ({remaining} pending)");
    } else {
        println!("Sync skipped: {}", app.status().summary());
    }
    Ok(())
}

async fn drain(app: &FieldSync, force: bool) -> Result<bool, CliError> {
    require_online(app)?;
    let subscription = subscribe_printer(app);
    let outcome = if force {
        app.orchestrator().force_sync_now().await
    } else {
        app.orchestrator().check_and_sync().await
    };
    subscription.unsubscribe();
    Ok(outcome?)
}

pub async fn run_full_sync(first_access: bool, context: &Context) -> Result<(), CliError> {
    let app = context.connect().await?;
    let outcome = async {
        require_online(&app)?;
        let subscription = subscribe_printer(&app);
        let report = app.orchestrator().perform_full_sync(first_access).await;
        subscription.unsubscribe();
        Ok::<_, CliError>(report?)
    }
    .await;
    app.shutdown();

    let report = outcome?;
    for collection in &report.collections {
        match &collection.error {
            Some(error) => println!("{:<10} failed: {error}", collection.collection.as_str()),
            None => println!(
                "{:<10} {} fetched, {} removed",
                collection.collection.as_str(),
                collection.fetched,
                collection.removed
            ),
        }
    }
    Ok(())
}

pub async fn run_pending(all: bool, as_json: bool, context: &Context) -> Result<(), CliError> {
    let store = context.open_store().await?;
    let queue = fieldsync_core::SyncQueue::new(store);
    let entries = if all {
        queue.entries().await?
    } else {
        queue.pending().await?
    };

    if as_json {
        let json_items = entries
            .iter()
            .map(queue_entry_to_item)
            .collect::<Vec<QueueEntryItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("Nothing waiting to sync.");
        return Ok(());
    }

    for line in format_queue_lines(&entries) {
        println!("{line}");
    }
    Ok(())
}

pub fn require_online(app: &FieldSync) -> Result<(), CliError> {
    if app.monitor().is_online() {
        Ok(())
    } else {
        Err(CliError::Offline)
    }
}

pub fn subscribe_printer(app: &FieldSync) -> Subscription {
    app.orchestrator().subscribe(|event| {
        if let Some(line) = render_event(event) {
            eprintln!("{line}");
        }
    })
}

/// Terminal line for an event; progress ticks are folded into the summary.
pub fn render_event(event: &SyncEvent) -> Option<String> {
    match event.kind {
        SyncEventKind::Start => Some(format!("> {}", event.message)),
        SyncEventKind::Progress => None,
        SyncEventKind::Complete => Some(format!("= {}", event.message)),
        SyncEventKind::Error => Some(format!("! {}", event.message)),
    }
}

pub const fn connectivity_label(state: Connectivity) -> &'static str {
    match state {
        Connectivity::Online => "online",
        Connectivity::Offline => "offline",
    }
}
