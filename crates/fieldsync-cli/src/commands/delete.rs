use fieldsync_core::{Collection, RecordId};

use crate::commands::common::{not_found, Context};
use crate::error::CliError;

pub async fn run_delete(collection: Collection, id: &str, context: &Context) -> Result<(), CliError> {
    let record_id = RecordId::new(id)?;
    let store = context.open_store().await?;
    if store.get(collection, &record_id).await?.is_none() {
        return Err(not_found(collection, id));
    }

    let entry = if context.config.is_sync_configured() {
        drop(store);
        let app = context.connect().await?;
        let entry = app.remove(collection, &record_id).await;
        app.shutdown();
        entry?
    } else {
        store.delete_and_enqueue(collection, &record_id).await?
    };

    match entry {
        Some(entry) => println!("Deleted {record_id} (queued as #{})", entry.id),
        None => println!("Deleted {record_id}"),
    }
    Ok(())
}
