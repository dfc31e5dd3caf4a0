use fieldsync_core::{Collection, RecordId};

use crate::commands::common::{not_found, Context};
use crate::error::CliError;

pub async fn run_get(collection: Collection, id: &str, context: &Context) -> Result<(), CliError> {
    let store = context.open_store().await?;
    let record = store
        .get(collection, &RecordId::new(id)?)
        .await?
        .ok_or_else(|| not_found(collection, id))?;
    println!("{}", serde_json::to_string_pretty(&record.payload)?);
    Ok(())
}
