use fieldsync_core::{Collection, Record, RecordId};

use crate::commands::common::{resolve_payload, save_record, Context};
use crate::error::CliError;

pub async fn run_save(
    collection: Collection,
    payload: Option<&str>,
    id: Option<&str>,
    context: &Context,
) -> Result<(), CliError> {
    let payload = resolve_payload(payload)?;
    let id = match id {
        Some(raw) => RecordId::new(raw)?,
        None => RecordId::generate(),
    };
    let record = Record::new(collection, id, payload);

    match save_record(context, &record).await? {
        Some(entry) => println!("{} (queued as #{})", record.id, entry.id),
        None => println!("{}", record.id),
    }
    Ok(())
}
