use fieldsync_core::Collection;

use crate::commands::common::{
    format_record_lines, record_to_list_item, Context, RecordListItem,
};
use crate::error::CliError;

pub async fn run_list(
    collection: Collection,
    limit: usize,
    as_json: bool,
    context: &Context,
) -> Result<(), CliError> {
    let store = context.open_store().await?;
    let mut records = store.get_all(collection).await?;
    records.sort_by(|left, right| right.updated_at.cmp(&left.updated_at));
    records.truncate(limit);

    if as_json {
        let json_items = records
            .iter()
            .map(record_to_list_item)
            .collect::<Vec<RecordListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else if records.is_empty() {
        println!("No {collection} stored locally.");
    } else {
        for line in format_record_lines(&records) {
            println!("{line}");
        }
    }

    Ok(())
}
