use std::path::Path;

use fieldsync_core::models::{Attachment, AttachmentRef};

use crate::commands::common::Context;
use crate::commands::sync::require_online;
use crate::error::CliError;

pub async fn run_upload(path: &Path, mime: &str, context: &Context) -> Result<(), CliError> {
    let bytes = std::fs::read(path)?;
    let mut attachment = Attachment::new(mime, bytes)?;
    if let Some(name) = path.file_name().and_then(|name| name.to_str()) {
        attachment = attachment.with_filename(name);
    }

    let app = context.connect().await?;
    let outcome = async {
        require_online(&app)?;
        Ok::<_, CliError>(app.upload_attachment(&attachment).await?)
    }
    .await;
    app.shutdown();

    match outcome? {
        AttachmentRef::Url(url) => println!("{url}"),
        AttachmentRef::Inline(data) => {
            println!("Stored inline ({} bytes)", attachment.size_bytes());
            tracing::debug!("Inline reference is {} characters", data.len());
        }
    }
    Ok(())
}
