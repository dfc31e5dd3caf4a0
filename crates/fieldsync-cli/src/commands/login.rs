use crate::commands::common::Context;
use crate::error::CliError;

pub async fn run_login(tenant_id: &str, context: &Context) -> Result<(), CliError> {
    let app = context.connect().await?;
    let outcome = app.login(tenant_id).await;
    app.shutdown();
    let outcome = outcome?;

    if outcome.wiped {
        println!("Switched tenant; local data from the previous tenant was removed");
    } else {
        println!("Logged in as {}", tenant_id.trim());
    }
    match outcome.full_sync {
        Some(report) if report.is_complete() => println!("Templates and vehicles are up to date"),
        Some(report) => {
            for failed in report.failed() {
                println!(
                    "Could not refresh {}: {}",
                    failed.collection,
                    failed.error.as_deref().unwrap_or("unknown error")
                );
            }
        }
        None => println!("Offline: sync will run once the server is reachable"),
    }
    Ok(())
}
