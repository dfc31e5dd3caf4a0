//! fieldsync CLI - drive the offline-first field data core from a terminal
//!
//! Records are written locally first; `sync`, `full-sync` and `login` talk to
//! the configured server.

mod cli;
mod commands;
mod error;

#[cfg(test)]
mod tests;

use std::io::Write;
use std::path::Path;

use clap::Parser;
use clap_complete::Shell;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::common::Context;
use crate::commands::config::run_config;
use crate::commands::delete::run_delete;
use crate::commands::get::run_get;
use crate::commands::list::run_list;
use crate::commands::login::run_login;
use crate::commands::save::run_save;
use crate::commands::status::run_status;
use crate::commands::sync::{run_full_sync, run_pending, run_sync};
use crate::commands::upload::run_upload;
use crate::error::CliError;

const DEFAULT_LOG_DIRECTIVE: &str = "fieldsync=info";

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_DIRECTIVE)),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Commands::Completions { shell, output } = &cli.command {
        return write_completions(*shell, output.as_deref());
    }

    let context = Context::resolve(cli.config, cli.db_path)?;

    match cli.command {
        Commands::Save {
            collection,
            payload,
            id,
        } => run_save(collection.into(), payload.as_deref(), id.as_deref(), &context).await?,
        Commands::List {
            collection,
            limit,
            json,
        } => run_list(collection.into(), limit, json, &context).await?,
        Commands::Get { collection, id } => run_get(collection.into(), &id, &context).await?,
        Commands::Delete { collection, id } => {
            run_delete(collection.into(), &id, &context).await?;
        }
        Commands::Pending { all, json } => run_pending(all, json, &context).await?,
        Commands::Sync { force } => run_sync(force, &context).await?,
        Commands::FullSync { first_access } => run_full_sync(first_access, &context).await?,
        Commands::Login { tenant_id } => run_login(&tenant_id, &context).await?,
        Commands::Status { json } => run_status(json, &context).await?,
        Commands::Upload { path, mime } => run_upload(&path, &mime, &context).await?,
        Commands::Config { command } => run_config(command, &context)?,
        Commands::Completions { .. } => {}
    }

    Ok(())
}

fn write_completions(shell: Shell, output: Option<&Path>) -> Result<(), CliError> {
    let script = Cli::completion_script(shell);
    match output {
        Some(path) => {
            std::fs::write(path, &script)?;
            println!("{}", path.display());
        }
        None => std::io::stdout().write_all(&script)?,
    }
    Ok(())
}
