use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use fieldsync_core::Collection;

#[derive(Parser)]
#[command(name = "fieldsync")]
#[command(about = "Offline-first field data store with tenant-isolated sync")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Optional path to config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// Completion script for `shell`, named after the binary.
    pub fn completion_script(shell: Shell) -> Vec<u8> {
        let mut command = Self::command();
        let name = command.get_name().to_string();
        let mut script = Vec::new();
        clap_complete::generate(shell, &mut command, name, &mut script);
        script
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create or replace a record
    #[command(alias = "put")]
    Save {
        /// Target collection
        #[arg(value_enum)]
        collection: CollectionArg,
        /// JSON payload (read from stdin when omitted)
        payload: Option<String>,
        /// Record ID (generated when omitted)
        #[arg(long)]
        id: Option<String>,
    },
    /// List records in a collection
    List {
        #[arg(value_enum)]
        collection: CollectionArg,
        /// Number of records to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print one record's payload
    Get {
        #[arg(value_enum)]
        collection: CollectionArg,
        id: String,
    },
    /// Delete a record
    Delete {
        #[arg(value_enum)]
        collection: CollectionArg,
        id: String,
    },
    /// Show queued writes awaiting upload
    Pending {
        /// Include entries already synced
        #[arg(long)]
        all: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Upload queued writes
    Sync {
        /// Leave local-only mode and wait for a running session
        #[arg(long)]
        force: bool,
    },
    /// Refresh templates and vehicles from the server
    FullSync {
        /// Replace the local snapshot instead of fetching changes
        #[arg(long)]
        first_access: bool,
    },
    /// Switch tenant, wiping another tenant's local data
    Login {
        tenant_id: String,
    },
    /// Show tenant, queue and sync state
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Upload an attachment file
    Upload {
        path: PathBuf,
        /// MIME type of the file
        #[arg(long, default_value = "application/octet-stream")]
        mime: String,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: Shell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Inspect or update the config file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CollectionArg {
    Checklists,
    Templates,
    Vehicles,
    Settings,
}

impl From<CollectionArg> for Collection {
    fn from(value: CollectionArg) -> Self {
        match value {
            CollectionArg::Checklists => Self::Checklists,
            CollectionArg::Templates => Self::Templates,
            CollectionArg::Vehicles => Self::Vehicles,
            CollectionArg::Settings => Self::Settings,
        }
    }
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,
    /// Create or update the config file
    Init {
        /// Remote API base URL
        #[arg(long, value_name = "URL")]
        api_url: Option<String>,
        /// API bearer token (prefer FIELDSYNC_API_TOKEN)
        #[arg(long, value_name = "TOKEN")]
        api_token: Option<String>,
        /// Health endpoint for connectivity checks
        #[arg(long, value_name = "URL")]
        probe_url: Option<String>,
        /// Background sync period in seconds (0 disables)
        #[arg(long, value_name = "SECS")]
        auto_sync_secs: Option<u64>,
    },
}
