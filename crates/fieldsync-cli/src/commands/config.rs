use fieldsync_core::util::normalize_http_base_url;
use fieldsync_core::FieldSyncConfig;

use crate::cli::ConfigCommands;
use crate::commands::common::Context;
use crate::error::CliError;

pub fn run_config(command: ConfigCommands, context: &Context) -> Result<(), CliError> {
    match command {
        ConfigCommands::Show => run_config_show(context),
        ConfigCommands::Init {
            api_url,
            api_token,
            probe_url,
            auto_sync_secs,
        } => run_config_init(context, api_url, api_token, probe_url, auto_sync_secs),
    }
}

fn run_config_show(context: &Context) -> Result<(), CliError> {
    let mut shown = context.config.clone();
    if shown.api_token.is_some() {
        shown.api_token = Some("********".to_string());
    }
    println!("# {}", context.config_path.display());
    println!("{}", serde_json::to_string_pretty(&shown)?);
    Ok(())
}

#[allow(clippy::needless_pass_by_value)]
pub fn run_config_init(
    context: &Context,
    api_url: Option<String>,
    api_token: Option<String>,
    probe_url: Option<String>,
    auto_sync_secs: Option<u64>,
) -> Result<(), CliError> {
    // start from the file alone so env overrides are not persisted
    let mut config =
        FieldSyncConfig::load_from_path(&context.config_path).map_err(CliError::Config)?;
    apply_init_values(&mut config, api_url, api_token, probe_url, auto_sync_secs)?;
    config.validate().map_err(CliError::Config)?;
    config
        .save_to_path(&context.config_path)
        .map_err(CliError::Config)?;

    println!("Saved config to {}", context.config_path.display());
    if config.api_url.is_none() {
        println!("No api_url set; records stay on this device until one is configured.");
    }
    Ok(())
}

pub fn apply_init_values(
    config: &mut FieldSyncConfig,
    api_url: Option<String>,
    api_token: Option<String>,
    probe_url: Option<String>,
    auto_sync_secs: Option<u64>,
) -> Result<(), CliError> {
    if let Some(url) = api_url {
        config.api_url = Some(normalize_http_base_url(&url, "api_url").map_err(CliError::Config)?);
    }
    if let Some(url) = probe_url {
        config.probe_url =
            Some(normalize_http_base_url(&url, "probe_url").map_err(CliError::Config)?);
    }
    if let Some(token) = api_token {
        config.api_token = fieldsync_core::util::normalize_text_option(Some(token));
    }
    if let Some(secs) = auto_sync_secs {
        config.auto_sync_interval_secs = (secs > 0).then_some(secs);
    }
    Ok(())
}
