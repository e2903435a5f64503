//! Config command handlers

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use justshop_core::{Config, ConflictPolicy};

use crate::output::{Output, OutputFormat};

/// Keys accepted by `config set`
const KEYS: &[&str] = &[
    "data_dir",
    "server_url",
    "username",
    "password",
    "sync_interval_secs",
    "reconnect_delay_secs",
    "max_reconnect_delay_secs",
    "delete_all_endpoint",
    "conflict_policy",
    "log_file",
];

/// Show current configuration
pub fn show(config_path: Option<&PathBuf>, output: &Output) -> Result<()> {
    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "data_dir": config.data_dir,
                    "server_url": config.server_url,
                    "username": config.username,
                    "password_set": !config.password.is_empty(),
                    "sync_interval_secs": config.sync_interval_secs,
                    "reconnect_delay_secs": config.reconnect_delay_secs,
                    "max_reconnect_delay_secs": config.max_reconnect_delay_secs,
                    "delete_all_endpoint": config.delete_all_endpoint,
                    "conflict_policy": config.conflict_policy,
                    "log_file": config.log_file
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", config.server_url);
        }
        OutputFormat::Human => {
            let effective_path = config_path
                .cloned()
                .unwrap_or_else(Config::config_file_path);
            println!("Configuration:");
            println!("  data_dir:                 {}", config.data_dir.display());
            println!("  server_url:               {}", config.server_url);
            println!("  username:                 {}", or_not_set(&config.username));
            println!(
                "  password:                 {}",
                if config.password.is_empty() {
                    "(not set)"
                } else {
                    "********"
                }
            );
            println!("  sync_interval_secs:       {}", config.sync_interval_secs);
            println!("  reconnect_delay_secs:     {}", config.reconnect_delay_secs);
            println!("  max_reconnect_delay_secs: {}", config.max_reconnect_delay_secs);
            println!("  delete_all_endpoint:      {}", config.delete_all_endpoint);
            println!(
                "  conflict_policy:          {}",
                policy_name(config.conflict_policy)
            );
            println!(
                "  log_file:                 {}",
                config
                    .log_file
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(not set)".to_string())
            );
            println!();
            println!("Config file: {}", effective_path.display());
        }
    }

    Ok(())
}

/// Set a configuration value
pub fn set(
    key: String,
    value: String,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    let mut config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    apply(&mut config, &key, &value)?;

    // Save to the CLI-specified path or default
    let save_path = config_path
        .cloned()
        .unwrap_or_else(Config::config_file_path);
    config
        .save_to_path(&save_path)
        .context("Failed to save configuration")?;

    let shown = if key == "password" { "********" } else { &value };
    output.success(&format!("Set {} = {}", key, shown));

    Ok(())
}

/// Apply one `key = value` edit
fn apply(config: &mut Config, key: &str, value: &str) -> Result<()> {
    match key {
        "data_dir" => config.data_dir = value.into(),
        "server_url" => {
            if !(value.starts_with("http://") || value.starts_with("https://")) {
                bail!("server_url must start with http:// or https://");
            }
            config.server_url = value.trim_end_matches('/').to_string();
        }
        "username" => config.username = value.to_string(),
        "password" => config.password = value.to_string(),
        "sync_interval_secs" => config.sync_interval_secs = parse_secs(key, value)?,
        "reconnect_delay_secs" => config.reconnect_delay_secs = parse_secs(key, value)?,
        "max_reconnect_delay_secs" => config.max_reconnect_delay_secs = parse_secs(key, value)?,
        "delete_all_endpoint" => {
            config.delete_all_endpoint = value.trim_matches('/').to_string();
        }
        "conflict_policy" => {
            config.conflict_policy = match value {
                "server-wins" => ConflictPolicy::ServerWins,
                "newest-timestamp" => ConflictPolicy::NewestTimestamp,
                _ => bail!(
                    "Invalid value for conflict_policy. Use 'server-wins' or 'newest-timestamp'."
                ),
            };
        }
        "log_file" => {
            config.log_file = if value.is_empty() || value == "none" {
                None
            } else {
                Some(value.into())
            };
        }
        _ => {
            bail!(
                "Unknown configuration key: '{}'\nValid keys: {}",
                key,
                KEYS.join(", ")
            );
        }
    }
    Ok(())
}

fn parse_secs(key: &str, value: &str) -> Result<u64> {
    value
        .parse()
        .with_context(|| format!("Invalid value for {}. Use a whole number of seconds.", key))
}

fn or_not_set(value: &str) -> &str {
    if value.is_empty() {
        "(not set)"
    } else {
        value
    }
}

fn policy_name(policy: ConflictPolicy) -> &'static str {
    match policy {
        ConflictPolicy::ServerWins => "server-wins",
        ConflictPolicy::NewestTimestamp => "newest-timestamp",
    }
}
