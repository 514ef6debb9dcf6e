//! Config command handlers

use anyhow::{Context, Result};

use folio_core::Config;

use crate::output::{Output, OutputFormat};

/// Show the effective configuration
pub fn show(output: &Output) -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;

    match output.format {
        OutputFormat::Json => output.json(&config),
        OutputFormat::Quiet => println!("{}", config.data_dir.display()),
        OutputFormat::Human => {
            println!("Configuration:");
            println!("  data_dir:            {}", config.data_dir.display());
            println!(
                "  storage_dir:         {}",
                config
                    .storage_dir
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| format!("(default: {})", config.storage_root().display()))
            );
            println!("  busy_timeout_ms:     {}", config.busy_timeout_ms);
            println!("  version_retry_limit: {}", config.version_retry_limit);
            println!("  log_level:           {}", config.log_level);
            println!();
            println!("Config file: {}", Config::config_file_path().display());
        }
    }

    Ok(())
}

/// Print where the config file is read from
pub fn path(output: &Output) -> Result<()> {
    let path = Config::config_file_path();
    match output.format {
        OutputFormat::Json => output.json(&serde_json::json!({
            "config_file": path,
            "exists": path.exists(),
        })),
        _ => println!("{}", path.display()),
    }
    Ok(())
}
