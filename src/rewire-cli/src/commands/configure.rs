//! Configuration command handlers
//!
//! Handles the `configure` subcommand for setting up rewire CLI defaults.

use crate::config::Config;
use anyhow::Result;
use std::path::PathBuf;

/// Handle the configure command
pub fn handle(
    dev_mode: Option<bool>,
    table: Option<PathBuf>,
    log_filter: Option<String>,
    show: bool,
) -> Result<()> {
    let mut config = Config::load()?;

    if show {
        show_config(&config);
        return Ok(());
    }

    if apply(&mut config, dev_mode, table, log_filter) {
        config.save()?;
        println!("Configuration updated");
        if let Ok(path) = Config::config_path() {
            println!("Config saved to: {}", path.display());
        }
    } else {
        show_usage();
    }

    Ok(())
}

/// Apply the given settings; returns whether anything changed
fn apply(
    config: &mut Config,
    dev_mode: Option<bool>,
    table: Option<PathBuf>,
    log_filter: Option<String>,
) -> bool {
    let mut changed = false;

    if let Some(dev) = dev_mode {
        config.dev_mode = dev;
        changed = true;
    }
    if let Some(path) = table {
        config.default_table = Some(path);
        changed = true;
    }
    if let Some(filter) = log_filter {
        config.log_filter = Some(filter);
        changed = true;
    }

    changed
}

/// Display current configuration
fn show_config(config: &Config) {
    println!("Dev mode: {}", config.dev_mode);
    match &config.default_table {
        Some(path) => println!("Default table: {}", path.display()),
        None => println!("No default table configured"),
    }
    println!("Log filter: {}", config.log_filter());

    if let Ok(path) = Config::config_path() {
        println!("Config file: {}", path.display());
    }
}

/// Show usage help for the configure command
fn show_usage() {
    println!("Usage: rewire configure --table PATH");
    println!("   or: rewire configure --dev-mode true");
    println!("   or: rewire configure --log-filter rewire=debug");
    println!("   or: rewire configure --show");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_nothing_is_unchanged() {
        let mut config = Config::default();
        assert!(!apply(&mut config, None, None, None));
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_apply_settings() {
        let mut config = Config::default();
        assert!(apply(
            &mut config,
            Some(true),
            Some(PathBuf::from("game.toml")),
            Some("rewire=trace".into())
        ));
        assert!(config.dev_mode);
        assert_eq!(config.default_table, Some(PathBuf::from("game.toml")));
        assert_eq!(config.log_filter(), "rewire=trace");
    }

    #[test]
    fn test_show_usage_does_not_panic() {
        show_usage();
        show_config(&Config::default());
    }
}
