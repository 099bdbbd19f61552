//! Command dispatch functions
//!
//! Subcommand groups that need the loaded configuration.

use anyhow::Result;

use crate::cli::*;
use crate::commands;
use crate::config::Config;

/// Dispatch table subcommands
pub fn dispatch_table(command: TableCommand, config: &Config) -> Result<()> {
    match command {
        TableCommand::Check { path } => {
            let path = config.table_or_default(path)?;
            commands::table::check(&path)
        }

        TableCommand::Simulate {
            path,
            symbols,
            width,
        } => {
            let path = config.table_or_default(path)?;
            commands::table::simulate(&path, &symbols, width, config.dev_mode)
        }
    }
}

/// Dispatch preload subcommands
pub fn dispatch_preload(action: PreloadAction, config: &Config) -> Result<()> {
    match action {
        PreloadAction::Info => commands::preload::handle_preload_info(),

        PreloadAction::Run {
            table,
            dev,
            log_file,
            command,
        } => {
            let table = config.table_or_default(table)?;
            commands::preload::handle_preload_run(
                &table,
                dev || config.dev_mode,
                &log_file,
                &command,
            )
        }

        PreloadAction::Watch { log_file } => commands::preload::handle_preload_watch(&log_file),
    }
}
