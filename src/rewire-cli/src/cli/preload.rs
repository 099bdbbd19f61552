//! Preload command CLI definitions

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum PreloadAction {
    /// Show where the preload library is and how to use it
    Info,

    /// Run a command with the preload library applying a table
    Run {
        /// Table to apply (uses configured default if not provided)
        #[arg(short, long)]
        table: Option<PathBuf>,

        /// Log a summary line once the table is applied
        #[arg(long)]
        dev: bool,

        /// Log file for the preload library
        #[arg(short, long, default_value = "/tmp/rewire_preload.log")]
        log_file: PathBuf,

        /// The command to run
        #[arg(trailing_var_arg = true, required = true)]
        command: Vec<String>,
    },

    /// Watch the preload log file
    Watch {
        /// Path to log file
        #[arg(short, long, default_value = "/tmp/rewire_preload.log")]
        log_file: PathBuf,
    },
}
