//! Core CLI definitions

use clap::{Parser, Subcommand, ValueEnum};
use rewire::PointerWidth;
use std::path::PathBuf;

use super::preload::PreloadAction;
use super::table::TableCommand;

#[derive(Parser)]
#[command(name = "rewire")]
#[command(about = "Load-time function redirection toolkit", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Jump form to encode
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum WidthArg {
    /// Whatever this process uses
    Host,
    /// 32-bit relative jump
    Narrow,
    /// 64-bit absolute jump
    Wide,
}

impl WidthArg {
    pub fn resolve(self) -> Result<PointerWidth, rewire::RedirectError> {
        match self {
            WidthArg::Host => PointerWidth::host(),
            WidthArg::Narrow => Ok(PointerWidth::Narrow),
            WidthArg::Wide => Ok(PointerWidth::Wide),
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the jump bytes that would redirect one address to another
    #[command(visible_alias = "e")]
    Encode {
        /// Patch site address (hex with 0x prefix, or decimal)
        #[arg(short, long)]
        source: String,

        /// Jump target address
        #[arg(short, long)]
        destination: String,

        #[arg(short, long, value_enum, default_value_t = WidthArg::Host)]
        width: WidthArg,
    },

    /// Recognise jump bytes read from a patch site
    #[command(visible_alias = "d")]
    Decode {
        /// Hex bytes, e.g. "48 B8 00 10 00 00 00 00 00 00 FF E0"
        bytes: String,

        /// Address the bytes were read from (needed to resolve relative jumps)
        #[arg(long, default_value = "0")]
        at: String,
    },

    /// Redirection table operations (check, simulate)
    #[command(visible_alias = "t")]
    Table {
        #[command(subcommand)]
        command: TableCommand,
    },

    /// Redirect a function inside this process and show the effect
    Demo,

    /// Configure default settings
    #[command(visible_alias = "c")]
    Configure {
        /// Log a summary line after every batch
        #[arg(long)]
        dev_mode: Option<bool>,

        /// Table used when none is given on the command line
        #[arg(long)]
        table: Option<PathBuf>,

        /// Default tracing filter (overridden by RUST_LOG)
        #[arg(long)]
        log_filter: Option<String>,

        /// Show current configuration
        #[arg(long)]
        show: bool,
    },

    /// Apply a table to another program at load time
    #[command(visible_alias = "p")]
    Preload {
        #[command(subcommand)]
        action: PreloadAction,
    },
}
