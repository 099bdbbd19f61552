//! Table command CLI definitions

use clap::Subcommand;
use std::path::PathBuf;

use super::core::WidthArg;

#[derive(Subcommand)]
pub enum TableCommand {
    /// Parse a table and report its entries, groups and duplicate sources
    Check {
        /// Path to table (uses configured default if not provided)
        path: Option<PathBuf>,
    },

    /// Run a table against simulated code memory
    Simulate {
        /// Path to table (uses configured default if not provided)
        path: Option<PathBuf>,

        /// Symbol map: "Type::member" = address, or "pending" for code not compiled yet
        #[arg(short, long)]
        symbols: PathBuf,

        #[arg(short, long, value_enum, default_value_t = WidthArg::Host)]
        width: WidthArg,
    },
}
