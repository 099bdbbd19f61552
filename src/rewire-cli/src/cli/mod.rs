//! CLI argument definitions for rewire
//!
//! This module contains all clap-derived structs and enums for CLI parsing.

mod core;
mod preload;
mod table;

pub use core::{Cli, Commands, WidthArg};
pub use preload::PreloadAction;
pub use table::TableCommand;
