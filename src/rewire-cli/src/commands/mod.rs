//! Command handlers for rewire CLI
//!
//! Each subcommand has its own module with handler functions.

pub mod configure;
pub mod demo;
pub mod jump;
pub mod preload;
pub mod table;
