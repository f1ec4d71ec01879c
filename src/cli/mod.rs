//! Command-line interface definitions and helpers.
//!
//! This module contains the CLI argument parsing and subcommand handlers.

mod args;
mod commands;

pub use args::{Args, Command};
pub use commands::{check_engine, handle_config_action, record, CliError};
