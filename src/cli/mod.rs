//! Command-line interface definitions and helpers.
//!
//! This module contains CLI argument parsing and subcommand handlers.

mod args;
mod commands;

pub use args::{parse_framerate, parse_resolution, Args, Command, ConfigAction};
pub use commands::handle_config_action;
