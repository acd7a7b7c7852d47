//! CLI module for the studio lifecycle tool.
//!
//! This module provides the command-line interface for managing analytics
//! studios declared in a deployment file.

mod commands;
mod output;

pub use commands::{Cli, Commands, LogFormat, OutputFormat, StateCommands};
pub use output::OutputFormatter;
