//! Tooling
//!
//! Command-line entry points over the mirror.

pub mod cli;

pub use cli::{Cli, CliContext, Commands, ConfigCommands};
