//! CLI module for fleetwork.
//!
//! Command definitions and output formatting for the `fleetwork` binary.

mod commands;
mod output;

pub use commands::{
    Cli, Commands, EnvCli, EnvCommands, LogFormat, OutputFormat, ServiceCli, ServiceCommands,
};
pub use output::{EnvSummary, OutputFormatter};
