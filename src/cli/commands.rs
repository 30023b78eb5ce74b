//! CLI command definitions.
//!
//! The top level takes either `list` or an environment name. Everything after
//! the environment name is parsed again as [`EnvCli`], and everything after a
//! service name as [`ServiceCli`].

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::parse_duration;

/// Fleetwork - generate, check, lock and push fleet units per environment.
#[derive(Parser, Debug)]
#[command(name = "fleetwork")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(subcommand_value_name = "ENV")]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, global = true, env = "FLEETWORK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Work tree root, overriding the configuration file.
    #[arg(long, global = true)]
    pub work_path: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Log format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub log_format: LogFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List environments and their services.
    List,

    /// Run a command against an environment: `fleetwork <ENV> <COMMAND>`.
    #[command(external_subcommand)]
    Env(Vec<String>),
}

/// Arguments following an environment name.
#[derive(Parser, Debug)]
#[command(no_binary_name = true)]
#[command(subcommand_value_name = "SERVICE")]
pub struct EnvCli {
    /// Environment subcommand.
    #[command(subcommand)]
    pub command: EnvCommands,
}

/// Environment commands.
#[derive(Subcommand, Debug)]
pub enum EnvCommands {
    /// Check every service for drift.
    Check,

    /// Show the units of the environment running on the cluster.
    Status,

    /// Run the control tool against the environment's cluster.
    Fleetctl {
        /// Arguments passed through to the control tool.
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Generate units for every service.
    Generate,

    /// Run a command against a service: `fleetwork <ENV> <SERVICE> <COMMAND>`.
    #[command(external_subcommand)]
    Service(Vec<String>),
}

/// Arguments following a service name.
#[derive(Parser, Debug)]
#[command(no_binary_name = true)]
pub struct ServiceCli {
    /// Service subcommand.
    #[command(subcommand)]
    pub command: ServiceCommands,
}

/// Service commands.
#[derive(Subcommand, Debug)]
pub enum ServiceCommands {
    /// Generate unit files, optionally from explicit container manifests.
    Generate {
        /// Container manifests overriding the service defaults.
        manifests: Vec<String>,
    },

    /// Check the service for drift.
    Check,

    /// Show the live state of the service's units.
    Status {
        /// Regenerate from these manifests before reporting.
        manifests: Vec<String>,
    },

    /// Take or renew the service lock.
    Lock {
        /// Reason shown to other operators.
        message: Vec<String>,

        /// How long the lock holds (e.g. `30m`, `1h30m`). Defaults to `lock.default_ttl`.
        #[arg(short = 't', long, value_parser = parse_lock_duration)]
        duration: Option<Duration>,
    },

    /// Release the service lock.
    Unlock,

    /// Show who holds the service lock.
    LockInfo,

    /// Push drifted units to the cluster.
    Update {
        /// Push every unit, not only the drifted ones.
        #[arg(short, long)]
        all: bool,

        /// Skip confirmation prompts.
        #[arg(short, long)]
        yes: bool,
    },
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

/// Log format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable log lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

fn parse_lock_duration(value: &str) -> Result<Duration, String> {
    parse_duration(value).map_err(|e| e.to_string())
}

impl Cli {
    /// Parses CLI arguments from the command line.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl ServiceCommands {
    /// Joins the words of a lock message.
    #[must_use]
    pub fn join_message(words: &[String]) -> String {
        words.join(" ")
    }
}
