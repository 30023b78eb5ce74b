//! Fleetwork CLI entrypoint.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{CommandFactory, FromArgMatches};
use fleetwork::cli::{
    Cli, Commands, EnvCli, EnvCommands, EnvSummary, LogFormat, OutputFormatter, ServiceCli,
    ServiceCommands,
};
use fleetwork::config::{find_config_file, ConfigParser, ConfigValidator, Settings};
use fleetwork::error::Result;
use fleetwork::work::{Collaborators, Env, WorkRegistry};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse_args();

    init_logging(cli.verbose, cli.log_format);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system. `RUST_LOG` wins over `--verbose`.
fn init_logging(verbose: bool, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<ExitCode> {
    let formatter = OutputFormatter::new(cli.output);
    let settings = load_settings(cli.config.as_deref(), cli.work_path.as_deref())?;
    let collaborators = Collaborators::from_settings(&settings)?;
    let registry = WorkRegistry::new(settings, collaborators);
    debug!(operator = %registry.operator(), "Work root: {}", registry.settings().work_path.display());

    match cli.command {
        Commands::List => cmd_list(&registry, &formatter).await,
        Commands::Env(args) => {
            let Some((env_name, rest)) = args.split_first() else {
                return Ok(ExitCode::FAILURE);
            };
            let command: EnvCli = parse_nested(format!("fleetwork {env_name}"), rest);
            let env = registry.load_env(env_name).await?;
            let default_ttl = registry.settings().lock.default_ttl;
            cmd_env(&env, command.command, default_ttl, &formatter).await
        }
    }
}

/// Parses the arguments following an environment or service name, exiting
/// with clap's usage message on error.
fn parse_nested<T: CommandFactory + FromArgMatches>(bin_name: String, args: &[String]) -> T {
    let matches = T::command().bin_name(bin_name).get_matches_from(args);
    T::from_arg_matches(&matches).unwrap_or_else(|e| e.exit())
}

/// Loads settings from `--config`, a discovered file, or defaults.
fn load_settings(config_path: Option<&Path>, work_path: Option<&Path>) -> Result<Settings> {
    let config_file = match config_path {
        Some(path) => Some(path.to_path_buf()),
        None => find_config_file(".")
            .inspect_err(|e| debug!("{e}, using default settings"))
            .ok(),
    };

    let mut settings = match config_file {
        Some(file) => {
            let base = file.parent().map_or_else(|| PathBuf::from("."), Path::to_path_buf);
            let parser = ConfigParser::new().with_base_path(base);
            parser.load_dotenv()?;
            parser.load_settings(&file)?
        }
        None => {
            let parser = ConfigParser::new();
            parser.load_dotenv()?;
            parser.default_settings()
        }
    };

    if let Some(path) = work_path {
        settings.work_path = path.to_path_buf();
    }

    let result = ConfigValidator::new().validate_settings(&settings)?;
    for warning in &result.warnings {
        warn!("{warning}");
    }
    Ok(settings)
}

/// List environments and their services.
async fn cmd_list(registry: &WorkRegistry, formatter: &OutputFormatter) -> Result<ExitCode> {
    let mut envs = Vec::new();
    for name in registry.list_envs().await? {
        let env = registry.load_env(&name).await?;
        envs.push(EnvSummary {
            services: env.list_services().await?,
            name,
        });
    }
    print!("{}", formatter.format_envs(&envs));
    Ok(ExitCode::SUCCESS)
}

/// Run an environment command.
async fn cmd_env(
    env: &Env,
    command: EnvCommands,
    default_ttl: Duration,
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    match command {
        EnvCommands::Check => {
            let report = env.check().await?;
            print!("{}", formatter.format_check(&report));
            Ok(exit_code(report.is_clean()))
        }
        EnvCommands::Status => {
            let units = env.status().await?;
            print!("{}", formatter.format_env_status(env.name(), &units));
            Ok(ExitCode::SUCCESS)
        }
        EnvCommands::Fleetctl { args } => {
            let output = env.control(&args).await?;
            print!("{}", output.stdout);
            eprint!("{}", output.stderr);
            Ok(output
                .status
                .and_then(|code| u8::try_from(code).ok())
                .map_or(ExitCode::FAILURE, ExitCode::from))
        }
        EnvCommands::Generate => {
            let report = env.generate().await?;
            print!("{}", formatter.format_generate(&report));
            Ok(exit_code(report.is_success()))
        }
        EnvCommands::Service(args) => {
            let Some((service_name, rest)) = args.split_first() else {
                return Ok(ExitCode::FAILURE);
            };
            let command: ServiceCli =
                parse_nested(format!("fleetwork {} {service_name}", env.name()), rest);
            cmd_service(env, service_name, command.command, default_ttl, formatter).await
        }
    }
}

/// Run a service command.
async fn cmd_service(
    env: &Env,
    name: &str,
    command: ServiceCommands,
    default_ttl: Duration,
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    let mut service = env.load_service(name).await?;

    match command {
        ServiceCommands::Generate { manifests } => {
            let count = service.generate(&manifests).await?;
            print!("{}", formatter.format_generated(service.name(), count));
            Ok(ExitCode::SUCCESS)
        }
        ServiceCommands::Check => {
            let report = service.check().await?;
            print!("{}", formatter.format_drift(&report));
            Ok(ExitCode::SUCCESS)
        }
        ServiceCommands::Status { manifests } => {
            if !manifests.is_empty() {
                service.generate(&manifests).await?;
            }
            let units = service.status().await?;
            print!("{}", formatter.format_service_status(service.name(), &units));
            Ok(ExitCode::SUCCESS)
        }
        ServiceCommands::Lock { message, duration } => {
            let record = service
                .lock(duration.unwrap_or(default_ttl), &ServiceCommands::join_message(&message))
                .await?;
            info!(env = %env.name(), service = %name, "Locked until {}", record.expires_at());
            print!("{}", formatter.format_lock_change(&record, true));
            Ok(ExitCode::SUCCESS)
        }
        ServiceCommands::Unlock => {
            let record = service.unlock().await?;
            print!("{}", formatter.format_lock_change(&record, false));
            Ok(ExitCode::SUCCESS)
        }
        ServiceCommands::LockInfo => {
            let lock = service.lock_info().await?;
            print!("{}", formatter.format_lock(&service.lock_key(), lock.as_ref()));
            Ok(ExitCode::SUCCESS)
        }
        ServiceCommands::Update { all, yes } => {
            let report = service.update(all, yes).await?;
            print!("{}", formatter.format_update(&report));
            Ok(exit_code(report.all_successful()))
        }
    }
}

const fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
