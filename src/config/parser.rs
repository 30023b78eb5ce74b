//! Configuration parser for loading settings, environment and service files.
//!
//! This module handles loading YAML files and environment variables, with
//! proper precedence and error handling.

use crate::error::{ConfigError, FleetworkError, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use super::types::{EnvConfig, ServiceManifest, Settings};

/// Configuration parser for loading fleetwork configuration.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for resolving relative paths.
    base_path: Option<PathBuf>,
}

impl ConfigParser {
    /// Creates a new configuration parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for resolving relative paths.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads settings from a YAML file, then applies environment overrides.
    ///
    /// A relative `work_path` is resolved against the directory holding the file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_settings(&self, path: impl AsRef<Path>) -> Result<Settings> {
        let path = path.as_ref();
        info!("Loading settings from: {}", path.display());

        let mut settings: Settings = read_yaml(path)?;
        Self::apply_env_overrides(&mut settings);

        let base = path
            .parent()
            .map(Path::to_path_buf)
            .or_else(|| self.base_path.clone())
            .unwrap_or_else(|| PathBuf::from("."));
        if settings.work_path.is_relative() {
            settings.work_path = base.join(&settings.work_path);
        }
        if let Some(lock_path) = settings.lock.path.as_mut()
            && lock_path.is_relative()
        {
            *lock_path = base.join(&*lock_path);
        }

        debug!("Work path: {}", settings.work_path.display());
        Ok(settings)
    }

    /// Parses settings from a YAML string without touching the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_settings(&self, content: &str) -> Result<Settings> {
        parse_yaml(content, None)
    }

    /// Default settings with environment overrides applied, for running
    /// without a configuration file.
    #[must_use]
    pub fn default_settings(&self) -> Settings {
        let mut settings = Settings::default();
        Self::apply_env_overrides(&mut settings);
        if let Some(base) = &self.base_path
            && settings.work_path.is_relative()
        {
            settings.work_path = base.join(&settings.work_path);
        }
        settings
    }

    /// Loads an environment's `env.yaml`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_env_config(&self, path: impl AsRef<Path>) -> Result<EnvConfig> {
        read_yaml(path.as_ref())
    }

    /// Loads a service's `service.yaml`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_service_manifest(&self, path: impl AsRef<Path>) -> Result<ServiceManifest> {
        read_yaml(path.as_ref())
    }

    /// Applies environment variable overrides to the settings.
    fn apply_env_overrides(settings: &mut Settings) {
        if let Ok(path) = std::env::var("FLEETWORK_WORK_PATH") {
            debug!("Overriding work_path from environment");
            settings.work_path = PathBuf::from(path);
        }

        if let Ok(operator) = std::env::var("FLEETWORK_OPERATOR") {
            debug!("Overriding operator from environment");
            settings.operator = Some(operator);
        }

        if let Ok(endpoint) = std::env::var("FLEETWORK_LOCK_ENDPOINT") {
            debug!("Overriding lock.endpoint from environment");
            settings.lock.endpoint = Some(endpoint);
        }
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                FleetworkError::Config(ConfigError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(env_path.display().to_string()),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }
}

/// Reads and deserializes a YAML file.
fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Err(FleetworkError::Config(ConfigError::FileNotFound {
            path: path.to_path_buf(),
        }));
    }

    let content = std::fs::read_to_string(path).map_err(|e| {
        FleetworkError::Config(ConfigError::ParseError {
            message: format!("Failed to read file: {e}"),
            location: Some(path.display().to_string()),
        })
    })?;

    parse_yaml(&content, Some(path))
}

fn parse_yaml<T: DeserializeOwned>(content: &str, source: Option<&Path>) -> Result<T> {
    // An empty file is a valid, all-defaults document.
    let content = if content.trim().is_empty() { "{}" } else { content };

    serde_yaml::from_str(content).map_err(|e| {
        FleetworkError::Config(ConfigError::ParseError {
            message: format!("YAML parse error: {e}"),
            location: source.map(|p| p.display().to_string()),
        })
    })
}

/// Default configuration file names to search for.
pub const DEFAULT_CONFIG_FILES: &[&str] = &["fleetwork.yaml", "fleetwork.yml"];

/// Finds the configuration file in the given directory or its parents, falling
/// back to the user configuration directory.
///
/// # Errors
///
/// Returns an error if no configuration file is found.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        for filename in DEFAULT_CONFIG_FILES {
            let config_path = current.join(filename);
            if config_path.exists() {
                info!("Found configuration file: {}", config_path.display());
                return Ok(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    if let Some(user_config) = dirs::config_dir().map(|d| d.join("fleetwork").join("config.yaml"))
        && user_config.exists()
    {
        info!("Using user configuration: {}", user_config.display());
        return Ok(user_config);
    }

    Err(FleetworkError::Config(ConfigError::FileNotFound {
        path: start.join(DEFAULT_CONFIG_FILES[0]),
    }))
}

/// Parses a duration such as `90s`, `15m` or `1h30m`.
///
/// Supported units are `ms`, `s`, `m`, `h` and `d`. A bare number is seconds.
///
/// # Errors
///
/// Returns an error on empty input, unknown units or overflow.
pub fn parse_duration(value: &str) -> std::result::Result<Duration, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidDuration {
        value: value.to_string(),
        reason: reason.to_string(),
    };

    let s = value.trim();
    if s.is_empty() {
        return Err(invalid("empty duration"));
    }
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        if digits == 0 {
            return Err(invalid("expected a number"));
        }
        let amount: u64 = rest[..digits].parse().map_err(|_| invalid("number too large"))?;
        rest = &rest[digits..];

        let unit_len = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
        let millis_per_unit: u64 = match &rest[..unit_len] {
            "ms" => 1,
            "s" => 1_000,
            "m" => 60_000,
            "h" => 3_600_000,
            "d" => 86_400_000,
            "" => return Err(invalid("missing unit")),
            _ => return Err(invalid("unknown unit, expected ms, s, m, h or d")),
        };
        rest = &rest[unit_len..];

        let millis = amount
            .checked_mul(millis_per_unit)
            .ok_or_else(|| invalid("duration too large"))?;
        total = total
            .checked_add(Duration::from_millis(millis))
            .ok_or_else(|| invalid("duration too large"))?;
    }

    Ok(total)
}

/// Formats a duration in the same notation [`parse_duration`] accepts.
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let mut millis = duration.as_millis();
    if millis == 0 {
        return String::from("0s");
    }

    let mut out = String::new();
    for (unit, size) in [("d", 86_400_000_u128), ("h", 3_600_000), ("m", 60_000), ("s", 1_000), ("ms", 1)] {
        let amount = millis / size;
        if amount > 0 {
            out.push_str(&format!("{amount}{unit}"));
            millis %= size;
        }
    }
    out
}
