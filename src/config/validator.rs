//! Configuration validation.
//!
//! Names end up inside fleet unit names (`<env>_<service>_<node>.service`),
//! so they are restricted to lowercase alphanumerics and hyphens.

use crate::error::{ConfigError, FleetworkError, Result};
use std::collections::HashSet;
use tracing::debug;

use super::types::{EnvConfig, LockBackend, ServiceManifest, Settings};

/// Validator for fleetwork configuration files.
#[derive(Debug, Default)]
pub struct ConfigValidator;

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates process-wide settings.
    ///
    /// # Errors
    ///
    /// Returns the first validation error found.
    pub fn validate_settings(&self, settings: &Settings) -> Result<ValidationResult> {
        let mut result = ValidationResult::default();

        if settings.check_concurrency == 0 {
            result.push_error("check_concurrency", "Check concurrency must be at least 1");
        }

        if settings.fleetctl.binary.trim().is_empty() {
            result.push_error("fleetctl.binary", "Control tool binary cannot be empty");
        }

        if settings.operator.as_deref().is_some_and(|o| o.trim().is_empty()) {
            result.push_error("operator", "Operator cannot be empty when set");
        }

        match settings.lock.backend {
            LockBackend::Etcd => {
                if settings.lock.endpoint.as_deref().is_none_or(str::is_empty) {
                    result.push_error(
                        "lock.endpoint",
                        "An endpoint is required when using the etcd lock backend",
                    );
                }
            }
            LockBackend::Memory => {
                result
                    .warnings
                    .push(String::from("Memory lock backend does not outlive the process"));
            }
            LockBackend::Local => {}
        }

        if settings.lock.default_ttl.is_zero() {
            result.push_error("lock.default_ttl", "Default lock TTL must be positive");
        }

        result.into_result()
    }

    /// Validates an environment configuration.
    ///
    /// # Errors
    ///
    /// Returns the first validation error found.
    pub fn validate_env(&self, name: &str, config: &EnvConfig) -> Result<ValidationResult> {
        let mut result = ValidationResult::default();

        if !is_valid_name(name) {
            result.push_error(
                "name",
                format!(
                    "Environment name '{name}' is invalid. Must be lowercase alphanumeric with hyphens."
                ),
            );
        }

        for (stage, hooks) in [("hooks.early", &config.hooks.early), ("hooks.late", &config.hooks.late)] {
            for (action, command) in hooks {
                if command.trim().is_empty() {
                    result.push_error(
                        format!("{stage}.{action}"),
                        "Hook command cannot be empty",
                    );
                }
            }
        }

        result.into_result()
    }

    /// Validates a service manifest.
    ///
    /// # Errors
    ///
    /// Returns the first validation error found.
    pub fn validate_service(&self, name: &str, manifest: &ServiceManifest) -> Result<ValidationResult> {
        let mut result = ValidationResult::default();

        if !is_valid_name(name) {
            result.push_error(
                "name",
                format!(
                    "Service name '{name}' is invalid. Must be lowercase alphanumeric with hyphens."
                ),
            );
        }

        if manifest.nodes.is_empty() {
            result.push_error("nodes", "At least one node must be defined");
        }

        let mut seen = HashSet::new();
        for (i, node) in manifest.nodes.iter().enumerate() {
            if !seen.insert(node.name.as_str()) {
                result.push_error(
                    format!("nodes[{i}].name"),
                    format!("Duplicate node name '{}'", node.name),
                );
            }
            if !is_valid_node_name(&node.name) {
                result.push_error(
                    format!("nodes[{i}].name"),
                    format!("Node name '{}' is invalid", node.name),
                );
            }
            for constraint in &node.machine_metadata {
                if !constraint.contains('=') {
                    result.push_error(
                        format!("nodes[{i}].machine_metadata"),
                        format!("Machine metadata '{constraint}' must be key=value"),
                    );
                }
            }
        }

        if manifest.containers.is_empty() {
            result
                .warnings
                .push(format!("Service '{name}' has no default containers"));
        }

        result.into_result()
    }
}

impl ValidationResult {
    fn push_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    fn into_result(self) -> Result<Self> {
        if self.errors.is_empty() {
            debug!("Configuration validation passed");
            Ok(self)
        } else {
            let first_error = &self.errors[0];
            Err(FleetworkError::Config(ConfigError::ValidationError {
                message: first_error.message.clone(),
                field: Some(first_error.field.clone()),
            }))
        }
    }

    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validates that a name follows the naming convention.
/// Names must be lowercase alphanumeric with hyphens, starting with a letter.
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();

    // First character must be a letter
    match chars.next() {
        Some(first) if first.is_ascii_lowercase() => {}
        _ => return false,
    }

    // Rest must be lowercase alphanumeric or hyphen
    if !chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
        return false;
    }

    !name.ends_with('-') && !name.contains("--")
}

/// Node names may also start with a digit (`web-1`, `1`).
fn is_valid_node_name(name: &str) -> bool {
    !name.is_empty()
        && !name.ends_with('-')
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}
