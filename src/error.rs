//! Error types for the fleetwork deployment system.
//!
//! This module provides the error hierarchy for every step of the
//! environment/service lifecycle: configuration, work tree discovery,
//! generation, drift checking, locking, cluster control and hooks.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for fleetwork.
#[derive(Debug, Error)]
pub enum FleetworkError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Work tree errors (missing environments or services).
    #[error(transparent)]
    Work(#[from] WorkError),

    /// Unit generation errors.
    #[error(transparent)]
    Generation(#[from] GenerationError),

    /// Local unit definitions diverge from the cluster.
    #[error(transparent)]
    Drift(#[from] DriftError),

    /// Lock contention and lock store errors.
    #[error(transparent)]
    Lock(#[from] LockError),

    /// Cluster control interface errors.
    #[error("Cluster error: {0}")]
    Cluster(#[from] ClusterError),

    /// Hook execution errors.
    #[error(transparent)]
    Hook(#[from] HookError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// A duration string could not be parsed.
    #[error("Invalid duration '{value}': {reason}")]
    InvalidDuration {
        /// The rejected input.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Work tree errors.
#[derive(Debug, Error)]
pub enum WorkError {
    /// An environment or service does not exist.
    #[error("{kind} not found: {name} ({path})")]
    NotFound {
        /// "environment" or "service".
        kind: &'static str,
        /// Requested name.
        name: String,
        /// Path that was probed.
        path: PathBuf,
    },

    /// A configured path cannot be read.
    #[error("Cannot read {path}: {source}")]
    Unreadable {
        /// Path that failed.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

/// Manifest resolution or compilation failure.
#[derive(Debug, Error)]
#[error("Failed to generate units for {env}/{service}: {message}")]
pub struct GenerationError {
    /// Environment name.
    pub env: String,
    /// Service name.
    pub service: String,
    /// Description of the failure.
    pub message: String,
}

/// Local definitions diverge from what the cluster runs.
#[derive(Debug, Error)]
#[error("Drift detected for {env}/{service}: {summary}")]
pub struct DriftError {
    /// Environment name.
    pub env: String,
    /// Service name.
    pub service: String,
    /// One line per drifted unit.
    pub summary: String,
}

/// Lock contention and lock store errors.
#[derive(Debug, Error)]
pub enum LockError {
    /// A non-expired lock owned by someone else exists.
    #[error("{key} is already locked by {owner} until {expires_at}: {message}")]
    AlreadyLocked {
        /// Lock key.
        key: String,
        /// Current owner.
        owner: String,
        /// Expiry of the current lock (RFC 3339).
        expires_at: String,
        /// Message left by the owner.
        message: String,
    },

    /// Unlock requested but no lock exists.
    #[error("{key} is not locked")]
    NotLocked {
        /// Lock key.
        key: String,
    },

    /// Unlock requested by someone who does not own the lock.
    #[error("{key} is locked by {owner}, not by {requester}")]
    NotOwner {
        /// Lock key.
        key: String,
        /// Current owner.
        owner: String,
        /// Operator that asked for the unlock.
        requester: String,
    },

    /// An update was blocked by a foreign lock.
    #[error("{key} is locked by {owner} until {expires_at}, refusing to update: {message}")]
    Locked {
        /// Lock key.
        key: String,
        /// Current owner.
        owner: String,
        /// Expiry of the current lock (RFC 3339).
        expires_at: String,
        /// Message left by the owner.
        message: String,
    },

    /// The lock store itself failed.
    #[error("Lock store error: {message}")]
    Backend {
        /// Description of the failure.
        message: String,
    },
}

/// Cluster control interface errors.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// The control tool could not be started.
    #[error("Failed to run {program}: {message}")]
    Spawn {
        /// Program name.
        program: String,
        /// Description of the failure.
        message: String,
    },

    /// The control tool exited unsuccessfully.
    #[error("`{command}` exited with status {status}: {stderr}")]
    CommandFailed {
        /// The command line that failed.
        command: String,
        /// Exit status, `-1` when killed by a signal.
        status: i32,
        /// Captured standard error.
        stderr: String,
    },

    /// The control tool output could not be understood.
    #[error("Unexpected output from control tool: {message}")]
    Parse {
        /// Description of the parse failure.
        message: String,
    },
}

/// Hook execution errors.
#[derive(Debug, Error)]
#[error("{stage} hook for {action} on {env} failed: {message}")]
pub struct HookError {
    /// Environment name.
    pub env: String,
    /// Guarded action identifier.
    pub action: String,
    /// "early" or "late".
    pub stage: &'static str,
    /// Description of the failure.
    pub message: String,
}

/// Result type alias for fleetwork operations.
pub type Result<T> = std::result::Result<T, FleetworkError>;

impl FleetworkError {
    /// Returns true for errors that abort a whole invocation rather than one service.
    #[must_use]
    pub const fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::Io(_) | Self::Work(WorkError::Unreadable { .. })
        )
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }
}

impl WorkError {
    /// Creates a missing environment error.
    #[must_use]
    pub fn env_not_found(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::NotFound {
            kind: "environment",
            name: name.into(),
            path: path.into(),
        }
    }

    /// Creates a missing service error.
    #[must_use]
    pub fn service_not_found(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::NotFound {
            kind: "service",
            name: name.into(),
            path: path.into(),
        }
    }

    /// Wraps an IO error on a configured path.
    #[must_use]
    pub fn unreadable(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Unreadable {
            path: path.into(),
            source,
        }
    }
}

impl LockError {
    /// Creates a lock store error.
    #[must_use]
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}

impl ClusterError {
    /// Creates a spawn error.
    #[must_use]
    pub fn spawn(program: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Spawn {
            program: program.into(),
            message: message.into(),
        }
    }

    /// Creates a parse error.
    #[must_use]
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infrastructure_classification() {
        let io = FleetworkError::Io(std::io::Error::other("boom"));
        assert!(io.is_infrastructure());

        let missing = FleetworkError::from(WorkError::env_not_found("prod", "/work/prod"));
        assert!(!missing.is_infrastructure());

        let unreadable = FleetworkError::from(WorkError::unreadable(
            "/work",
            std::io::Error::other("denied"),
        ));
        assert!(unreadable.is_infrastructure());
    }

    #[test]
    fn test_lock_error_messages_name_the_owner() {
        let err = LockError::NotOwner {
            key: String::from("staging/web"),
            owner: String::from("alice@ops1"),
            requester: String::from("bob@ops2"),
        };
        let text = err.to_string();
        assert!(text.contains("alice@ops1"));
        assert!(text.contains("bob@ops2"));
    }
}
