//! Fleet unit types.
//!
//! This module defines the data exchanged with the cluster control interface:
//! unit descriptors listed by the control plane and raw command output.

use serde::{Deserialize, Serialize};

use crate::error::{ClusterError, Result};

/// Separator between the parts of a unit name (`<env>_<service>_<node>.service`).
pub const UNIT_NAME_SEPARATOR: char = '_';

/// Suffix of every generated unit.
pub const UNIT_SUFFIX: &str = ".service";

/// A unit as reported by the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitDescriptor {
    /// Full unit name.
    pub name: String,
    /// Load state (`loaded`, `not-found`, ...).
    pub load: String,
    /// Active state.
    pub active: UnitState,
    /// Sub state (`running`, `dead`, ...).
    pub sub: String,
    /// Machine id, when scheduled.
    pub machine_id: Option<String>,
    /// Machine public ip, when scheduled.
    pub machine_ip: Option<String>,
}

/// Active state of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UnitState {
    /// Unit is running.
    Active,
    /// Unit is starting or reloading.
    Activating,
    /// Unit is stopping.
    Deactivating,
    /// Unit is loaded but not running.
    Inactive,
    /// Unit failed.
    Failed,
    /// State could not be determined.
    #[default]
    Unknown,
}

/// Output of a control-tool invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Exit status, `None` when killed by a signal.
    pub status: Option<i32>,
}

impl UnitDescriptor {
    /// Parses one line of `list-units -no-legend -full -fields unit,load,active,sub,machine`.
    ///
    /// # Errors
    ///
    /// Returns an error if the line has fewer than five columns.
    pub fn parse_line(line: &str) -> Result<Self> {
        let columns: Vec<&str> = line.split_whitespace().collect();
        let [name, load, active, sub, machine, ..] = columns.as_slice() else {
            return Err(ClusterError::parse(format!("unexpected unit line: '{line}'")).into());
        };

        let (machine_id, machine_ip) = match *machine {
            "-" => (None, None),
            m => match m.split_once('/') {
                Some((id, ip)) => (Some(id.to_string()), Some(ip.to_string())),
                None => (Some(m.to_string()), None),
            },
        };

        Ok(Self {
            name: (*name).to_string(),
            load: (*load).to_string(),
            active: UnitState::parse(active),
            sub: (*sub).to_string(),
            machine_id,
            machine_ip,
        })
    }

    /// Parses the whole `list-units` output, skipping blank lines.
    ///
    /// # Errors
    ///
    /// Returns an error if any non-blank line is malformed.
    pub fn parse_listing(output: &str) -> Result<Vec<Self>> {
        output
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(Self::parse_line)
            .collect()
    }

    /// Returns true if the unit runs.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self.active, UnitState::Active)
    }

    /// Returns true if this unit belongs to the given environment.
    #[must_use]
    pub fn belongs_to_env(&self, env: &str) -> bool {
        self.name
            .strip_prefix(env)
            .is_some_and(|rest| rest.starts_with(UNIT_NAME_SEPARATOR))
    }

    /// Returns true if this unit belongs to the given service.
    #[must_use]
    pub fn belongs_to_service(&self, env: &str, service: &str) -> bool {
        self.name.starts_with(&service_unit_prefix(env, service))
    }

    /// Host placement for display (`ip` or machine id).
    #[must_use]
    pub fn host(&self) -> &str {
        self.machine_ip
            .as_deref()
            .or(self.machine_id.as_deref())
            .unwrap_or("-")
    }
}

impl UnitState {
    /// Parses a state as printed by the control tool.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "active" => Self::Active,
            "activating" | "reloading" => Self::Activating,
            "deactivating" => Self::Deactivating,
            "inactive" => Self::Inactive,
            "failed" => Self::Failed,
            _ => Self::Unknown,
        }
    }
}

impl CommandOutput {
    /// Returns true if the command exited with status 0.
    #[must_use]
    pub const fn success(&self) -> bool {
        matches!(self.status, Some(0))
    }

    /// Converts a non-zero exit into an error naming the command.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError::CommandFailed`] when the command did not succeed.
    pub fn into_result(self, args: &[String]) -> Result<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(ClusterError::CommandFailed {
                command: args.join(" "),
                status: self.status.unwrap_or(-1),
                stderr: self.stderr.trim().to_string(),
            }
            .into())
        }
    }
}

/// Builds the unit name for a node of a service.
#[must_use]
pub fn unit_name(env: &str, service: &str, node: &str) -> String {
    format!("{env}{UNIT_NAME_SEPARATOR}{service}{UNIT_NAME_SEPARATOR}{node}{UNIT_SUFFIX}")
}

/// Prefix shared by every unit of a service.
#[must_use]
pub fn service_unit_prefix(env: &str, service: &str) -> String {
    format!("{env}{UNIT_NAME_SEPARATOR}{service}{UNIT_NAME_SEPARATOR}")
}

impl std::fmt::Display for UnitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self {
            Self::Active => "active",
            Self::Activating => "activating",
            Self::Deactivating => "deactivating",
            Self::Inactive => "inactive",
            Self::Failed => "failed",
            Self::Unknown => "unknown",
        };
        write!(f, "{state}")
    }
}
