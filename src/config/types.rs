//! Configuration types.
//!
//! Three files drive fleetwork:
//! - `fleetwork.yaml`: process-wide [`Settings`] (work tree root, lock store, pool width)
//! - `<env>/env.yaml`: per-environment [`EnvConfig`] (fleet endpoint, hooks)
//! - `<env>/services/<service>/service.yaml`: per-service [`ServiceManifest`]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use super::parser::{format_duration, parse_duration};

/// Default number of concurrent service checks.
pub const DEFAULT_CHECK_CONCURRENCY: usize = 3;

/// Default lock duration.
pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(3600);

/// Process-wide settings, threaded explicitly into the work registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Settings {
    /// Root directory holding one sub-directory per environment.
    #[serde(default = "default_work_path")]
    pub work_path: PathBuf,
    /// Operator identity override (defaults to `user@hostname`).
    #[serde(default)]
    pub operator: Option<String>,
    /// Width of the concurrent check pool.
    #[serde(default = "default_check_concurrency")]
    pub check_concurrency: usize,
    /// Control tool settings.
    #[serde(default)]
    pub fleetctl: FleetctlConfig,
    /// Lock store settings.
    #[serde(default)]
    pub lock: LockConfig,
}

/// Control tool settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FleetctlConfig {
    /// Program to execute.
    #[serde(default = "default_fleetctl_binary")]
    pub binary: String,
}

/// Lock store settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockConfig {
    /// Backend type.
    #[serde(default)]
    pub backend: LockBackend,
    /// Directory for the local backend.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// etcd endpoint for the etcd backend.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Key prefix for the etcd backend.
    #[serde(default = "default_lock_prefix")]
    pub prefix: String,
    /// TTL used when none is given explicitly.
    #[serde(default = "default_lock_ttl", with = "duration_string")]
    pub default_ttl: Duration,
}

/// Lock store backends.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LockBackend {
    /// JSON files on the local filesystem.
    #[default]
    Local,
    /// etcd v2 keys API.
    Etcd,
    /// In-process only, lost at exit.
    Memory,
}

/// Per-environment configuration (`env.yaml`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct EnvConfig {
    /// How to reach the fleet cluster of this environment.
    #[serde(default)]
    pub fleet: FleetConfig,
    /// Hook commands around guarded actions.
    #[serde(default)]
    pub hooks: HooksConfig,
}

/// Fleet connection settings for one environment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct FleetConfig {
    /// Fleet/etcd endpoint.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// SSH tunnel host.
    #[serde(default)]
    pub tunnel: Option<String>,
    /// Whether to verify SSH host keys.
    #[serde(default)]
    pub strict_host_key_checking: bool,
}

/// Hook commands keyed by action identifier (e.g. `env/check`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct HooksConfig {
    /// Abort the guarded action when its early hook fails.
    #[serde(default)]
    pub strict: bool,
    /// Commands run before an action.
    #[serde(default)]
    pub early: BTreeMap<String, String>,
    /// Commands run after an action, whatever its outcome.
    #[serde(default)]
    pub late: BTreeMap<String, String>,
}

/// Per-service manifest (`service.yaml`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ServiceManifest {
    /// Default container manifests run by every unit.
    #[serde(default)]
    pub containers: Vec<String>,
    /// One unit is generated per node.
    #[serde(default)]
    pub nodes: Vec<NodeConfig>,
    /// Human description used in the unit file.
    #[serde(default)]
    pub description: Option<String>,
    /// Extra `After=` dependencies.
    #[serde(default)]
    pub after: Vec<String>,
}

/// A node of a service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeConfig {
    /// Node name, last part of the unit name.
    pub name: String,
    /// Fleet machine metadata constraints (`key=value`).
    #[serde(default)]
    pub machine_metadata: Vec<String>,
    /// Environment variables exported to the unit.
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            work_path: default_work_path(),
            operator: None,
            check_concurrency: DEFAULT_CHECK_CONCURRENCY,
            fleetctl: FleetctlConfig::default(),
            lock: LockConfig::default(),
        }
    }
}

impl Default for FleetctlConfig {
    fn default() -> Self {
        Self {
            binary: default_fleetctl_binary(),
        }
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            backend: LockBackend::default(),
            path: None,
            endpoint: None,
            prefix: default_lock_prefix(),
            default_ttl: DEFAULT_LOCK_TTL,
        }
    }
}

impl Settings {
    /// Creates settings rooted at the given work path.
    #[must_use]
    pub fn with_work_path(work_path: impl Into<PathBuf>) -> Self {
        Self {
            work_path: work_path.into(),
            ..Self::default()
        }
    }

    /// Directory used by the local lock backend.
    #[must_use]
    pub fn lock_dir(&self) -> PathBuf {
        self.lock
            .path
            .clone()
            .unwrap_or_else(|| self.work_path.join(".locks"))
    }
}

impl HooksConfig {
    /// Command configured to run before `action`.
    #[must_use]
    pub fn early_for(&self, action: &str) -> Option<&str> {
        self.early.get(action).map(String::as_str)
    }

    /// Command configured to run after `action`.
    #[must_use]
    pub fn late_for(&self, action: &str) -> Option<&str> {
        self.late.get(action).map(String::as_str)
    }
}

impl std::fmt::Display for LockBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Local => "local",
            Self::Etcd => "etcd",
            Self::Memory => "memory",
        };
        write!(f, "{s}")
    }
}

fn default_work_path() -> PathBuf {
    PathBuf::from("work")
}

const fn default_check_concurrency() -> usize {
    DEFAULT_CHECK_CONCURRENCY
}

fn default_fleetctl_binary() -> String {
    String::from("fleetctl")
}

fn default_lock_prefix() -> String {
    String::from("/fleetwork/locks")
}

const fn default_lock_ttl() -> Duration {
    DEFAULT_LOCK_TTL
}

/// Serde adapter for durations written as `1h30m`.
mod duration_string {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
