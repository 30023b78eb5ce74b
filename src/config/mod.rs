//! Configuration module for fleetwork.
//!
//! This module handles all configuration-related functionality:
//! - Parsing and deserializing `fleetwork.yaml`, `env.yaml` and `service.yaml`
//! - Validation of configuration values
//! - Computing unit content hashes for drift detection

mod types;
mod parser;
mod validator;
mod hash;

pub use types::{
    EnvConfig, FleetConfig, FleetctlConfig, HooksConfig, LockBackend, LockConfig, NodeConfig,
    ServiceManifest, Settings, DEFAULT_CHECK_CONCURRENCY, DEFAULT_LOCK_TTL,
};
pub use parser::{ConfigParser, find_config_file, format_duration, parse_duration};
pub use validator::{ConfigValidator, ValidationResult, is_valid_name};
pub use hash::UnitHasher;
