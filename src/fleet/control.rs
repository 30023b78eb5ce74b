//! Cluster control interface.
//!
//! The core never talks to fleet directly; it goes through these traits so the
//! control plane can be swapped or faked.

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{FleetConfig, Settings};
use crate::error::Result;

use super::types::{CommandOutput, UnitDescriptor};

/// Executes control-plane commands for one environment.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClusterControl: Send + Sync {
    /// Lists the units known to the control plane.
    async fn list_units(&self) -> Result<Vec<UnitDescriptor>>;

    /// Runs a raw control-tool command.
    ///
    /// A non-zero exit is reported through [`CommandOutput::status`]; an error is
    /// returned only when the tool could not be run at all.
    async fn run_command(&self, args: &[String]) -> Result<CommandOutput>;
}

/// Builds a [`ClusterControl`] for an environment.
pub trait ClusterProvider: Send + Sync {
    /// Connects to the cluster of `env` as described by its fleet settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection settings are unusable.
    fn connect(&self, env: &str, fleet: &FleetConfig) -> Result<Arc<dyn ClusterControl>>;
}

/// Provider that always hands out the same control handle.
#[derive(Clone)]
pub struct StaticClusterProvider {
    control: Arc<dyn ClusterControl>,
}

impl StaticClusterProvider {
    /// Wraps an existing control handle.
    #[must_use]
    pub fn new(control: Arc<dyn ClusterControl>) -> Self {
        Self { control }
    }
}

impl ClusterProvider for StaticClusterProvider {
    fn connect(&self, _env: &str, _fleet: &FleetConfig) -> Result<Arc<dyn ClusterControl>> {
        Ok(Arc::clone(&self.control))
    }
}

/// Provider building a `fleetctl` driver per environment.
#[derive(Debug, Clone)]
pub struct FleetCtlProvider {
    binary: String,
}

impl FleetCtlProvider {
    /// Creates a provider using the configured control tool.
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            binary: settings.fleetctl.binary.clone(),
        }
    }
}

impl ClusterProvider for FleetCtlProvider {
    fn connect(&self, env: &str, fleet: &FleetConfig) -> Result<Arc<dyn ClusterControl>> {
        Ok(Arc::new(super::fleetctl::FleetCtl::new(
            &self.binary,
            env,
            fleet,
        )))
    }
}
