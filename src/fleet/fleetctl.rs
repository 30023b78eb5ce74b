//! `fleetctl` process driver.
//!
//! Every call spawns the control tool with the environment's connection flags
//! prepended. There is no timeout: a hung call occupies its caller until the
//! tool returns.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, trace};

use crate::config::FleetConfig;
use crate::error::{ClusterError, Result};

use super::control::ClusterControl;
use super::types::{CommandOutput, UnitDescriptor};

/// Fields requested from `list-units`, in parse order.
const LIST_UNITS_FIELDS: &str = "unit,load,active,sub,machine";

/// Cluster control backed by the `fleetctl` binary.
#[derive(Debug, Clone)]
pub struct FleetCtl {
    /// Program to execute.
    binary: String,
    /// Environment name, for logging.
    env: String,
    /// Connection flags prepended to every command.
    global_args: Vec<String>,
}

impl FleetCtl {
    /// Creates a driver for one environment.
    #[must_use]
    pub fn new(binary: &str, env: &str, fleet: &FleetConfig) -> Self {
        Self {
            binary: binary.to_string(),
            env: env.to_string(),
            global_args: Self::connection_args(fleet),
        }
    }

    /// Builds the connection flags for an environment.
    #[must_use]
    pub fn connection_args(fleet: &FleetConfig) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(endpoint) = &fleet.endpoint {
            args.push(format!("--endpoint={endpoint}"));
        }
        if let Some(tunnel) = &fleet.tunnel {
            args.push(format!("--tunnel={tunnel}"));
        }
        args.push(format!(
            "--strict-host-key-checking={}",
            fleet.strict_host_key_checking
        ));
        args
    }
}

#[async_trait]
impl ClusterControl for FleetCtl {
    async fn list_units(&self) -> Result<Vec<UnitDescriptor>> {
        let args: Vec<String> = ["list-units", "-no-legend", "-full", "-fields", LIST_UNITS_FIELDS]
            .iter()
            .map(|s| (*s).to_string())
            .collect();

        let output = self.run_command(&args).await?.into_result(&args)?;
        let units = UnitDescriptor::parse_listing(&output.stdout)?;

        debug!(env = %self.env, "Found {} units", units.len());
        Ok(units)
    }

    async fn run_command(&self, args: &[String]) -> Result<CommandOutput> {
        trace!(env = %self.env, "Running {} {}", self.binary, args.join(" "));

        let output = Command::new(&self.binary)
            .args(&self.global_args)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| ClusterError::spawn(&self.binary, e.to_string()))?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            status: output.status.code(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_args() {
        let fleet = FleetConfig {
            endpoint: Some(String::from("http://10.0.0.1:4001")),
            tunnel: Some(String::from("bastion.example.com")),
            strict_host_key_checking: false,
        };
        assert_eq!(
            FleetCtl::connection_args(&fleet),
            vec![
                "--endpoint=http://10.0.0.1:4001",
                "--tunnel=bastion.example.com",
                "--strict-host-key-checking=false",
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_binary_is_a_spawn_error() {
        let ctl = FleetCtl::new("/nonexistent/fleetctl", "staging", &FleetConfig::default());
        let result = ctl.run_command(&[String::from("list-machines")]).await;
        assert!(matches!(
            result,
            Err(crate::error::FleetworkError::Cluster(ClusterError::Spawn { .. }))
        ));
    }

    #[tokio::test]
    async fn test_exit_status_is_reported() {
        // `sh -c` stands in for the control tool: global args become $0 and $1.
        let ctl = FleetCtl {
            binary: String::from("sh"),
            env: String::from("staging"),
            global_args: vec![String::from("-c"), String::from("echo out; echo err >&2; exit 3")],
        };
        let output = ctl.run_command(&[]).await.unwrap();
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
        assert_eq!(output.status, Some(3));
        assert!(!output.success());
    }
}
