//! Manifest resolver interface.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::Result;

/// Identifies the service whose manifests are resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRef {
    /// Environment name.
    pub env: String,
    /// Service name.
    pub service: String,
    /// Service directory (holds `service.yaml`).
    pub path: PathBuf,
}

/// A compiled unit definition, ready to be pushed to the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitDefinition {
    /// Unit file name.
    pub name: String,
    /// Unit file content.
    pub content: String,
}

/// Compiles a service's manifest references into unit definitions.
#[async_trait]
pub trait ManifestResolver: Send + Sync {
    /// Resolves `service` into unit definitions.
    ///
    /// Non-empty `manifests` override the service's default manifests.
    ///
    /// # Errors
    ///
    /// Returns a generation error when the manifests cannot be compiled.
    async fn resolve(&self, service: &ServiceRef, manifests: &[String]) -> Result<Vec<UnitDefinition>>;
}

impl UnitDefinition {
    /// Creates a unit definition.
    #[must_use]
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

impl ServiceRef {
    /// Creates a service reference.
    #[must_use]
    pub fn new(env: impl Into<String>, service: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            env: env.into(),
            service: service.into(),
            path: path.into(),
        }
    }

    /// `<env>/<service>`, used as lock key and in log lines.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}/{}", self.env, self.service)
    }
}
