//! Work tree discovery.
//!
//! The work root holds one directory per environment:
//!
//! ```text
//! <root>/<env>/env.yaml
//! <root>/<env>/services/<service>/service.yaml
//! <root>/<env>/units/<service>/<env>_<service>_<node>.service
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, warn};

use crate::config::{is_valid_name, ConfigParser, ConfigValidator, Settings};
use crate::error::{Result, WorkError};
use crate::fleet::{ClusterProvider, FleetCtlProvider};
use crate::lock::{build_lock_store, LockStore, Operator};
use crate::manifest::{ManifestResolver, TemplateResolver};

use super::confirm::{Confirm, StdinConfirm};
use super::env::Env;
use super::hooks::{HookExecutor, ShellExecutor};

/// File marking a directory as an environment.
pub const ENV_CONFIG_FILE: &str = "env.yaml";

/// External collaborators of the core.
#[derive(Clone)]
pub struct Collaborators {
    /// Compiles manifests into unit definitions.
    pub resolver: Arc<dyn ManifestResolver>,
    /// Connects to the cluster of an environment.
    pub clusters: Arc<dyn ClusterProvider>,
    /// Holds service locks.
    pub locks: Arc<dyn LockStore>,
    /// Approves update steps.
    pub confirm: Arc<dyn Confirm>,
    /// Runs hook commands.
    pub hooks: Arc<dyn HookExecutor>,
    /// Identity used as lock owner.
    pub operator: Operator,
}

/// Settings and collaborators shared by every env and service.
pub(crate) struct WorkContext {
    pub(crate) settings: Settings,
    pub(crate) collaborators: Collaborators,
    pub(crate) parser: ConfigParser,
}

/// Discovers environments under the work root.
#[derive(Clone)]
pub struct WorkRegistry {
    context: Arc<WorkContext>,
}

impl Collaborators {
    /// Builds the production collaborators described by `settings`.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock store cannot be built.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self {
            resolver: Arc::new(TemplateResolver::new()),
            clusters: Arc::new(FleetCtlProvider::from_settings(settings)),
            locks: build_lock_store(settings)?,
            confirm: Arc::new(StdinConfirm),
            hooks: Arc::new(ShellExecutor),
            operator: Operator::detect(settings.operator.as_deref()),
        })
    }
}

impl WorkRegistry {
    /// Creates a registry over `settings.work_path`.
    #[must_use]
    pub fn new(settings: Settings, collaborators: Collaborators) -> Self {
        Self {
            context: Arc::new(WorkContext {
                settings,
                collaborators,
                parser: ConfigParser::new(),
            }),
        }
    }

    /// Gets the settings.
    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.context.settings
    }

    /// Gets the operator identity.
    #[must_use]
    pub fn operator(&self) -> &Operator {
        &self.context.collaborators.operator
    }

    fn root(&self) -> &PathBuf {
        &self.context.settings.work_path
    }

    /// Lists environment names in lexical order.
    ///
    /// # Errors
    ///
    /// Returns an error if the work root cannot be read.
    pub async fn list_envs(&self) -> Result<Vec<String>> {
        let root = self.root();
        let mut entries = fs::read_dir(root)
            .await
            .map_err(|e| WorkError::unreadable(root, e))?;

        let mut envs = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| WorkError::unreadable(root, e))?
        {
            let path = entry.path();
            if !path.join(ENV_CONFIG_FILE).is_file() {
                continue;
            }
            match path.file_name().and_then(|n| n.to_str()) {
                Some(name) if is_valid_name(name) => envs.push(name.to_string()),
                Some(name) => warn!("Ignoring environment with invalid name '{name}'"),
                None => warn!("Ignoring environment with non UTF-8 name in {}", root.display()),
            }
        }

        envs.sort();
        debug!("Found {} environments in {}", envs.len(), root.display());
        Ok(envs)
    }

    /// Loads the environment `name`.
    ///
    /// # Errors
    ///
    /// Returns a not-found error if the environment does not exist, or a
    /// configuration error if its `env.yaml` is invalid.
    pub async fn load_env(&self, name: &str) -> Result<Env> {
        let dir = self.root().join(name);
        let config_path = dir.join(ENV_CONFIG_FILE);
        if !config_path.is_file() {
            return Err(WorkError::env_not_found(name, dir).into());
        }

        let config = self.context.parser.load_env_config(&config_path)?;
        ConfigValidator::new().validate_env(name, &config)?;

        Env::new(name, dir, config, Arc::clone(&self.context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FleetworkError;
    use crate::work::testing::WorkTree;

    #[tokio::test]
    async fn test_list_envs_sorted_and_filtered() {
        let tree = WorkTree::new();
        tree.env("staging", "");
        tree.env("prod", "");
        std::fs::create_dir_all(tree.root().join("scratch")).unwrap();
        tree.env("Old_env", "");

        let registry = tree.registry();
        let envs = registry.list_envs().await.unwrap();
        assert_eq!(envs, vec!["prod", "staging"]);
        for name in envs {
            registry.load_env(&name).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_unreadable_root_is_infrastructure() {
        let tree = WorkTree::new();
        let mut settings = Settings::with_work_path(tree.root().join("missing"));
        settings.lock.backend = crate::config::LockBackend::Memory;
        let registry = WorkRegistry::new(settings, tree.collaborators());

        let err = registry.list_envs().await.unwrap_err();
        assert!(err.is_infrastructure());
    }

    #[tokio::test]
    async fn test_load_missing_env() {
        let tree = WorkTree::new();
        tree.env("staging", "");

        let err = tree.registry().load_env("prod").await.err().unwrap();
        assert!(matches!(err, FleetworkError::Work(WorkError::NotFound { kind: "environment", .. })));
    }

    #[tokio::test]
    async fn test_load_env_validates_config() {
        let tree = WorkTree::new();
        tree.env("staging", "hooks:\n  early:\n    env/check: \"  \"\n");

        assert!(tree.registry().load_env("staging").await.is_err());
    }
}
