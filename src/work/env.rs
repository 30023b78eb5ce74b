//! An environment: an ordered set of services sharing one cluster.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

use crate::config::{is_valid_name, EnvConfig};
use crate::error::{FleetworkError, Result, WorkError};
use crate::fleet::{ClusterControl, CommandOutput, UnitDescriptor};
use crate::manifest::SERVICE_MANIFEST_FILE;

use super::hooks::{HookInfo, HookRunner};
use super::pool::dispatch;
use super::registry::WorkContext;
use super::report::{CheckOutcome, CheckReport, GenerateReport, ServiceCheck, ServiceFailure, ServiceUnits};
use super::service::Service;

/// Directory holding one sub-directory per service.
const SERVICES_DIR: &str = "services";

/// An environment of the work tree.
///
/// Cloning is cheap; clones share the cached service list.
#[derive(Clone)]
pub struct Env {
    name: String,
    dir: PathBuf,
    config: Arc<EnvConfig>,
    context: Arc<WorkContext>,
    control: Arc<dyn ClusterControl>,
    hooks: HookRunner,
    services: Arc<OnceCell<Vec<String>>>,
}

impl Env {
    pub(crate) fn new(
        name: &str,
        dir: PathBuf,
        config: EnvConfig,
        context: Arc<WorkContext>,
    ) -> Result<Self> {
        let collaborators = &context.collaborators;
        let control = collaborators.clusters.connect(name, &config.fleet)?;
        let hooks = HookRunner::new(
            name,
            dir.clone(),
            config.hooks.clone(),
            collaborators.operator.clone(),
            Arc::clone(&collaborators.hooks),
        );

        Ok(Self {
            name: name.to_string(),
            dir,
            config: Arc::new(config),
            context,
            control,
            hooks,
            services: Arc::new(OnceCell::new()),
        })
    }

    /// Gets the environment name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Gets the environment directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Gets the parsed `env.yaml`.
    #[must_use]
    pub fn config(&self) -> &EnvConfig {
        &self.config
    }

    /// Lists service names in lexical order. Read once per env value.
    ///
    /// # Errors
    ///
    /// Returns an error if the services directory exists but cannot be read.
    pub async fn list_services(&self) -> Result<Vec<String>> {
        self.services
            .get_or_try_init(|| self.read_services())
            .await
            .cloned()
    }

    async fn read_services(&self) -> Result<Vec<String>> {
        let dir = self.dir.join(SERVICES_DIR);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(env = %self.name, "No services directory");
                return Ok(Vec::new());
            }
            Err(e) => return Err(WorkError::unreadable(dir, e).into()),
        };

        let mut services = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| WorkError::unreadable(&dir, e))?
        {
            let path = entry.path();
            if !path.join(SERVICE_MANIFEST_FILE).is_file() {
                continue;
            }
            match path.file_name().and_then(|n| n.to_str()) {
                Some(name) if is_valid_name(name) => services.push(name.to_string()),
                Some(name) => warn!(env = %self.name, "Ignoring service with invalid name '{name}'"),
                None => {}
            }
        }

        services.sort();
        debug!(env = %self.name, "Found {} services", services.len());
        Ok(services)
    }

    /// Loads the service `name`.
    ///
    /// # Errors
    ///
    /// Returns a not-found error if the service is not defined.
    pub async fn load_service(&self, name: &str) -> Result<Service> {
        let path = self.dir.join(SERVICES_DIR).join(name);
        if !path.join(SERVICE_MANIFEST_FILE).is_file() {
            return Err(WorkError::service_not_found(name, path).into());
        }

        Ok(Service::new(
            &self.name,
            name,
            &self.dir,
            Arc::clone(&self.context),
            Arc::clone(&self.control),
            self.hooks.clone(),
        ))
    }

    /// Regenerates every service.
    ///
    /// Per-service failures are logged and reported; the other services are
    /// still generated.
    ///
    /// # Errors
    ///
    /// Returns an error only if the services cannot be enumerated.
    pub async fn generate(&self) -> Result<GenerateReport> {
        let mut report = GenerateReport::new(&self.name);

        for service in self.list_services().await? {
            let generated = match self.load_service(&service).await {
                Ok(mut loaded) => loaded.generate(&[]).await,
                Err(e) => Err(e),
            };
            match generated {
                Ok(units) => report.generated.push(ServiceUnits { service, units }),
                Err(e) => {
                    error!(env = %self.name, service = %service, "Generate failed: {e}");
                    report.failures.push(ServiceFailure {
                        service,
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(env = %self.name, "{report}");
        Ok(report)
    }

    /// Generates, then checks every service against the cluster.
    ///
    /// The `env/check` late hook runs on every exit path.
    ///
    /// # Errors
    ///
    /// Returns an error if the services cannot be enumerated or a strict
    /// early hook fails. Individual service failures are in the report.
    pub async fn check(&self) -> Result<CheckReport> {
        let info = HookInfo::new("env/check");
        let late = self.hooks.late_guard(info.clone());
        let result = self.check_guarded(&info).await;
        late.finish().await;
        result
    }

    async fn check_guarded(&self, info: &HookInfo) -> Result<CheckReport> {
        self.generate().await?;
        debug!(env = %self.name, "Running check");

        self.hooks.run_early(info).await?;

        let services = self.list_services().await?;
        let width = self.context.settings.check_concurrency;
        let env = self.clone();
        let checks = dispatch(width, services.clone(), move |service| {
            let env = env.clone();
            async move { env.check_service(service).await }
        })
        .await;

        let mut report = CheckReport::new(&self.name);
        report.services = services
            .into_iter()
            .zip(checks)
            .map(|(service, checked)| {
                checked.unwrap_or_else(|e| {
                    error!(env = %self.name, service = %service, "Check aborted: {e}");
                    ServiceCheck {
                        service,
                        outcome: CheckOutcome::Failed {
                            error: format!("check aborted: {e}"),
                        },
                    }
                })
            })
            .collect();
        info!(env = %self.name, "{report}");
        Ok(report)
    }

    async fn check_service(&self, service: String) -> ServiceCheck {
        let checked = match self.load_service(&service).await {
            Ok(mut loaded) => loaded.check().await,
            Err(e) => Err(e),
        };

        let outcome = match checked {
            Ok(report) => CheckOutcome::InSync {
                units: report.unchanged.len(),
            },
            Err(FleetworkError::Drift(drift)) => CheckOutcome::Drifted {
                summary: drift.summary,
            },
            Err(e) => {
                error!(env = %self.name, service = %service, "Check failed: {e}");
                CheckOutcome::Failed { error: e.to_string() }
            }
        };

        ServiceCheck { service, outcome }
    }

    /// Live units of this environment.
    ///
    /// # Errors
    ///
    /// Returns a cluster error if the control interface fails.
    pub async fn status(&self) -> Result<Vec<UnitDescriptor>> {
        let mut units: Vec<UnitDescriptor> = self
            .control
            .list_units()
            .await?
            .into_iter()
            .filter(|u| u.belongs_to_env(&self.name))
            .collect();
        units.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(units)
    }

    /// Passes raw arguments to the control tool.
    ///
    /// # Errors
    ///
    /// Returns an error if the control tool cannot be run.
    pub async fn control(&self, args: &[String]) -> Result<CommandOutput> {
        debug!(env = %self.name, "Control pass-through: {}", args.join(" "));
        self.control.run_command(args).await
    }
}
