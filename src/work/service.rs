//! A deployable service of an environment.
//!
//! A service owns its generated unit definitions and its lock. Generation
//! writes units under `<env>/units/<service>/`; checking and updating compare
//! those files against what the cluster runs.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tracing::{debug, error, info, warn};

use crate::error::{FleetworkError, LockError, Result};
use crate::fleet::{ClusterControl, UnitDescriptor, UNIT_SUFFIX};
use crate::lock::{AcquireOutcome, LockRecord, ReleaseOutcome};
use crate::manifest::{ServiceRef, UnitDefinition};
use crate::planner::{ActionStatus, DriftEngine, DriftReport, PlanExecutor, UpdatePlan, UpdateReport};

use super::hooks::{HookInfo, HookRunner};
use super::registry::WorkContext;

/// Message of the lock an update takes for itself.
pub const UPDATE_LOCK_MESSAGE: &str = "update in progress";

/// A service of an environment.
#[derive(Clone)]
pub struct Service {
    env: String,
    name: String,
    dir: PathBuf,
    units_dir: PathBuf,
    context: Arc<WorkContext>,
    control: Arc<dyn ClusterControl>,
    hooks: HookRunner,
    units: Option<Vec<UnitDefinition>>,
    lock: Option<LockRecord>,
}

/// Live state of one unit of a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitStatus {
    /// Unit name.
    pub unit: String,
    /// Active state, `not-found` when the cluster does not know the unit.
    pub state: String,
    /// Sub state.
    pub sub: String,
    /// Host placement.
    pub host: String,
    /// Whether the unit is generated locally.
    pub generated: bool,
}

impl Service {
    pub(crate) fn new(
        env: &str,
        name: &str,
        env_dir: &Path,
        context: Arc<WorkContext>,
        control: Arc<dyn ClusterControl>,
        hooks: HookRunner,
    ) -> Self {
        Self {
            env: env.to_string(),
            name: name.to_string(),
            dir: env_dir.join("services").join(name),
            units_dir: env_dir.join("units").join(name),
            context,
            control,
            hooks,
            units: None,
            lock: None,
        }
    }

    /// Gets the service name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Gets the environment name.
    #[must_use]
    pub fn env(&self) -> &str {
        &self.env
    }

    /// Directory holding the generated unit files.
    #[must_use]
    pub fn units_dir(&self) -> &Path {
        &self.units_dir
    }

    /// Lock key of this service.
    #[must_use]
    pub fn lock_key(&self) -> String {
        self.service_ref().key()
    }

    fn service_ref(&self) -> ServiceRef {
        ServiceRef::new(&self.env, &self.name, &self.dir)
    }

    fn operator(&self) -> &str {
        self.context.collaborators.operator.as_str()
    }

    /// Generates unit definitions.
    ///
    /// Non-empty `manifests` override the service defaults. On failure the
    /// previously generated definitions are left untouched.
    ///
    /// # Errors
    ///
    /// Returns a generation error if the manifests cannot be compiled, or an
    /// IO error if the unit files cannot be written.
    pub async fn generate(&mut self, manifests: &[String]) -> Result<usize> {
        let units = self
            .context
            .collaborators
            .resolver
            .resolve(&self.service_ref(), manifests)
            .await
            .inspect_err(|e| error!(env = %self.env, service = %self.name, "Generation failed: {e}"))?;

        self.write_units(&units).await?;
        info!(env = %self.env, service = %self.name, "Generated {} units", units.len());

        let count = units.len();
        self.units = Some(units);
        Ok(count)
    }

    async fn write_units(&self, units: &[UnitDefinition]) -> Result<()> {
        fs::create_dir_all(&self.units_dir).await?;

        for unit in units {
            let path = self.units_dir.join(&unit.name);
            let temp_path = self.units_dir.join(format!(".{}.tmp", unit.name));
            fs::write(&temp_path, &unit.content).await?;
            fs::rename(&temp_path, &path).await?;
        }

        let keep: HashSet<&str> = units.iter().map(|u| u.name.as_str()).collect();
        let mut entries = fs::read_dir(&self.units_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if name.ends_with(UNIT_SUFFIX) && !keep.contains(name) {
                debug!(env = %self.env, service = %self.name, unit = name, "Removing stale unit file");
                fs::remove_file(entry.path()).await?;
            }
        }

        Ok(())
    }

    /// Reads the generated unit files, sorted by name. Missing directory reads as empty.
    async fn load_generated(&self) -> Result<Vec<UnitDefinition>> {
        let mut entries = match fs::read_dir(&self.units_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut units = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if name.ends_with(UNIT_SUFFIX) {
                let content = fs::read_to_string(entry.path()).await?;
                units.push(UnitDefinition::new(name, content));
            }
        }

        units.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(units)
    }

    /// Generated units, generating with defaults when nothing exists yet.
    async fn local_units(&mut self) -> Result<Vec<UnitDefinition>> {
        if let Some(units) = &self.units {
            return Ok(units.clone());
        }

        let units = self.load_generated().await?;
        if !units.is_empty() {
            self.units = Some(units.clone());
            return Ok(units);
        }

        debug!(env = %self.env, service = %self.name, "No generated units, generating defaults");
        self.generate(&[]).await?;
        Ok(self.units.clone().unwrap_or_default())
    }

    /// Units of this service on the cluster, with the content of those also generated locally.
    async fn fetch_remote(
        &self,
        local: &[UnitDefinition],
    ) -> Result<(Vec<UnitDescriptor>, HashMap<String, String>)> {
        let remote: Vec<UnitDescriptor> = self
            .control
            .list_units()
            .await?
            .into_iter()
            .filter(|u| u.belongs_to_service(&self.env, &self.name))
            .collect();

        let local_names: HashSet<&str> = local.iter().map(|u| u.name.as_str()).collect();
        let mut contents = HashMap::new();
        for unit in remote.iter().filter(|u| local_names.contains(u.name.as_str())) {
            let args = vec![String::from("cat"), unit.name.clone()];
            let output = self.control.run_command(&args).await?.into_result(&args)?;
            contents.insert(unit.name.clone(), output.stdout);
        }

        Ok((remote, contents))
    }

    /// Computes the full drift report of this service.
    ///
    /// # Errors
    ///
    /// Returns an error if units cannot be generated or the cluster cannot be queried.
    pub async fn drift(&mut self) -> Result<DriftReport> {
        let local = self.local_units().await?;
        let (remote, contents) = self.fetch_remote(&local).await?;
        Ok(DriftEngine::new().compute(&self.env, &self.name, &local, &remote, &contents))
    }

    /// Checks the generated units against the cluster.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::error::DriftError`] describing every drifted unit,
    /// or the error that prevented the check.
    pub async fn check(&mut self) -> Result<DriftReport> {
        let report = self.drift().await?;
        if report.has_drift() {
            warn!(env = %self.env, service = %self.name, "Drift detected: {}", report.summary());
        } else {
            info!(env = %self.env, service = %self.name, "{} units in sync", report.unchanged.len());
        }
        report.into_result().map_err(FleetworkError::from)
    }

    /// Live state of the units of this service.
    ///
    /// # Errors
    ///
    /// Returns a cluster error if the control interface fails.
    pub async fn status(&self) -> Result<Vec<UnitStatus>> {
        let local = match &self.units {
            Some(units) => units.clone(),
            None => self.load_generated().await?,
        };
        let local_names: HashSet<&str> = local.iter().map(|u| u.name.as_str()).collect();

        let remote: Vec<UnitDescriptor> = self
            .control
            .list_units()
            .await?
            .into_iter()
            .filter(|u| u.belongs_to_service(&self.env, &self.name))
            .collect();
        let remote_names: HashSet<&str> = remote.iter().map(|u| u.name.as_str()).collect();

        let mut rows: Vec<UnitStatus> = remote
            .iter()
            .map(|u| UnitStatus {
                unit: u.name.clone(),
                state: u.active.to_string(),
                sub: u.sub.clone(),
                host: u.host().to_string(),
                generated: local_names.contains(u.name.as_str()),
            })
            .collect();
        rows.extend(
            local
                .iter()
                .filter(|u| !remote_names.contains(u.name.as_str()))
                .map(|u| UnitStatus {
                    unit: u.name.clone(),
                    state: String::from("not-found"),
                    sub: String::from("-"),
                    host: String::from("-"),
                    generated: true,
                }),
        );
        rows.sort_by(|a, b| a.unit.cmp(&b.unit));
        Ok(rows)
    }

    /// Locks this service for `ttl`.
    ///
    /// Renews the lock when the operator already holds it.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::AlreadyLocked`] if someone else holds a live lock.
    pub async fn lock(&mut self, ttl: Duration, message: &str) -> Result<LockRecord> {
        let key = self.lock_key();
        let outcome = self
            .context
            .collaborators
            .locks
            .acquire(&key, ttl, self.operator(), message)
            .await?;

        match outcome {
            AcquireOutcome::Acquired(record) => {
                info!(env = %self.env, service = %self.name, "Locked until {}", record.expires_at().to_rfc3339());
                self.lock = Some(record.clone());
                Ok(record)
            }
            AcquireOutcome::Conflict(holder) => {
                self.lock = Some(holder.clone());
                Err(LockError::AlreadyLocked {
                    key,
                    owner: holder.owner().to_string(),
                    expires_at: holder.expires_at().to_rfc3339(),
                    message: holder.message().to_string(),
                }
                .into())
            }
        }
    }

    /// Releases the operator's lock on this service.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::NotLocked`] if there is no live lock, or
    /// [`LockError::NotOwner`] if it belongs to someone else.
    pub async fn unlock(&mut self) -> Result<LockRecord> {
        let key = self.lock_key();
        let outcome = self
            .context
            .collaborators
            .locks
            .release(&key, self.operator())
            .await?;

        match outcome {
            ReleaseOutcome::Released(record) => {
                info!(env = %self.env, service = %self.name, "Unlocked");
                self.lock = None;
                Ok(record)
            }
            ReleaseOutcome::NotFound => {
                self.lock = None;
                Err(LockError::NotLocked { key }.into())
            }
            ReleaseOutcome::NotOwner(holder) => {
                let owner = holder.owner().to_string();
                self.lock = Some(holder);
                Err(LockError::NotOwner {
                    key,
                    owner,
                    requester: self.operator().to_string(),
                }
                .into())
            }
        }
    }

    /// Current live lock on this service, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock store fails.
    pub async fn lock_info(&mut self) -> Result<Option<LockRecord>> {
        self.lock = self
            .context
            .collaborators
            .locks
            .inspect(&self.lock_key())
            .await?;
        Ok(self.lock.clone())
    }

    /// Fails when someone else holds a live lock; returns the operator's own lock otherwise.
    async fn guard_foreign_lock(&mut self) -> Result<Option<LockRecord>> {
        let current = self.lock_info().await?;
        match current {
            Some(holder) if !holder.is_owned_by(self.operator()) => Err(LockError::Locked {
                key: self.lock_key(),
                owner: holder.owner().to_string(),
                expires_at: holder.expires_at().to_rfc3339(),
                message: holder.message().to_string(),
            }
            .into()),
            own => Ok(own),
        }
    }

    /// Pushes units to the cluster.
    ///
    /// With `all` every generated unit is pushed, otherwise only drifted ones.
    /// Without `yes` each unit needs confirmation. A failing unit is recorded
    /// and the remaining units are still attempted.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Locked`] if someone else holds the service lock,
    /// before any cluster call and before each unit.
    pub async fn update(&mut self, all: bool, yes: bool) -> Result<UpdateReport> {
        let own_lock = self.guard_foreign_lock().await?;

        let info = HookInfo::new("service/update").with_service(&self.name);
        let late = self.hooks.late_guard(info.clone());
        let result = self.update_guarded(&info, own_lock.is_some(), all, yes).await;
        late.finish().await;
        result
    }

    async fn update_guarded(
        &mut self,
        info: &HookInfo,
        holds_lock: bool,
        all: bool,
        yes: bool,
    ) -> Result<UpdateReport> {
        self.hooks.run_early(info).await?;

        let mut report = UpdateReport::new(&self.env, &self.name);
        if !holds_lock {
            let ttl = self.context.settings.lock.default_ttl;
            match self.lock(ttl, UPDATE_LOCK_MESSAGE).await {
                Ok(_) => report.acquired_lock = true,
                Err(FleetworkError::Lock(LockError::AlreadyLocked {
                    key,
                    owner,
                    expires_at,
                    message,
                })) => {
                    return Err(LockError::Locked {
                        key,
                        owner,
                        expires_at,
                        message,
                    }
                    .into());
                }
                Err(e) => return Err(e),
            }
        }

        let result = self.apply(all, yes, &mut report).await;

        if report.acquired_lock
            && let Err(e) = self.unlock().await
        {
            warn!(env = %self.env, service = %self.name, "Failed to release update lock: {e}");
        }

        result.map(|()| report)
    }

    async fn apply(&mut self, all: bool, yes: bool, report: &mut UpdateReport) -> Result<()> {
        let local = self.local_units().await?;
        let (remote, contents) = self.fetch_remote(&local).await?;

        let plan = if all {
            UpdatePlan::all(&self.env, &self.name, &local, &remote)
        } else {
            UpdatePlan::from_drift(&DriftEngine::new().compute(
                &self.env, &self.name, &local, &remote, &contents,
            ))
        };

        if plan.is_empty() {
            info!(env = %self.env, service = %self.name, "Nothing to update");
            return Ok(());
        }
        debug!("{plan}");

        let control = Arc::clone(&self.control);
        let units_dir = self.units_dir.clone();
        let executor = PlanExecutor::new(control.as_ref(), &units_dir);
        let confirm = Arc::clone(&self.context.collaborators.confirm);

        for action in plan.actions {
            self.guard_foreign_lock().await?;

            if !yes && !confirm.confirm(&format!("{action}?")).await {
                info!(env = %self.env, service = %self.name, unit = %action.unit, "Skipped by operator");
                report.record(action, ActionStatus::Declined);
                continue;
            }

            match executor.execute_action(&action).await {
                Ok(()) => report.record(action, ActionStatus::Applied),
                Err(e) => {
                    error!(env = %self.env, service = %self.name, unit = %action.unit, "Update failed: {e}");
                    report.record(action, ActionStatus::Failed(e.to_string()));
                }
            }
        }

        info!("{report}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet::{MockClusterControl, UnitState};
    use crate::lock::{LockStore, Operator};
    use crate::planner::ActionType;
    use crate::work::registry::{Collaborators, WorkRegistry};
    use crate::work::Confirm;
    use crate::work::testing::{unit_content, ScriptedConfirm, WorkTree, OPERATOR};

    const HOUR: Duration = Duration::from_secs(3600);

    const UPDATE_HOOKS: &str = "\
hooks:
  early:
    service/update: echo before
  late:
    service/update: echo after
";

    async fn web(tree: &WorkTree) -> Service {
        tree.registry()
            .load_env("staging")
            .await
            .unwrap()
            .load_service("web")
            .await
            .unwrap()
    }

    fn tree_with_web(env_config: &str) -> WorkTree {
        let tree = WorkTree::new();
        tree.env("staging", env_config);
        tree.service("staging", "web");
        tree
    }

    fn as_bob(tree: &WorkTree) -> WorkRegistry {
        let collaborators = Collaborators {
            operator: Operator::new("bob@ops"),
            ..tree.collaborators()
        };
        WorkRegistry::new(tree.settings(), collaborators)
    }

    async fn bob_locks(tree: &WorkTree, ttl: Duration) {
        tree.locks
            .acquire("staging/web", ttl, "bob@ops", "db migration")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_generate_writes_units_and_drops_stale_files() {
        let tree = tree_with_web("");
        let mut service = web(&tree).await;
        let stale = service.units_dir().join("staging_web_9.service");
        std::fs::create_dir_all(service.units_dir()).unwrap();
        std::fs::write(&stale, "old").unwrap();

        assert_eq!(service.generate(&[]).await.unwrap(), 1);

        let unit = service.units_dir().join("staging_web_1.service");
        assert_eq!(std::fs::read_to_string(unit).unwrap(), unit_content("web"));
        assert!(!stale.exists());
    }

    #[tokio::test]
    async fn test_failed_generation_keeps_previous_units() {
        let tree = tree_with_web("");
        let mut service = web(&tree).await;
        service.generate(&[]).await.unwrap();

        tree.resolver.fail_for("web");
        let err = service.generate(&[]).await.unwrap_err();
        assert!(matches!(err, FleetworkError::Generation(_)));

        assert!(service.units_dir().join("staging_web_1.service").is_file());
        assert_eq!(service.units.as_ref().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn test_check_generates_defaults_first() {
        let tree = tree_with_web("");
        tree.deploy_in_sync("staging", "web");
        let mut service = web(&tree).await;

        let report = service.check().await.unwrap();
        assert_eq!(report.unchanged, vec![String::from("staging_web_1.service")]);
        assert!(service.units_dir().join("staging_web_1.service").is_file());
    }

    #[tokio::test]
    async fn test_check_reports_drift() {
        let tree = tree_with_web("");
        tree.cluster.deploy("staging_web_2.service", "leftover");
        let mut service = web(&tree).await;

        let err = service.check().await.unwrap_err();
        let FleetworkError::Drift(drift) = err else {
            panic!("expected drift, got {err}");
        };
        assert_eq!(
            drift.summary,
            "staging_web_1.service: missing, staging_web_2.service: orphaned"
        );

        // Idempotent: nothing was pushed.
        assert!(service.check().await.is_err());
        assert!(tree.cluster.mutations().is_empty());
    }

    #[tokio::test]
    async fn test_failed_unit_is_drift_and_update_restarts_it() {
        let tree = tree_with_web("");
        tree.cluster
            .deploy_with_state("staging_web_1.service", &unit_content("web"), UnitState::Failed);
        let mut service = web(&tree).await;

        let Err(FleetworkError::Drift(drift)) = service.check().await else {
            panic!("expected drift");
        };
        assert_eq!(drift.summary, "staging_web_1.service: inactive");

        let report = service.update(false, true).await.unwrap();
        assert_eq!(report.applied(), 1);
        assert_eq!(tree.cluster.mutations()[0], vec!["destroy", "staging_web_1.service"]);
        assert!(service.check().await.is_ok());
    }

    #[tokio::test]
    async fn test_status_marks_generated_units() {
        let tree = tree_with_web("");
        tree.cluster.deploy("staging_web_2.service", "leftover");
        let mut service = web(&tree).await;
        service.generate(&[]).await.unwrap();

        let rows = service.status().await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].unit, "staging_web_1.service");
        assert_eq!(rows[0].state, "not-found");
        assert!(rows[0].generated);
        assert_eq!(rows[1].state, "active");
        assert_eq!(rows[1].host, "10.0.0.1");
        assert!(!rows[1].generated);
    }

    #[tokio::test]
    async fn test_same_owner_relock_renews() {
        let tree = tree_with_web("");
        let mut service = web(&tree).await;

        service.lock(HOUR, "deploy").await.unwrap();
        let renewed = service.lock(Duration::from_secs(600), "quick fix").await.unwrap();

        assert_eq!(renewed.owner(), OPERATOR);
        assert_eq!(renewed.expires_at(), renewed.acquired() + chrono::TimeDelta::minutes(10));
        assert_eq!(service.lock_info().await.unwrap(), Some(renewed));
    }

    #[tokio::test]
    async fn test_foreign_lock_blocks_until_expiry() {
        let tree = tree_with_web("");
        bob_locks(&tree, Duration::from_millis(100)).await;
        let mut service = web(&tree).await;

        let err = service.lock(HOUR, "deploy").await.unwrap_err();
        assert!(matches!(err, FleetworkError::Lock(LockError::AlreadyLocked { ref owner, .. }) if owner == "bob@ops"));

        tokio::time::sleep(Duration::from_millis(150)).await;
        service.lock(HOUR, "deploy").await.unwrap();
        assert_eq!(service.lock_info().await.unwrap().unwrap().owner(), OPERATOR);
    }

    #[tokio::test]
    async fn test_unlock_requires_ownership() {
        let tree = tree_with_web("");
        let mut mine = web(&tree).await;
        let mut theirs = as_bob(&tree)
            .load_env("staging")
            .await
            .unwrap()
            .load_service("web")
            .await
            .unwrap();

        assert!(matches!(
            mine.unlock().await,
            Err(FleetworkError::Lock(LockError::NotLocked { .. }))
        ));

        mine.lock(HOUR, "deploy").await.unwrap();
        assert!(matches!(
            theirs.unlock().await,
            Err(FleetworkError::Lock(LockError::NotOwner { .. }))
        ));

        mine.unlock().await.unwrap();
        assert_eq!(theirs.lock_info().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_update_refuses_foreign_lock_without_cluster_calls() {
        let tree = tree_with_web(UPDATE_HOOKS);
        bob_locks(&tree, HOUR).await;

        let mut control = MockClusterControl::new();
        control.expect_list_units().never();
        control.expect_run_command().never();
        let registry = tree.registry_with_control(Arc::new(control));
        let mut service = registry
            .load_env("staging")
            .await
            .unwrap()
            .load_service("web")
            .await
            .unwrap();

        let err = service.update(true, true).await.unwrap_err();
        assert!(matches!(err, FleetworkError::Lock(LockError::Locked { ref owner, .. }) if owner == "bob@ops"));
        assert!(tree.hooks.calls().is_empty());
    }

    #[tokio::test]
    async fn test_update_pushes_drifted_units_under_a_temporary_lock() {
        let tree = tree_with_web(UPDATE_HOOKS);
        tree.cluster.deploy("staging_web_1.service", "[Service]\nExecStart=/usr/bin/old\n");
        let mut service = web(&tree).await;

        let report = service.update(false, true).await.unwrap();

        assert!(report.acquired_lock);
        assert_eq!(report.applied(), 1);
        assert_eq!(report.results[0].action.action_type, ActionType::Push);
        let mutations = tree.cluster.mutations();
        assert_eq!(mutations.len(), 2);
        assert_eq!(mutations[0], vec!["destroy", "staging_web_1.service"]);
        assert_eq!(mutations[1][0], "start");

        assert!(service.check().await.is_ok());
        assert_eq!(service.lock_info().await.unwrap(), None);
        assert_eq!(tree.hooks.commands(), vec!["echo before", "echo after"]);
        assert_eq!(tree.hooks.calls()[0].var("FLEETWORK_SERVICE"), Some("web"));
    }

    #[tokio::test]
    async fn test_update_keeps_operator_lock() {
        let tree = tree_with_web("");
        let mut service = web(&tree).await;
        service.lock(HOUR, "maintenance").await.unwrap();

        let report = service.update(false, true).await.unwrap();

        assert!(!report.acquired_lock);
        assert_eq!(report.applied(), 1);
        assert_eq!(service.lock_info().await.unwrap().unwrap().message(), "maintenance");
    }

    #[tokio::test]
    async fn test_update_continues_after_failed_unit() {
        let tree = tree_with_web("");
        tree.cluster.deploy("staging_web_9.service", "leftover");
        tree.cluster.reject("staging_web_9.service");
        let mut service = web(&tree).await;

        let report = service.update(true, true).await.unwrap();

        assert_eq!(report.results.len(), 2);
        assert!(matches!(report.results[0].status, ActionStatus::Failed(_)));
        assert_eq!(report.results[1].status, ActionStatus::Applied);
        assert!(!report.all_successful());
    }

    #[tokio::test]
    async fn test_update_asks_before_each_unit() {
        let mut tree = tree_with_web("");
        tree.cluster.deploy("staging_web_9.service", "leftover");
        let confirm = Arc::new(ScriptedConfirm::new(&[false, true]));
        let prompt: Arc<dyn Confirm> = confirm.clone();
        tree.confirm = prompt;
        let mut service = web(&tree).await;

        let report = service.update(false, false).await.unwrap();

        assert_eq!(confirm.prompts.lock().unwrap().len(), 2);
        assert_eq!(report.declined(), 1);
        assert_eq!(report.applied(), 1);
        let mutations = tree.cluster.mutations();
        assert_eq!(mutations.len(), 1);
        assert_eq!(mutations[0][0], "start");
    }
}
