//! Fakes shared by the work tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use crate::config::{LockBackend, Settings};
use crate::error::{GenerationError, Result};
use crate::fleet::{
    unit_name, ClusterControl, CommandOutput, StaticClusterProvider, UnitDescriptor, UnitState,
};
use crate::lock::{LockStore, MemoryLockStore, Operator};
use crate::manifest::{ManifestResolver, ServiceRef, UnitDefinition};

use super::confirm::{AssumeYes, Confirm};
use super::hooks::HookExecutor;
use super::registry::{Collaborators, WorkRegistry};

pub const OPERATOR: &str = "alice@ops";

/// Content the fake resolver renders for a service.
pub fn unit_content(service: &str) -> String {
    format!("[Service]\nExecStart=/usr/bin/{service}\n")
}

/// Resolves one unit per service, failing for selected services.
#[derive(Default)]
pub struct FakeResolver {
    failing: Mutex<HashSet<String>>,
}

impl FakeResolver {
    pub fn fail_for(&self, service: &str) {
        self.failing.lock().unwrap().insert(service.to_string());
    }
}

#[async_trait]
impl ManifestResolver for FakeResolver {
    async fn resolve(&self, service: &ServiceRef, _manifests: &[String]) -> Result<Vec<UnitDefinition>> {
        if self.failing.lock().unwrap().contains(&service.service) {
            return Err(GenerationError {
                env: service.env.clone(),
                service: service.service.clone(),
                message: String::from("broken manifest"),
            }
            .into());
        }
        Ok(vec![UnitDefinition::new(
            unit_name(&service.env, &service.service, "1"),
            unit_content(&service.service),
        )])
    }
}

/// In-memory cluster counting concurrent listings.
#[derive(Default)]
pub struct FakeCluster {
    units: Mutex<Vec<UnitDescriptor>>,
    contents: Mutex<HashMap<String, String>>,
    rejected: Mutex<HashSet<String>>,
    exploding: Mutex<HashSet<String>>,
    commands: Mutex<Vec<Vec<String>>>,
    delay: Duration,
    list_calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl FakeCluster {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn deploy(&self, name: &str, content: &str) {
        self.deploy_with_state(name, content, UnitState::Active);
    }

    pub fn deploy_with_state(&self, name: &str, content: &str, active: UnitState) {
        let mut units = self.units.lock().unwrap();
        units.retain(|u| u.name != name);
        units.push(descriptor(name, active));
        self.contents
            .lock()
            .unwrap()
            .insert(name.to_string(), content.to_string());
    }

    /// Makes `start` and `destroy` fail for a unit.
    pub fn reject(&self, name: &str) {
        self.rejected.lock().unwrap().insert(name.to_string());
    }

    /// Makes `cat` of a unit panic.
    pub fn explode_on(&self, name: &str) {
        self.exploding.lock().unwrap().insert(name.to_string());
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Mutating commands (everything but `cat`).
    pub fn mutations(&self) -> Vec<Vec<String>> {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.first().is_none_or(|verb| verb != "cat"))
            .cloned()
            .collect()
    }
}

fn descriptor(name: &str, active: UnitState) -> UnitDescriptor {
    UnitDescriptor {
        name: name.to_string(),
        load: String::from("loaded"),
        active,
        sub: String::from("running"),
        machine_id: Some(String::from("0a1b2c")),
        machine_ip: Some(String::from("10.0.0.1")),
    }
}

fn output(status: i32, stdout: String, stderr: &str) -> CommandOutput {
    CommandOutput {
        stdout,
        stderr: stderr.to_string(),
        status: Some(status),
    }
}

#[async_trait]
impl ClusterControl for FakeCluster {
    async fn list_units(&self) -> Result<Vec<UnitDescriptor>> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.units.lock().unwrap().clone())
    }

    async fn run_command(&self, args: &[String]) -> Result<CommandOutput> {
        self.commands.lock().unwrap().push(args.to_vec());
        let target = args.get(1).cloned().unwrap_or_default();

        match args.first().map(String::as_str) {
            Some("cat") if self.exploding.lock().unwrap().contains(&target) => {
                panic!("cluster connection dropped while reading {target}")
            }
            Some("cat") => Ok(match self.contents.lock().unwrap().get(&target) {
                Some(content) => output(0, content.clone(), ""),
                None => output(1, String::new(), "Unit not found"),
            }),
            Some("destroy") => {
                if self.rejected.lock().unwrap().contains(&target) {
                    return Ok(output(1, String::new(), "cannot destroy"));
                }
                self.units.lock().unwrap().retain(|u| u.name != target);
                self.contents.lock().unwrap().remove(&target);
                Ok(output(0, String::new(), ""))
            }
            Some("start") => {
                let path = PathBuf::from(&target);
                let name = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or_default()
                    .to_string();
                if self.rejected.lock().unwrap().contains(&name) {
                    return Ok(output(1, String::new(), "cannot schedule"));
                }
                let content = std::fs::read_to_string(&path).unwrap_or_default();
                self.deploy(&name, &content);
                Ok(output(0, String::new(), ""))
            }
            _ => Ok(output(0, args.join(" "), "")),
        }
    }
}

/// One recorded hook execution.
#[derive(Debug, Clone)]
pub struct HookCall {
    pub command: String,
    pub vars: Vec<(String, String)>,
}

impl HookCall {
    pub fn var(&self, key: &str) -> Option<&str> {
        self.vars
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Records hook executions instead of running them.
#[derive(Default)]
pub struct RecordingExecutor {
    calls: Mutex<Vec<HookCall>>,
    fail: bool,
}

impl RecordingExecutor {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<HookCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.command).collect()
    }
}

#[async_trait]
impl HookExecutor for RecordingExecutor {
    async fn execute(&self, command: &str, _dir: &Path, vars: &[(String, String)]) -> Result<CommandOutput> {
        self.calls.lock().unwrap().push(HookCall {
            command: command.to_string(),
            vars: vars.to_vec(),
        });
        let status = i32::from(self.fail);
        Ok(output(status, String::new(), if self.fail { "hook failed" } else { "" }))
    }
}

/// Answers prompts from a script, declining once it runs out.
#[derive(Default)]
pub struct ScriptedConfirm {
    answers: Mutex<Vec<bool>>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedConfirm {
    pub fn new(answers: &[bool]) -> Self {
        let mut answers = answers.to_vec();
        answers.reverse();
        Self {
            answers: Mutex::new(answers),
            prompts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Confirm for ScriptedConfirm {
    async fn confirm(&self, prompt: &str) -> bool {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.answers.lock().unwrap().pop().unwrap_or(false)
    }
}

/// A temporary work tree with fake collaborators.
pub struct WorkTree {
    dir: TempDir,
    pub cluster: Arc<FakeCluster>,
    pub resolver: Arc<FakeResolver>,
    pub locks: Arc<MemoryLockStore>,
    pub hooks: Arc<RecordingExecutor>,
    pub confirm: Arc<dyn Confirm>,
    pub check_concurrency: usize,
}

impl WorkTree {
    pub fn new() -> Self {
        Self::with_cluster(FakeCluster::default())
    }

    pub fn with_cluster(cluster: FakeCluster) -> Self {
        Self {
            dir: TempDir::new().unwrap(),
            cluster: Arc::new(cluster),
            resolver: Arc::new(FakeResolver::default()),
            locks: Arc::new(MemoryLockStore::new()),
            hooks: Arc::new(RecordingExecutor::default()),
            confirm: Arc::new(AssumeYes),
            check_concurrency: 3,
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn env(&self, name: &str, config: &str) {
        let dir = self.root().join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("env.yaml"), config).unwrap();
    }

    pub fn service(&self, env: &str, name: &str) {
        let dir = self.root().join(env).join("services").join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("service.yaml"),
            format!("containers:\n  - example.com/{name}:1.0\nnodes:\n  - name: \"1\"\n"),
        )
        .unwrap();
    }

    /// Deploys exactly what the fake resolver generates for `service`.
    pub fn deploy_in_sync(&self, env: &str, service: &str) {
        self.cluster
            .deploy(&unit_name(env, service, "1"), &unit_content(service));
    }

    pub fn collaborators(&self) -> Collaborators {
        let locks: Arc<dyn LockStore> = self.locks.clone();
        Collaborators {
            resolver: self.resolver.clone(),
            clusters: Arc::new(StaticClusterProvider::new(self.cluster.clone())),
            locks,
            confirm: Arc::clone(&self.confirm),
            hooks: self.hooks.clone(),
            operator: Operator::new(OPERATOR),
        }
    }

    pub fn settings(&self) -> Settings {
        let mut settings = Settings::with_work_path(self.root());
        settings.check_concurrency = self.check_concurrency;
        settings.lock.backend = LockBackend::Memory;
        settings
    }

    pub fn registry(&self) -> WorkRegistry {
        WorkRegistry::new(self.settings(), self.collaborators())
    }

    /// Registry whose cluster is a given control handle.
    pub fn registry_with_control(&self, control: Arc<dyn ClusterControl>) -> WorkRegistry {
        let collaborators = Collaborators {
            clusters: Arc::new(StaticClusterProvider::new(control)),
            ..self.collaborators()
        };
        WorkRegistry::new(self.settings(), collaborators)
    }
}
