//! Early and late hooks around guarded actions.
//!
//! Hooks are shell commands configured per action in `env.yaml`. An early hook
//! runs before the action, a late hook after it on every exit path. The late
//! path is carried by a [`LateHook`] finalizer so that errors, panics and
//! cancellation cannot skip it.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use crate::config::HooksConfig;
use crate::error::{ClusterError, HookError, Result};
use crate::fleet::CommandOutput;
use crate::lock::Operator;

/// Shell used to run hook commands.
const HOOK_SHELL: &str = "sh";

/// Identifies the action a hook guards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookInfo {
    /// Command identifier (`env/check`, `service/update`).
    pub command: String,
    /// Action identifier, the key looked up in `env.yaml`.
    pub action: String,
    /// Service the action runs on, if any.
    pub service: Option<String>,
}

/// Hook stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookStage {
    /// Before the action.
    Early,
    /// After the action.
    Late,
}

/// Runs a hook command.
#[async_trait]
pub trait HookExecutor: Send + Sync {
    /// Runs `command` in `dir` with `vars` exported.
    async fn execute(&self, command: &str, dir: &Path, vars: &[(String, String)]) -> Result<CommandOutput>;
}

/// Executes hooks with `sh -c`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellExecutor;

/// Looks up and runs the hooks of one environment.
#[derive(Clone)]
pub struct HookRunner {
    env: String,
    dir: PathBuf,
    hooks: Arc<HooksConfig>,
    operator: Operator,
    executor: Arc<dyn HookExecutor>,
}

/// Finalizer running a late hook exactly once.
///
/// Call [`LateHook::finish`] on the normal path. If the value is dropped
/// unfinished, the late hook is spawned on the current runtime.
#[must_use = "dropping a LateHook runs the late hook immediately"]
pub struct LateHook {
    runner: Option<HookRunner>,
    info: HookInfo,
}

impl HookInfo {
    /// Creates hook info for an action whose command and action identifiers match.
    #[must_use]
    pub fn new(action: impl Into<String>) -> Self {
        let action = action.into();
        Self {
            command: action.clone(),
            action,
            service: None,
        }
    }

    /// Attaches the service the action runs on.
    #[must_use]
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }
}

impl HookStage {
    /// Stage name as exported to hooks.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Early => "early",
            Self::Late => "late",
        }
    }
}

#[async_trait]
impl HookExecutor for ShellExecutor {
    async fn execute(&self, command: &str, dir: &Path, vars: &[(String, String)]) -> Result<CommandOutput> {
        let output = Command::new(HOOK_SHELL)
            .arg("-c")
            .arg(command)
            .current_dir(dir)
            .envs(vars.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| ClusterError::spawn(HOOK_SHELL, e.to_string()))?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            status: output.status.code(),
        })
    }
}

impl HookRunner {
    /// Creates a runner for the environment rooted at `dir`.
    #[must_use]
    pub fn new(
        env: impl Into<String>,
        dir: impl Into<PathBuf>,
        hooks: HooksConfig,
        operator: Operator,
        executor: Arc<dyn HookExecutor>,
    ) -> Self {
        Self {
            env: env.into(),
            dir: dir.into(),
            hooks: Arc::new(hooks),
            operator,
            executor,
        }
    }

    /// Runs the early hook of `info`.
    ///
    /// A failure is logged and swallowed unless hooks are strict.
    ///
    /// # Errors
    ///
    /// Returns a [`HookError`] when the hook fails and `hooks.strict` is set.
    pub async fn run_early(&self, info: &HookInfo) -> Result<()> {
        match self.run(HookStage::Early, info).await {
            Ok(()) => Ok(()),
            Err(e) if self.hooks.strict => Err(e.into()),
            Err(e) => {
                warn!(env = %self.env, action = %info.action, "{e}");
                Ok(())
            }
        }
    }

    /// Runs the late hook of `info`. Failures are logged.
    pub async fn run_late(&self, info: &HookInfo) {
        if let Err(e) = self.run(HookStage::Late, info).await {
            error!(env = %self.env, action = %info.action, "{e}");
        }
    }

    /// Arms a finalizer that runs the late hook of `info`.
    pub fn late_guard(&self, info: HookInfo) -> LateHook {
        LateHook {
            runner: Some(self.clone()),
            info,
        }
    }

    async fn run(&self, stage: HookStage, info: &HookInfo) -> std::result::Result<(), HookError> {
        let configured = match stage {
            HookStage::Early => self.hooks.early_for(&info.action),
            HookStage::Late => self.hooks.late_for(&info.action),
        };
        let Some(command) = configured else {
            debug!(env = %self.env, action = %info.action, "No {} hook", stage.as_str());
            return Ok(());
        };

        info!(env = %self.env, action = %info.action, "Running {} hook", stage.as_str());
        let vars = self.variables(stage, info);

        let output = self
            .executor
            .execute(command, &self.dir, &vars)
            .await
            .map_err(|e| self.hook_error(stage, info, e.to_string()))?;

        if output.success() {
            Ok(())
        } else {
            let detail = output.stderr.trim();
            let status = output
                .status
                .map_or_else(|| String::from("killed by signal"), |s| format!("exit status {s}"));
            Err(self.hook_error(
                stage,
                info,
                if detail.is_empty() {
                    status
                } else {
                    format!("{status}: {detail}")
                },
            ))
        }
    }

    fn variables(&self, stage: HookStage, info: &HookInfo) -> Vec<(String, String)> {
        vec![
            (String::from("FLEETWORK_ENV"), self.env.clone()),
            (String::from("FLEETWORK_COMMAND"), info.command.clone()),
            (String::from("FLEETWORK_ACTION"), info.action.clone()),
            (
                String::from("FLEETWORK_SERVICE"),
                info.service.clone().unwrap_or_default(),
            ),
            (String::from("FLEETWORK_STAGE"), stage.as_str().to_string()),
            (String::from("FLEETWORK_OPERATOR"), self.operator.to_string()),
        ]
    }

    fn hook_error(&self, stage: HookStage, info: &HookInfo, message: String) -> HookError {
        HookError {
            env: self.env.clone(),
            action: info.action.clone(),
            stage: stage.as_str(),
            message,
        }
    }
}

impl LateHook {
    /// Runs the late hook and disarms the finalizer.
    pub async fn finish(mut self) {
        if let Some(runner) = self.runner.take() {
            runner.run_late(&self.info).await;
        }
    }
}

impl Drop for LateHook {
    fn drop(&mut self) {
        let Some(runner) = self.runner.take() else {
            return;
        };
        let info = self.info.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!(action = %info.action, "Action interrupted, running late hook");
                handle.spawn(async move { runner.run_late(&info).await });
            }
            Err(_) => error!(action = %info.action, "No runtime left, late hook skipped"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::work::testing::RecordingExecutor;
    use std::collections::BTreeMap;
    use std::time::Duration;
    use tempfile::TempDir;

    fn hooks(strict: bool) -> HooksConfig {
        HooksConfig {
            strict,
            early: BTreeMap::from([(String::from("env/check"), String::from("notify start"))]),
            late: BTreeMap::from([(String::from("env/check"), String::from("notify end"))]),
        }
    }

    fn runner(config: HooksConfig, executor: Arc<dyn HookExecutor>) -> HookRunner {
        HookRunner::new("staging", "/tmp", config, Operator::new("alice@ops"), executor)
    }

    #[tokio::test]
    async fn test_unconfigured_hook_is_a_noop() {
        let executor = Arc::new(RecordingExecutor::default());
        let runner = runner(hooks(false), executor.clone());

        runner.run_early(&HookInfo::new("env/status")).await.unwrap();
        runner.run_late(&HookInfo::new("env/status")).await;
        assert!(executor.calls().is_empty());
    }

    #[tokio::test]
    async fn test_variables_are_exported() {
        let executor = Arc::new(RecordingExecutor::default());
        let runner = runner(hooks(false), executor.clone());

        runner
            .run_early(&HookInfo::new("env/check").with_service("web"))
            .await
            .unwrap();

        let calls = executor.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].command, "notify start");
        assert_eq!(calls[0].var("FLEETWORK_STAGE"), Some("early"));
        assert_eq!(calls[0].var("FLEETWORK_SERVICE"), Some("web"));
        assert_eq!(calls[0].var("FLEETWORK_OPERATOR"), Some("alice@ops"));
    }

    #[tokio::test]
    async fn test_failing_early_hook_aborts_only_when_strict() {
        let executor = Arc::new(RecordingExecutor::failing());
        let info = HookInfo::new("env/check");

        assert!(runner(hooks(false), executor.clone()).run_early(&info).await.is_ok());
        let err = runner(hooks(true), executor).run_early(&info).await.unwrap_err();
        assert!(err.to_string().contains("early hook for env/check"));
    }

    #[tokio::test]
    async fn test_late_guard_runs_once_when_finished() {
        let executor = Arc::new(RecordingExecutor::default());
        let runner = runner(hooks(false), executor.clone());

        runner.late_guard(HookInfo::new("env/check")).finish().await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(executor.commands(), vec!["notify end"]);
    }

    #[tokio::test]
    async fn test_late_guard_runs_when_dropped() {
        let executor = Arc::new(RecordingExecutor::default());
        let runner = runner(hooks(false), executor.clone());

        fn blow_up() {
            panic!("action blew up");
        }

        let task = tokio::spawn(async move {
            let _late = runner.late_guard(HookInfo::new("env/check"));
            blow_up();
        });
        assert!(task.await.is_err());
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(executor.commands(), vec!["notify end"]);
    }

    #[tokio::test]
    async fn test_shell_executor_runs_in_env_dir() {
        let dir = TempDir::new().unwrap();
        let vars = vec![(String::from("FLEETWORK_ACTION"), String::from("env/check"))];

        let output = ShellExecutor
            .execute("echo \"$FLEETWORK_ACTION\" > hook.out", dir.path(), &vars)
            .await
            .unwrap();
        assert!(output.success());
        let written = std::fs::read_to_string(dir.path().join("hook.out")).unwrap();
        assert_eq!(written.trim(), "env/check");

        let output = ShellExecutor.execute("exit 4", dir.path(), &[]).await.unwrap();
        assert_eq!(output.status, Some(4));
    }
}
