//! Plan executor for pushing unit changes to the cluster.
//!
//! The executor applies one action at a time. Deciding whether an action may
//! run (lock checks, confirmation) is left to the caller, which records each
//! outcome in an [`UpdateReport`].

use serde::Serialize;
use std::path::Path;
use tracing::{debug, info};

use crate::error::Result;
use crate::fleet::ClusterControl;

use super::plan::{ActionType, UnitAction};

/// Executor for update plans.
pub struct PlanExecutor<'a> {
    /// Control interface of the environment.
    control: &'a dyn ClusterControl,
    /// Directory holding the generated unit files.
    units_dir: &'a Path,
}

/// Outcome of a single action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "lowercase")]
pub enum ActionStatus {
    /// The action was applied.
    Applied,
    /// The operator declined the action.
    Declined,
    /// The control interface rejected the action.
    Failed(String),
}

/// Result of executing a single action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionResult {
    /// Action that was considered.
    pub action: UnitAction,
    /// What happened.
    pub status: ActionStatus,
}

/// Result of a service update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpdateReport {
    /// Environment name.
    pub env: String,
    /// Service name.
    pub service: String,
    /// Whether the update took the service lock for its own duration.
    pub acquired_lock: bool,
    /// Individual action results, in execution order.
    pub results: Vec<ActionResult>,
}

impl<'a> PlanExecutor<'a> {
    /// Creates a new plan executor.
    #[must_use]
    pub const fn new(control: &'a dyn ClusterControl, units_dir: &'a Path) -> Self {
        Self { control, units_dir }
    }

    /// Applies a single action.
    ///
    /// # Errors
    ///
    /// Returns an error if the control tool cannot run or rejects a command.
    pub async fn execute_action(&self, action: &UnitAction) -> Result<()> {
        match action.action_type {
            ActionType::Destroy => self.destroy(&action.unit).await,
            ActionType::Push => {
                if action.exists_remotely {
                    self.destroy(&action.unit).await?;
                }
                let path = self.units_dir.join(&action.unit);
                self.run(vec![String::from("start"), path.display().to_string()])
                    .await?;
                info!(unit = %action.unit, "Started unit");
                Ok(())
            }
        }
    }

    async fn destroy(&self, unit: &str) -> Result<()> {
        self.run(vec![String::from("destroy"), unit.to_string()]).await?;
        info!(unit, "Destroyed unit");
        Ok(())
    }

    async fn run(&self, args: Vec<String>) -> Result<()> {
        debug!("Running control command: {}", args.join(" "));
        self.control.run_command(&args).await?.into_result(&args)?;
        Ok(())
    }
}

impl UpdateReport {
    /// Creates an empty report.
    #[must_use]
    pub fn new(env: &str, service: &str) -> Self {
        Self {
            env: env.to_string(),
            service: service.to_string(),
            ..Self::default()
        }
    }

    /// Records the outcome of an action.
    pub fn record(&mut self, action: UnitAction, status: ActionStatus) {
        self.results.push(ActionResult { action, status });
    }

    /// Number of applied actions.
    #[must_use]
    pub fn applied(&self) -> usize {
        self.count(|s| matches!(s, ActionStatus::Applied))
    }

    /// Number of failed actions.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, ActionStatus::Failed(_)))
    }

    /// Number of declined actions.
    #[must_use]
    pub fn declined(&self) -> usize {
        self.count(|s| matches!(s, ActionStatus::Declined))
    }

    /// Returns true if no action failed.
    #[must_use]
    pub fn all_successful(&self) -> bool {
        self.failed() == 0
    }

    fn count(&self, predicate: impl Fn(&ActionStatus) -> bool) -> usize {
        self.results.iter().filter(|r| predicate(&r.status)).count()
    }
}

impl std::fmt::Display for UpdateReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Updated {}/{}: {} applied, {} failed, {} declined",
            self.env,
            self.service,
            self.applied(),
            self.failed(),
            self.declined()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet::{CommandOutput, MockClusterControl};
    use mockall::Sequence;

    fn ok() -> CommandOutput {
        CommandOutput {
            status: Some(0),
            ..CommandOutput::default()
        }
    }

    fn is_command(args: &[String], expected: &[&str]) -> bool {
        args.iter().map(String::as_str).eq(expected.iter().copied())
    }

    fn push(unit: &str, exists_remotely: bool) -> UnitAction {
        UnitAction {
            action_type: ActionType::Push,
            unit: unit.to_string(),
            exists_remotely,
            reason: String::from("test"),
        }
    }

    #[tokio::test]
    async fn test_push_existing_unit_destroys_then_starts() {
        let mut control = MockClusterControl::new();
        let mut seq = Sequence::new();
        control
            .expect_run_command()
            .withf(|args| is_command(args, &["destroy", "staging_web_1.service"]))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(ok()));
        control
            .expect_run_command()
            .withf(|args| {
                is_command(args, &["start", "/work/staging/units/web/staging_web_1.service"])
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(ok()));

        let dir = Path::new("/work/staging/units/web");
        let executor = PlanExecutor::new(&control, dir);
        executor
            .execute_action(&push("staging_web_1.service", true))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_push_new_unit_only_starts() {
        let mut control = MockClusterControl::new();
        control
            .expect_run_command()
            .withf(|args| args.first().is_some_and(|a| a == "start"))
            .times(1)
            .returning(|_| Ok(ok()));

        let executor = PlanExecutor::new(&control, Path::new("units"));
        executor
            .execute_action(&push("staging_web_1.service", false))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_rejected_command_is_an_error() {
        let mut control = MockClusterControl::new();
        control.expect_run_command().returning(|_| {
            Ok(CommandOutput {
                stdout: String::new(),
                stderr: String::from("unit not found"),
                status: Some(1),
            })
        });

        let executor = PlanExecutor::new(&control, Path::new("units"));
        let err = executor
            .execute_action(&push("staging_web_1.service", false))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unit not found"));
    }

    #[test]
    fn test_report_counts() {
        let mut report = UpdateReport::new("staging", "web");
        report.record(push("a", false), ActionStatus::Applied);
        report.record(push("b", false), ActionStatus::Failed(String::from("boom")));
        report.record(push("c", false), ActionStatus::Declined);

        assert_eq!(report.applied(), 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.declined(), 1);
        assert!(!report.all_successful());
    }
}
