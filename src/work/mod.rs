//! Environment and service lifecycle.
//!
//! This module ties the collaborators together:
//! - [`WorkRegistry`] discovers environments under the work root
//! - [`Env`] generates and checks its services, fanning checks out over a
//!   fixed-width worker pool
//! - [`Service`] generates, checks, locks and updates one unit set
//! - [`HookRunner`] runs the early and late hooks around guarded actions

mod confirm;
mod env;
mod hooks;
mod pool;
mod registry;
mod report;
mod service;

#[cfg(test)]
pub(crate) mod testing;

pub use confirm::{AssumeYes, Confirm, StdinConfirm};
pub use env::Env;
pub use hooks::{HookExecutor, HookInfo, HookRunner, HookStage, LateHook, ShellExecutor};
pub use pool::dispatch;
pub use registry::{Collaborators, WorkRegistry, ENV_CONFIG_FILE};
pub use report::{CheckOutcome, CheckReport, GenerateReport, ServiceCheck, ServiceFailure, ServiceUnits};
pub use service::{Service, UnitStatus, UPDATE_LOCK_MESSAGE};
