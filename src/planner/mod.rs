//! Planning module for service updates.
//!
//! This module compares generated units against the cluster and turns the
//! resulting drift into update plans that can be applied unit by unit.

mod drift;
mod plan;
mod executor;

pub use drift::{DriftEngine, DriftKind, DriftReport, UnitDrift};
pub use plan::{ActionType, UnitAction, UpdatePlan};
pub use executor::{ActionResult, ActionStatus, PlanExecutor, UpdateReport};
