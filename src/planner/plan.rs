//! Update plan types and construction.
//!
//! An update plan lists the unit actions needed to bring the cluster in line
//! with the generated units of one service. Orphan removals come first, then
//! pushes in unit name order.

use serde::Serialize;
use std::collections::HashSet;

use crate::fleet::UnitDescriptor;
use crate::manifest::UnitDefinition;

use super::drift::{DriftKind, DriftReport};

/// A complete update plan for one service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpdatePlan {
    /// Environment name.
    pub env: String,
    /// Service name.
    pub service: String,
    /// Planned actions in execution order.
    pub actions: Vec<UnitAction>,
}

/// A single planned action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitAction {
    /// Action type.
    pub action_type: ActionType,
    /// Unit name.
    pub unit: String,
    /// Whether the cluster already knows the unit (a push destroys it first).
    pub exists_remotely: bool,
    /// Reason for this action.
    pub reason: String,
}

/// Types of unit actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    /// (Re)submit and start the local unit file.
    Push,
    /// Remove the unit from the cluster.
    Destroy,
}

impl UpdatePlan {
    /// Plans a push of every generated unit and the removal of orphans.
    #[must_use]
    pub fn all(env: &str, service: &str, local: &[UnitDefinition], remote: &[UnitDescriptor]) -> Self {
        let remote_names: HashSet<&str> = remote.iter().map(|u| u.name.as_str()).collect();
        let local_names: HashSet<&str> = local.iter().map(|u| u.name.as_str()).collect();

        let mut actions: Vec<UnitAction> = remote
            .iter()
            .filter(|u| !local_names.contains(u.name.as_str()))
            .map(|u| UnitAction::destroy(&u.name, "Unit is no longer generated"))
            .collect();

        let mut pushes: Vec<UnitAction> = local
            .iter()
            .map(|u| UnitAction {
                action_type: ActionType::Push,
                unit: u.name.clone(),
                exists_remotely: remote_names.contains(u.name.as_str()),
                reason: String::from("Full update requested"),
            })
            .collect();
        pushes.sort_by(|a, b| a.unit.cmp(&b.unit));
        actions.extend(pushes);

        Self {
            env: env.to_string(),
            service: service.to_string(),
            actions,
        }
    }

    /// Plans the actions fixing the drifted units of a report.
    #[must_use]
    pub fn from_drift(report: &DriftReport) -> Self {
        let mut actions: Vec<UnitAction> = report
            .drifts
            .iter()
            .filter(|d| d.kind == DriftKind::Orphaned)
            .map(|d| UnitAction::destroy(&d.unit, "Unit is no longer generated"))
            .collect();

        let mut pushes: Vec<UnitAction> = report
            .drifts
            .iter()
            .filter(|d| d.kind != DriftKind::Orphaned)
            .map(|d| UnitAction {
                action_type: ActionType::Push,
                unit: d.unit.clone(),
                exists_remotely: d.kind != DriftKind::Missing,
                reason: match d.kind {
                    DriftKind::Missing => String::from("Unit is not on the cluster"),
                    DriftKind::Changed => String::from("Unit content changed"),
                    _ => String::from("Unit is not active"),
                },
            })
            .collect();
        pushes.sort_by(|a, b| a.unit.cmp(&b.unit));
        actions.extend(pushes);

        Self {
            env: report.env.clone(),
            service: report.service.clone(),
            actions,
        }
    }

    /// Returns true if there is nothing to do.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Returns the number of actions.
    #[must_use]
    pub fn action_count(&self) -> usize {
        self.actions.len()
    }
}

impl UnitAction {
    fn destroy(unit: &str, reason: &str) -> Self {
        Self {
            action_type: ActionType::Destroy,
            unit: unit.to_string(),
            exists_remotely: true,
            reason: reason.to_string(),
        }
    }
}

impl std::fmt::Display for UpdatePlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Update plan for {}/{} ({} actions):", self.env, self.service, self.actions.len())?;
        for action in &self.actions {
            writeln!(f, "  {action}")?;
        }
        Ok(())
    }
}

impl std::fmt::Display for UnitAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} ({})", self.action_type, self.unit, self.reason)
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let action = match self {
            Self::Push => "push",
            Self::Destroy => "destroy",
        };
        write!(f, "{action}")
    }
}
