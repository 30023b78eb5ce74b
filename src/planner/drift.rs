//! Drift engine for comparing generated units against the cluster.
//!
//! A unit drifts when it is missing from the cluster, runs different content,
//! is not active, or runs on the cluster without being generated locally.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::config::UnitHasher;
use crate::error::DriftError;
use crate::fleet::UnitDescriptor;
use crate::manifest::UnitDefinition;

/// Engine for computing drift between local and remote units.
#[derive(Debug, Default)]
pub struct DriftEngine {
    /// Unit content hasher.
    hasher: UnitHasher,
}

/// Kind of drift for one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DriftKind {
    /// Generated locally, unknown to the cluster.
    Missing,
    /// The cluster runs different content.
    Changed,
    /// Known to the cluster but not active.
    Inactive,
    /// On the cluster but no longer generated locally.
    Orphaned,
}

/// Drift of a single unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitDrift {
    /// Unit name.
    pub unit: String,
    /// Kind of drift.
    pub kind: DriftKind,
    /// Hash of the local definition.
    pub local_hash: Option<String>,
    /// Hash of the content the cluster runs.
    pub remote_hash: Option<String>,
}

/// Drift of a whole service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DriftReport {
    /// Environment name.
    pub env: String,
    /// Service name.
    pub service: String,
    /// Drifted units, local units first then orphans.
    pub drifts: Vec<UnitDrift>,
    /// Units in sync.
    pub unchanged: Vec<String>,
}

impl DriftEngine {
    /// Creates a new drift engine.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            hasher: UnitHasher::new(),
        }
    }

    /// Computes drift for one service.
    ///
    /// `remote` must be restricted to the service's units; `remote_content`
    /// maps unit names to the content the cluster holds for them.
    #[must_use]
    pub fn compute(
        &self,
        env: &str,
        service: &str,
        local: &[UnitDefinition],
        remote: &[UnitDescriptor],
        remote_content: &HashMap<String, String>,
    ) -> DriftReport {
        let mut report = DriftReport {
            env: env.to_string(),
            service: service.to_string(),
            ..DriftReport::default()
        };

        let remote_by_name: HashMap<&str, &UnitDescriptor> =
            remote.iter().map(|u| (u.name.as_str(), u)).collect();

        for unit in local {
            let local_hash = self.hasher.hash_content(&unit.content);
            let remote_hash = remote_content
                .get(&unit.name)
                .map(|content| self.hasher.hash_content(content));

            let kind = match remote_by_name.get(unit.name.as_str()) {
                None => Some(DriftKind::Missing),
                Some(_) if remote_hash.as_ref().is_some_and(|h| *h != local_hash) => {
                    Some(DriftKind::Changed)
                }
                Some(descriptor) if !descriptor.is_active() => Some(DriftKind::Inactive),
                Some(_) => None,
            };

            match kind {
                Some(kind) => {
                    debug!(env, service, unit = %unit.name, "Unit drift: {kind}");
                    report.drifts.push(UnitDrift {
                        unit: unit.name.clone(),
                        kind,
                        local_hash: Some(local_hash),
                        remote_hash,
                    });
                }
                None => report.unchanged.push(unit.name.clone()),
            }
        }

        let local_names: HashSet<&str> = local.iter().map(|u| u.name.as_str()).collect();
        for descriptor in remote {
            if !local_names.contains(descriptor.name.as_str()) {
                debug!(env, service, unit = %descriptor.name, "Found orphaned unit");
                report.drifts.push(UnitDrift {
                    unit: descriptor.name.clone(),
                    kind: DriftKind::Orphaned,
                    local_hash: None,
                    remote_hash: remote_content
                        .get(&descriptor.name)
                        .map(|content| self.hasher.hash_content(content)),
                });
            }
        }

        report
    }
}

impl DriftReport {
    /// Returns true if any unit drifted.
    #[must_use]
    pub fn has_drift(&self) -> bool {
        !self.drifts.is_empty()
    }

    /// Number of drifted units.
    #[must_use]
    pub fn drift_count(&self) -> usize {
        self.drifts.len()
    }

    /// One `unit: kind` entry per drifted unit.
    #[must_use]
    pub fn summary(&self) -> String {
        self.drifts
            .iter()
            .map(|d| format!("{}: {}", d.unit, d.kind))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Converts the report into an error when anything drifted.
    ///
    /// # Errors
    ///
    /// Returns a [`DriftError`] describing every drifted unit.
    pub fn into_result(self) -> Result<Self, DriftError> {
        if self.has_drift() {
            Err(DriftError {
                summary: self.summary(),
                env: self.env,
                service: self.service,
            })
        } else {
            Ok(self)
        }
    }
}

impl std::fmt::Display for DriftKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            Self::Missing => "missing",
            Self::Changed => "changed",
            Self::Inactive => "inactive",
            Self::Orphaned => "orphaned",
        };
        write!(f, "{kind}")
    }
}

impl std::fmt::Display for DriftReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.has_drift() {
            write!(
                f,
                "{}/{}: {} drifted, {} in sync ({})",
                self.env,
                self.service,
                self.drifts.len(),
                self.unchanged.len(),
                self.summary()
            )
        } else {
            write!(f, "{}/{}: {} units in sync", self.env, self.service, self.unchanged.len())
        }
    }
}
