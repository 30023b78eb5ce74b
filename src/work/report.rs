//! Reports returned by bulk environment actions.
//!
//! Bulk actions log and carry on when one service fails; these reports are
//! how the failures reach the caller.

use serde::Serialize;

/// Result of generating every service of an environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GenerateReport {
    /// Environment name.
    pub env: String,
    /// Services generated successfully, with their unit counts.
    pub generated: Vec<ServiceUnits>,
    /// Services that failed to generate.
    pub failures: Vec<ServiceFailure>,
}

/// Unit count of a generated service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceUnits {
    /// Service name.
    pub service: String,
    /// Number of generated units.
    pub units: usize,
}

/// A service-level failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceFailure {
    /// Service name.
    pub service: String,
    /// Error description.
    pub error: String,
}

/// Result of checking every service of an environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CheckReport {
    /// Environment name.
    pub env: String,
    /// One entry per service, in listing order.
    pub services: Vec<ServiceCheck>,
}

/// Check outcome for one service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceCheck {
    /// Service name.
    pub service: String,
    /// What the check found.
    pub outcome: CheckOutcome,
}

/// What a service check found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum CheckOutcome {
    /// Every unit matches the cluster.
    InSync {
        /// Number of units checked.
        units: usize,
    },
    /// Some units drifted.
    Drifted {
        /// One entry per drifted unit.
        summary: String,
    },
    /// The check itself failed.
    Failed {
        /// Error description.
        error: String,
    },
}

impl GenerateReport {
    /// Creates an empty report.
    #[must_use]
    pub fn new(env: &str) -> Self {
        Self {
            env: env.to_string(),
            ..Self::default()
        }
    }

    /// Total number of generated units.
    #[must_use]
    pub fn unit_count(&self) -> usize {
        self.generated.iter().map(|s| s.units).sum()
    }

    /// Returns true if every service generated.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

impl CheckReport {
    /// Creates an empty report.
    #[must_use]
    pub fn new(env: &str) -> Self {
        Self {
            env: env.to_string(),
            services: Vec::new(),
        }
    }

    /// Services that drifted.
    pub fn drifted(&self) -> impl Iterator<Item = &ServiceCheck> {
        self.services
            .iter()
            .filter(|s| matches!(s.outcome, CheckOutcome::Drifted { .. }))
    }

    /// Services whose check failed.
    pub fn failed(&self) -> impl Iterator<Item = &ServiceCheck> {
        self.services
            .iter()
            .filter(|s| matches!(s.outcome, CheckOutcome::Failed { .. }))
    }

    /// Returns true if every service is in sync.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.services
            .iter()
            .all(|s| matches!(s.outcome, CheckOutcome::InSync { .. }))
    }
}

impl std::fmt::Display for CheckReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Checked {} services in {}: {} drifted, {} failed",
            self.services.len(),
            self.env,
            self.drifted().count(),
            self.failed().count()
        )
    }
}

impl std::fmt::Display for GenerateReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Generated {} units for {} services in {} ({} failed)",
            self.unit_count(),
            self.generated.len(),
            self.env,
            self.failures.len()
        )
    }
}
