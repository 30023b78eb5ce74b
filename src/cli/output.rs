//! Output formatting for CLI commands.
//!
//! Every formatter returns a string; `main` decides where it goes.

use colored::Colorize;
use serde::Serialize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::config::format_duration;
use crate::fleet::UnitDescriptor;
use crate::lock::LockRecord;
use crate::planner::{ActionStatus, ActionType, DriftKind, DriftReport, UpdateReport};
use crate::work::{CheckOutcome, CheckReport, GenerateReport, UnitStatus};

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Environment listing entry.
#[derive(Debug, Clone, Serialize)]
pub struct EnvSummary {
    /// Environment name.
    pub name: String,
    /// Service names.
    pub services: Vec<String>,
}

#[derive(Tabled)]
struct UnitRow {
    #[tabled(rename = "Unit")]
    unit: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Sub")]
    sub: String,
    #[tabled(rename = "Host")]
    host: String,
}

#[derive(Tabled)]
struct ServiceUnitRow {
    #[tabled(rename = "Unit")]
    unit: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Sub")]
    sub: String,
    #[tabled(rename = "Host")]
    host: String,
    #[tabled(rename = "Generated")]
    generated: String,
}

#[derive(Tabled)]
struct DriftRow {
    #[tabled(rename = "Unit")]
    unit: String,
    #[tabled(rename = "Drift")]
    kind: String,
    #[tabled(rename = "Local")]
    local: String,
    #[tabled(rename = "Remote")]
    remote: String,
}

#[derive(Tabled)]
struct ActionRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Unit")]
    unit: String,
    #[tabled(rename = "Result")]
    result: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    fn to_json<T: Serialize + ?Sized>(value: &T) -> String {
        serde_json::to_string_pretty(value).unwrap_or_default()
    }

    /// Formats the environment listing.
    #[must_use]
    pub fn format_envs(&self, envs: &[EnvSummary]) -> String {
        match self.format {
            OutputFormat::Json => Self::to_json(envs),
            OutputFormat::Text => {
                if envs.is_empty() {
                    return String::from("No environments found.\n");
                }
                let mut output = String::new();
                for env in envs {
                    let _ = writeln!(output, "{}", env.name.bold());
                    if env.services.is_empty() {
                        let _ = writeln!(output, "   {}", "(no services)".dimmed());
                    }
                    for service in &env.services {
                        let _ = writeln!(output, "   {service}");
                    }
                }
                output
            }
        }
    }

    /// Formats an environment check report.
    #[must_use]
    pub fn format_check(&self, report: &CheckReport) -> String {
        match self.format {
            OutputFormat::Json => Self::to_json(report),
            OutputFormat::Text => {
                let mut output = String::new();
                for check in &report.services {
                    match &check.outcome {
                        CheckOutcome::InSync { units } => {
                            let _ = writeln!(
                                output,
                                "{} {}: {units} units in sync",
                                "✓".green(),
                                check.service
                            );
                        }
                        CheckOutcome::Drifted { summary } => {
                            let _ = writeln!(output, "{} {}: {summary}", "⚠".yellow(), check.service);
                        }
                        CheckOutcome::Failed { error } => {
                            let _ = writeln!(output, "{} {}: {error}", "✗".red(), check.service);
                        }
                    }
                }

                let drifted = report.drifted().count();
                let failed = report.failed().count();
                if report.is_clean() {
                    let _ = writeln!(
                        output,
                        "\n{} {}: {} services in sync",
                        "✓".green(),
                        report.env,
                        report.services.len()
                    );
                } else {
                    let _ = writeln!(
                        output,
                        "\n{}: {} checked, {} drifted, {} failed",
                        report.env,
                        report.services.len(),
                        drifted.to_string().yellow(),
                        failed.to_string().red()
                    );
                }
                output
            }
        }
    }

    /// Formats an environment generation report.
    #[must_use]
    pub fn format_generate(&self, report: &GenerateReport) -> String {
        match self.format {
            OutputFormat::Json => Self::to_json(report),
            OutputFormat::Text => {
                let mut output = String::new();
                for generated in &report.generated {
                    let _ = writeln!(
                        output,
                        "{} {}: {} units",
                        "✓".green(),
                        generated.service,
                        generated.units
                    );
                }
                for failure in &report.failures {
                    let _ = writeln!(output, "{} {}: {}", "✗".red(), failure.service, failure.error);
                }
                let _ = writeln!(
                    output,
                    "\nGenerated {} units for {} services",
                    report.unit_count(),
                    report.generated.len()
                );
                output
            }
        }
    }

    /// Formats the units of an environment as listed by the cluster.
    #[must_use]
    pub fn format_env_status(&self, env: &str, units: &[UnitDescriptor]) -> String {
        match self.format {
            OutputFormat::Json => Self::to_json(units),
            OutputFormat::Text => {
                let mut output = format!("\nEnvironment: {env}\n\n");
                if units.is_empty() {
                    output.push_str("   No units on the cluster.\n");
                    return output;
                }

                let rows: Vec<UnitRow> = units
                    .iter()
                    .map(|u| UnitRow {
                        unit: u.name.clone(),
                        state: Self::format_state(&u.active.to_string()),
                        sub: u.sub.clone(),
                        host: u.host().to_string(),
                    })
                    .collect();
                output.push_str(&Table::new(rows).to_string());
                output.push('\n');

                let active = units.iter().filter(|u| u.is_active()).count();
                let _ = writeln!(output, "\n{active}/{} units active", units.len());
                output
            }
        }
    }

    /// Formats the live state of a service's units.
    #[must_use]
    pub fn format_service_status(&self, service: &str, units: &[UnitStatus]) -> String {
        match self.format {
            OutputFormat::Json => Self::to_json(units),
            OutputFormat::Text => {
                let mut output = format!("\nService: {service}\n\n");
                if units.is_empty() {
                    output.push_str("   No units generated or running.\n");
                    return output;
                }

                let rows: Vec<ServiceUnitRow> = units
                    .iter()
                    .map(|u| ServiceUnitRow {
                        unit: u.unit.clone(),
                        state: Self::format_state(&u.state),
                        sub: u.sub.clone(),
                        host: u.host.clone(),
                        generated: if u.generated { "yes".to_string() } else { "no".red().to_string() },
                    })
                    .collect();
                output.push_str(&Table::new(rows).to_string());
                output.push('\n');
                output
            }
        }
    }

    /// Formats a service drift report.
    #[must_use]
    pub fn format_drift(&self, report: &DriftReport) -> String {
        match self.format {
            OutputFormat::Json => Self::to_json(report),
            OutputFormat::Text => {
                if !report.has_drift() {
                    return format!(
                        "{} {}/{}: {} units in sync\n",
                        "✓".green(),
                        report.env,
                        report.service,
                        report.unchanged.len()
                    );
                }

                let mut output = format!(
                    "{} {}/{}: drift detected\n\n",
                    "⚠".yellow(),
                    report.env,
                    report.service
                );
                let rows: Vec<DriftRow> = report
                    .drifts
                    .iter()
                    .map(|d| DriftRow {
                        unit: d.unit.clone(),
                        kind: Self::format_drift_kind(d.kind),
                        local: Self::short(d.local_hash.as_deref()),
                        remote: Self::short(d.remote_hash.as_deref()),
                    })
                    .collect();
                output.push_str(&Table::new(rows).to_string());
                output.push('\n');

                let _ = writeln!(
                    output,
                    "\n{} drifted, {} in sync",
                    report.drift_count(),
                    report.unchanged.len()
                );
                output
            }
        }
    }

    /// Formats a lock record, or its absence.
    #[must_use]
    pub fn format_lock(&self, key: &str, lock: Option<&LockRecord>) -> String {
        match self.format {
            OutputFormat::Json => Self::to_json(&lock),
            OutputFormat::Text => match lock {
                None => format!("{} {key} is not locked\n", "✓".green()),
                Some(record) => {
                    let mut output = format!("{} {key} locked by {}\n", "⚠".yellow(), record.owner().bold());
                    if !record.message().is_empty() {
                        let _ = writeln!(output, "   Message: {}", record.message());
                    }
                    let _ = writeln!(
                        output,
                        "   Acquired: {}",
                        record.acquired().format("%Y-%m-%d %H:%M:%S UTC")
                    );
                    let _ = writeln!(
                        output,
                        "   Expires: {} (in {})",
                        record.expires_at().format("%Y-%m-%d %H:%M:%S UTC"),
                        format_duration(Self::whole_seconds(record.remaining()))
                    );
                    let _ = writeln!(output, "   Lock ID: {}", record.lock_id());
                    output
                }
            },
        }
    }

    /// Formats the result of a successful lock or unlock.
    #[must_use]
    pub fn format_lock_change(&self, record: &LockRecord, locked: bool) -> String {
        match self.format {
            OutputFormat::Json => Self::to_json(record),
            OutputFormat::Text => {
                if locked {
                    format!(
                        "{} Locked {} until {}\n",
                        "✓".green(),
                        record.key(),
                        record.expires_at().format("%Y-%m-%d %H:%M:%S UTC")
                    )
                } else {
                    format!("{} Unlocked {}\n", "✓".green(), record.key())
                }
            }
        }
    }

    /// Formats the number of units generated for one service.
    #[must_use]
    pub fn format_generated(&self, service: &str, units: usize) -> String {
        match self.format {
            OutputFormat::Json => Self::to_json(&serde_json::json!({ "service": service, "units": units })),
            OutputFormat::Text => format!("{} {service}: {units} units\n", "✓".green()),
        }
    }

    /// Formats a service update report.
    #[must_use]
    pub fn format_update(&self, report: &UpdateReport) -> String {
        match self.format {
            OutputFormat::Json => Self::to_json(report),
            OutputFormat::Text => {
                if report.results.is_empty() {
                    return format!(
                        "{} {}/{}: nothing to update\n",
                        "✓".green(),
                        report.env,
                        report.service
                    );
                }

                let rows: Vec<ActionRow> = report
                    .results
                    .iter()
                    .enumerate()
                    .map(|(i, r)| ActionRow {
                        index: i + 1,
                        action: Self::format_action_type(r.action.action_type),
                        unit: r.action.unit.clone(),
                        result: Self::format_action_status(&r.status),
                    })
                    .collect();

                let mut output = Table::new(rows).to_string();
                output.push('\n');

                let status = if report.all_successful() {
                    format!("{} Update complete", "✓".green())
                } else {
                    format!("{} Update incomplete", "✗".red())
                };
                let _ = writeln!(
                    output,
                    "\n{status}: {} applied, {} declined, {} failed",
                    report.applied().to_string().green(),
                    report.declined(),
                    report.failed().to_string().red()
                );
                output
            }
        }
    }

    fn format_action_type(action_type: ActionType) -> String {
        match action_type {
            ActionType::Push => "+push".green().to_string(),
            ActionType::Destroy => "-destroy".red().to_string(),
        }
    }

    fn format_action_status(status: &ActionStatus) -> String {
        match status {
            ActionStatus::Applied => "applied".green().to_string(),
            ActionStatus::Declined => "declined".dimmed().to_string(),
            ActionStatus::Failed(reason) => format!("{}: {}", "failed".red(), Self::truncate(reason, 40)),
        }
    }

    fn format_drift_kind(kind: DriftKind) -> String {
        match kind {
            DriftKind::Missing => "missing".yellow().to_string(),
            DriftKind::Changed => "changed".yellow().to_string(),
            DriftKind::Inactive => "inactive".red().to_string(),
            DriftKind::Orphaned => "orphaned".dimmed().to_string(),
        }
    }

    fn format_state(state: &str) -> String {
        match state {
            "active" => state.green().to_string(),
            "activating" | "deactivating" => state.yellow().to_string(),
            "failed" | "inactive" | "not-found" => state.red().to_string(),
            _ => state.dimmed().to_string(),
        }
    }

    fn short(hash: Option<&str>) -> String {
        hash.map_or_else(|| String::from("-"), |h| h.chars().take(12).collect())
    }

    fn whole_seconds(duration: std::time::Duration) -> std::time::Duration {
        std::time::Duration::from_secs(duration.as_secs())
    }

    /// Truncates a string to a maximum number of characters.
    fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
            format!("{head}...")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::{UnitAction, UnitDrift};
    use crate::work::ServiceCheck;
    use std::time::Duration;

    fn text() -> OutputFormatter {
        colored::control::set_override(false);
        OutputFormatter::new(OutputFormat::Text)
    }

    #[test]
    fn test_check_report_text() {
        let report = CheckReport {
            env: String::from("staging"),
            services: vec![
                ServiceCheck {
                    service: String::from("a"),
                    outcome: CheckOutcome::InSync { units: 2 },
                },
                ServiceCheck {
                    service: String::from("b"),
                    outcome: CheckOutcome::Drifted {
                        summary: String::from("staging_b_1.service: changed"),
                    },
                },
            ],
        };

        let output = text().format_check(&report);
        assert!(output.contains("✓ a: 2 units in sync"));
        assert!(output.contains("⚠ b: staging_b_1.service: changed"));
        assert!(output.contains("2 checked, 1 drifted, 0 failed"));
    }

    #[test]
    fn test_check_report_json() {
        let report = CheckReport {
            env: String::from("staging"),
            services: vec![ServiceCheck {
                service: String::from("a"),
                outcome: CheckOutcome::Failed {
                    error: String::from("boom"),
                },
            }],
        };

        let output = OutputFormatter::new(OutputFormat::Json).format_check(&report);
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["services"][0]["outcome"]["status"], "failed");
        assert_eq!(value["services"][0]["outcome"]["error"], "boom");
    }

    #[test]
    fn test_drift_table() {
        let report = DriftReport {
            env: String::from("staging"),
            service: String::from("web"),
            drifts: vec![UnitDrift {
                unit: String::from("staging_web_1.service"),
                kind: DriftKind::Missing,
                local_hash: Some("0123456789abcdef".repeat(4)),
                remote_hash: None,
            }],
            unchanged: vec![String::from("staging_web_2.service")],
        };

        let output = text().format_drift(&report);
        assert!(output.contains("staging_web_1.service"));
        assert!(output.contains("0123456789ab"));
        assert!(!output.contains("0123456789abc"));
        assert!(output.contains("1 drifted, 1 in sync"));
    }

    #[test]
    fn test_lock_info() {
        let formatter = text();
        assert!(formatter.format_lock("staging/web", None).contains("not locked"));

        let record = LockRecord::new("staging/web", "alice@ops", "db migration", Duration::from_secs(3600));
        let output = formatter.format_lock("staging/web", Some(&record));
        assert!(output.contains("locked by alice@ops"));
        assert!(output.contains("Message: db migration"));
        assert!(output.contains(record.lock_id()));
    }

    #[test]
    fn test_update_summary() {
        let mut report = UpdateReport::new("staging", "web");
        report.record(
            UnitAction {
                action_type: ActionType::Push,
                unit: String::from("staging_web_1.service"),
                exists_remotely: false,
                reason: String::from("missing"),
            },
            ActionStatus::Applied,
        );
        report.record(
            UnitAction {
                action_type: ActionType::Push,
                unit: String::from("staging_web_2.service"),
                exists_remotely: true,
                reason: String::from("changed"),
            },
            ActionStatus::Failed(String::from("unit rejected")),
        );

        let output = text().format_update(&report);
        assert!(output.contains("Update incomplete"));
        assert!(output.contains("1 applied, 0 declined, 1 failed"));
        assert!(output.contains("unit rejected"));

        let empty = UpdateReport::new("staging", "web");
        assert!(text().format_update(&empty).contains("nothing to update"));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(OutputFormatter::truncate("short", 10), "short");
        assert_eq!(OutputFormatter::truncate("a very long reason", 10), "a very ...");
    }
}
