// ============================================================================
// Linting
// ============================================================================

#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden
#![warn(dead_code)]
#![warn(unused_imports)]
#![warn(unused_variables)]

// Clippy lints (warnings only)
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::panic)]
#![warn(clippy::print_stdout)]
#![warn(clippy::todo)]
#![warn(clippy::unimplemented)]
#![warn(clippy::unwrap_in_result)]
#![warn(clippy::redundant_clone)]
#![warn(clippy::cognitive_complexity)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

// Safety and robustness lints
#![deny(overflowing_literals)]
#![deny(arithmetic_overflow)]

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Fleetwork
//!
//! Generates fleet unit files per environment and service, checks them for
//! drift against the cluster, and pushes changes under advisory locks.
//!
//! ## Work tree
//!
//! ```text
//! <work_path>/<env>/env.yaml
//! <work_path>/<env>/services/<service>/service.yaml
//! <work_path>/<env>/units/<service>/<env>_<service>_<node>.service
//! ```
//!
//! ## Flow
//!
//! 1. **Generate**: service manifests are compiled into unit files
//! 2. **Check**: generated units are compared with what the cluster runs
//! 3. **Update**: drifted units are pushed, one confirmed step at a time
//!
//! Environment checks fan out over a bounded worker pool
//! ([`work::dispatch`]). Guarded actions run configured early and late hooks;
//! the late hook fires on every exit path.
//!
//! ## Modules
//!
//! - [`config`]: Settings, environment and service files
//! - [`fleet`]: Cluster control interface and the `fleetctl` adapter
//! - [`manifest`]: Manifest resolution into unit definitions
//! - [`lock`]: Lock records and stores (local, etcd, memory)
//! - [`planner`]: Drift computation, update plans and their execution
//! - [`work`]: Environments, services, hooks and the check pool
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! # staging/services/web/service.yaml
//! containers:
//!   - registry.example.com/web:1.4
//! nodes:
//!   - name: "1"
//!     machine_metadata: ["role=web"]
//!   - name: "2"
//!     machine_metadata: ["role=web"]
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod config;
pub mod error;
pub mod fleet;
pub mod lock;
pub mod manifest;
pub mod planner;
pub mod work;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ConfigParser, ConfigValidator, Settings};
pub use error::{FleetworkError, Result};
pub use lock::{LockRecord, LockStore, Operator};
pub use planner::{DriftEngine, DriftReport, PlanExecutor, UpdatePlan, UpdateReport};
pub use work::{CheckReport, Collaborators, Env, GenerateReport, Service, WorkRegistry};
