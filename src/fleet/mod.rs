//! Fleet cluster integration module.
//!
//! This module provides the cluster control interface used by services and
//! environments, and its `fleetctl` implementation.

mod control;
mod fleetctl;
mod types;

pub use control::{ClusterControl, ClusterProvider, FleetCtlProvider, StaticClusterProvider};
#[cfg(test)]
pub use control::MockClusterControl;
pub use fleetctl::FleetCtl;
pub use types::{
    CommandOutput, UnitDescriptor, UnitState, UNIT_NAME_SEPARATOR, UNIT_SUFFIX,
    service_unit_prefix, unit_name,
};
