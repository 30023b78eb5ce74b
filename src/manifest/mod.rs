//! Manifest resolution module.
//!
//! Turns a service's manifest references into concrete fleet unit definitions.

mod resolver;
mod template;

pub use resolver::{ManifestResolver, ServiceRef, UnitDefinition};
pub use template::{
    render, TemplateResolver, DEFAULT_UNIT_TEMPLATE, SERVICE_MANIFEST_FILE, UNIT_TEMPLATE_FILE,
};
