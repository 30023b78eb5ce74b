//! Template-based manifest resolver.
//!
//! Renders one unit per node declared in `service.yaml`. A service may ship its
//! own `unit.tmpl`; otherwise a built-in template running the manifests with
//! rkt is used. Placeholders use `{{name}}` syntax.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt::Write;
use tracing::debug;

use crate::config::{ConfigParser, ConfigValidator, NodeConfig, ServiceManifest};
use crate::error::{GenerationError, Result};
use crate::fleet::{service_unit_prefix, unit_name, UNIT_SUFFIX};

use super::resolver::{ManifestResolver, ServiceRef, UnitDefinition};

/// File name of the service manifest.
pub const SERVICE_MANIFEST_FILE: &str = "service.yaml";

/// File name of an optional service-local unit template.
pub const UNIT_TEMPLATE_FILE: &str = "unit.tmpl";

/// Template used when a service has no `unit.tmpl`.
pub const DEFAULT_UNIT_TEMPLATE: &str = "\
[Unit]
Description={{description}}
After=network-online.target{{after}}

[Service]
{{environment}}
ExecStart=/usr/bin/rkt run --inherit-env {{manifests}}
ExecStopPost=/usr/bin/rkt gc --mark-only
Restart=always
RestartSec=10

[X-Fleet]
Conflicts={{conflicts}}
{{machine_metadata}}
";

/// Resolver rendering units from `service.yaml` and a template.
#[derive(Debug, Default, Clone)]
pub struct TemplateResolver {
    parser: std::sync::Arc<ConfigParser>,
}

impl TemplateResolver {
    /// Creates a new template resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn load_manifest(&self, service: &ServiceRef) -> Result<ServiceManifest> {
        let path = service.path.join(SERVICE_MANIFEST_FILE);
        let manifest = self
            .parser
            .load_service_manifest(&path)
            .map_err(|e| generation_error(service, e.to_string()))?;
        ConfigValidator::new()
            .validate_service(&service.service, &manifest)
            .map_err(|e| generation_error(service, e.to_string()))?;
        Ok(manifest)
    }

    fn load_template(service: &ServiceRef) -> Result<String> {
        let path = service.path.join(UNIT_TEMPLATE_FILE);
        if path.exists() {
            debug!("Using unit template {}", path.display());
            let template = std::fs::read_to_string(&path).map_err(|e| {
                generation_error(service, format!("cannot read {}: {e}", path.display()))
            })?;
            Ok(template)
        } else {
            Ok(DEFAULT_UNIT_TEMPLATE.to_string())
        }
    }

    /// Values substituted into the template for one node.
    fn placeholders(
        service: &ServiceRef,
        manifest: &ServiceManifest,
        node: &NodeConfig,
        manifests: &[String],
    ) -> BTreeMap<&'static str, String> {
        let mut values = BTreeMap::new();
        values.insert("env", service.env.clone());
        values.insert("service", service.service.clone());
        values.insert("node", node.name.clone());
        values.insert("unit", unit_name(&service.env, &service.service, &node.name));
        values.insert(
            "description",
            manifest.description.as_ref().map_or_else(
                || format!("{} {} {}", service.env, service.service, node.name),
                |d| format!("{d} ({})", node.name),
            ),
        );
        values.insert("manifests", manifests.join(" "));
        values.insert(
            "after",
            manifest.after.iter().fold(String::new(), |mut acc, dep| {
                let _ = write!(acc, " {dep}");
                acc
            }),
        );
        values.insert(
            "environment",
            node.environment
                .iter()
                .map(|(k, v)| format!("Environment=\"{k}={v}\""))
                .collect::<Vec<_>>()
                .join("\n"),
        );
        values.insert(
            "machine_metadata",
            node.machine_metadata
                .iter()
                .map(|m| format!("MachineMetadata={m}"))
                .collect::<Vec<_>>()
                .join("\n"),
        );
        values.insert(
            "conflicts",
            format!("{}*{UNIT_SUFFIX}", service_unit_prefix(&service.env, &service.service)),
        );
        values
    }
}

#[async_trait]
impl ManifestResolver for TemplateResolver {
    async fn resolve(&self, service: &ServiceRef, manifests: &[String]) -> Result<Vec<UnitDefinition>> {
        let manifest = self.load_manifest(service)?;

        let manifests: &[String] = if manifests.is_empty() {
            &manifest.containers
        } else {
            debug!(service = %service.key(), "Using {} explicit manifests", manifests.len());
            manifests
        };
        if manifests.is_empty() {
            return Err(generation_error(service, "no manifests to run").into());
        }

        let template = Self::load_template(service)?;

        manifest
            .nodes
            .iter()
            .map(|node| -> Result<UnitDefinition> {
                let values = Self::placeholders(service, &manifest, node, manifests);
                let content = render(&template, &values)
                    .map_err(|message| generation_error(service, message))?;
                Ok(UnitDefinition::new(
                    unit_name(&service.env, &service.service, &node.name),
                    content,
                ))
            })
            .collect()
    }
}

/// Substitutes `{{name}}` placeholders. Unknown or unterminated placeholders fail.
pub fn render(template: &str, values: &BTreeMap<&'static str, String>) -> std::result::Result<String, String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        let Some(end) = after_open.find("}}") else {
            return Err(String::from("unterminated placeholder in unit template"));
        };
        let key = after_open[..end].trim();
        let value = values
            .get(key)
            .ok_or_else(|| format!("unknown placeholder '{{{{{key}}}}}' in unit template"))?;
        out.push_str(value);
        rest = &after_open[end + 2..];
    }
    out.push_str(rest);

    Ok(out)
}

fn generation_error(service: &ServiceRef, message: impl Into<String>) -> GenerationError {
    GenerationError {
        env: service.env.clone(),
        service: service.service.clone(),
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FleetworkError;
    use tempfile::TempDir;

    fn service_dir(yaml: &str) -> (TempDir, ServiceRef) {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(SERVICE_MANIFEST_FILE), yaml).unwrap();
        let service = ServiceRef::new("staging", "web", dir.path());
        (dir, service)
    }

    const WEB: &str = r"
containers:
  - example.com/web:1.4.2
nodes:
  - name: '1'
    machine_metadata: ['role=web']
    environment:
      PORT: '8080'
  - name: '2'
";

    #[tokio::test]
    async fn test_one_unit_per_node() {
        let (_dir, service) = service_dir(WEB);
        let units = TemplateResolver::new().resolve(&service, &[]).await.unwrap();

        assert_eq!(units.len(), 2);
        assert_eq!(units[0].name, "staging_web_1.service");
        assert!(units[0].content.contains("rkt run --inherit-env example.com/web:1.4.2"));
        assert!(units[0].content.contains("Environment=\"PORT=8080\""));
        assert!(units[0].content.contains("MachineMetadata=role=web"));
        assert!(units[0].content.contains("Conflicts=staging_web_*.service"));
        assert_eq!(units[1].name, "staging_web_2.service");
    }

    #[tokio::test]
    async fn test_explicit_manifests_override_defaults() {
        let (_dir, service) = service_dir(WEB);
        let explicit = vec![String::from("example.com/web:2.0.0")];
        let units = TemplateResolver::new().resolve(&service, &explicit).await.unwrap();

        assert!(units[0].content.contains("example.com/web:2.0.0"));
        assert!(!units[0].content.contains("1.4.2"));
    }

    #[tokio::test]
    async fn test_service_template_is_used() {
        let (dir, service) = service_dir(WEB);
        std::fs::write(
            dir.path().join(UNIT_TEMPLATE_FILE),
            "[Service]\nExecStart=/bin/run {{manifests}} --node {{node}}\n",
        )
        .unwrap();

        let units = TemplateResolver::new().resolve(&service, &[]).await.unwrap();
        assert_eq!(
            units[1].content,
            "[Service]\nExecStart=/bin/run example.com/web:1.4.2 --node 2\n"
        );
    }

    #[tokio::test]
    async fn test_unknown_placeholder_fails() {
        let (dir, service) = service_dir(WEB);
        std::fs::write(dir.path().join(UNIT_TEMPLATE_FILE), "ExecStart={{nope}}\n").unwrap();

        let result = TemplateResolver::new().resolve(&service, &[]).await;
        assert!(matches!(result, Err(FleetworkError::Generation(_))));
    }

    #[tokio::test]
    async fn test_unreadable_template_fails() {
        let (dir, service) = service_dir(WEB);
        std::fs::create_dir(dir.path().join(UNIT_TEMPLATE_FILE)).unwrap();

        let Err(FleetworkError::Generation(e)) = TemplateResolver::new().resolve(&service, &[]).await else {
            panic!("expected a generation error");
        };
        assert!(e.message.starts_with("cannot read"));
    }

    #[tokio::test]
    async fn test_no_manifests_fails() {
        let (_dir, service) = service_dir("nodes:\n  - name: '1'\n");
        let result = TemplateResolver::new().resolve(&service, &[]).await;
        assert!(matches!(result, Err(FleetworkError::Generation(_))));
    }

    #[tokio::test]
    async fn test_missing_manifest_file_fails() {
        let dir = TempDir::new().unwrap();
        let service = ServiceRef::new("staging", "web", dir.path());
        let result = TemplateResolver::new().resolve(&service, &[]).await;
        assert!(matches!(result, Err(FleetworkError::Generation(_))));
    }

    #[test]
    fn test_render_unterminated() {
        let values = BTreeMap::new();
        assert!(render("a {{b", &values).is_err());
        assert_eq!(render("plain", &values).unwrap(), "plain");
    }
}
