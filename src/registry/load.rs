use super::build::HandlerEnumerator;
use super::types::HandlerGroup;
use crate::security::PolicyCatalog;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Handler declarations read from a YAML or JSON manifest.
///
/// ```yaml
/// policies:
///   admins:
///     roles: [admin]
/// groups:
///   - name: Orders
///     authorize: { scopes: [orders.read] }
///     handlers:
///       - method: list
///         function_name: ListOrders
///         parameters:
///           - name: req
///             trigger: { type: http, route: orders, methods: [GET] }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HandlerManifest {
    #[serde(default)]
    pub policies: PolicyCatalog,
    #[serde(default)]
    pub groups: Vec<HandlerGroup>,
}

/// [`HandlerEnumerator`] over a parsed [`HandlerManifest`].
#[derive(Debug, Clone, Default)]
pub struct ManifestEnumerator {
    manifest: HandlerManifest,
}

impl ManifestEnumerator {
    /// Load a manifest, parsing `.yaml`/`.yml` files as YAML and anything else as JSON.
    pub fn from_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read handler manifest {}", path.display()))?;
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml" | "yml")
        );
        let manifest = if is_yaml {
            serde_yaml::from_str(&content)
                .with_context(|| format!("invalid YAML manifest {}", path.display()))?
        } else {
            serde_json::from_str(&content)
                .with_context(|| format!("invalid JSON manifest {}", path.display()))?
        };
        Ok(Self { manifest })
    }

    /// Parse YAML text. JSON is a subset of YAML, so JSON text works too.
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let manifest = serde_yaml::from_str(content).context("invalid handler manifest")?;
        Ok(Self { manifest })
    }

    pub fn catalog(&self) -> &PolicyCatalog {
        &self.manifest.policies
    }

    pub fn manifest(&self) -> &HandlerManifest {
        &self.manifest
    }
}

impl From<HandlerManifest> for ManifestEnumerator {
    fn from(manifest: HandlerManifest) -> Self {
        Self { manifest }
    }
}

impl HandlerEnumerator for ManifestEnumerator {
    fn enumerate(&self) -> anyhow::Result<Vec<HandlerGroup>> {
        Ok(self.manifest.groups.clone())
    }
}
