use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Declaration a plugin module makes before it is loaded.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PluginManifest {
    pub id: String,
    pub name: String,
    pub version: String,
    pub description: Option<String>,
    /// Host dependency names, in the order the module's factory expects them.
    pub dependencies: Vec<String>,
}

impl PluginManifest {
    pub fn requires_dependency(&self, name: &str) -> bool {
        self.dependencies.iter().any(|d| d == name)
    }

    pub fn semver(&self) -> anyhow::Result<semver::Version> {
        semver::Version::parse(&self.version)
            .with_context(|| format!("plugin `{}` has invalid version `{}`", self.id, self.version))
    }
}
