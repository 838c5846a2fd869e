//! Plugin manifest parsing, validation and discovery.
//!
//! A manifest is a TOML file listing capability specializations and plugin
//! descriptors. Bootstrap code feeds manifests into a [`PluginRegistry`]; the
//! registry itself never scans the filesystem.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use super::{
    Capability, ImplementationId, PluginDescriptor, PluginError, PluginRegistry, PluginResult,
    Priority,
};

/// Default manifest file name looked for by [`PluginManifest::discover`].
pub const MANIFEST_FILE: &str = "plugins.toml";

/// A set of capability declarations and plugin descriptors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginManifest {
    /// Capability specializations.
    #[serde(default, rename = "capability", skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<CapabilityDecl>,
    /// Plugin descriptors.
    #[serde(default, rename = "plugin", skip_serializing_if = "Vec::is_empty")]
    pub plugins: Vec<PluginEntry>,
}

/// Declares that a capability extends others.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityDecl {
    /// Capability name.
    pub name: Capability,
    /// Capabilities this one specializes.
    #[serde(default)]
    pub extends: Vec<Capability>,
}

/// One `[[plugin]]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginEntry {
    /// Capability provided.
    pub capability: Capability,
    /// Implementation id in the catalog.
    pub implementation: ImplementationId,
    /// Human-readable name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Priority, as a band name or a number.
    #[serde(default)]
    pub priority: Priority,
}

impl From<&PluginEntry> for PluginDescriptor {
    fn from(entry: &PluginEntry) -> Self {
        PluginDescriptor::new(entry.capability.clone(), entry.implementation.clone())
            .with_name(entry.name.clone())
            .with_priority(entry.priority)
    }
}

impl PluginManifest {
    /// Parse a manifest from TOML string.
    pub fn from_toml(content: &str) -> PluginResult<Self> {
        toml::from_str(content).map_err(|e| PluginError::InvalidManifest(e.to_string()))
    }

    /// Parse a manifest from a file.
    pub fn from_file(path: &Path) -> PluginResult<Self> {
        if !path.exists() {
            return Err(PluginError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content).map_err(|e| match e {
            PluginError::InvalidManifest(msg) => {
                PluginError::InvalidManifest(format!("{}: {msg}", path.display()))
            }
            other => other,
        })
    }

    /// Serialize to TOML string.
    pub fn to_toml(&self) -> PluginResult<String> {
        toml::to_string_pretty(self).map_err(|e| PluginError::InvalidManifest(e.to_string()))
    }

    /// Validate the manifest.
    pub fn validate(&self) -> PluginResult<()> {
        for decl in &self.capabilities {
            check_id("capability name", decl.name.as_str())?;
            for sup in &decl.extends {
                check_id("extended capability", sup.as_str())?;
                if sup == &decl.name {
                    return Err(PluginError::InvalidManifest(format!(
                        "Capability '{}' cannot extend itself",
                        decl.name
                    )));
                }
            }
        }

        for (i, plugin) in self.plugins.iter().enumerate() {
            check_id("plugin capability", plugin.capability.as_str())
                .and_then(|()| check_id("plugin implementation", plugin.implementation.as_str()))
                .map_err(|e| PluginError::InvalidManifest(format!("plugin #{}: {e}", i + 1)))?;
        }

        Ok(())
    }

    /// Descriptors in manifest order.
    pub fn descriptors(&self) -> Vec<PluginDescriptor> {
        self.plugins.iter().map(PluginDescriptor::from).collect()
    }

    /// Validate, declare specializations, then add every descriptor.
    pub fn install(&self, registry: &PluginRegistry) -> PluginResult<Vec<Arc<PluginDescriptor>>> {
        self.validate()?;

        for decl in &self.capabilities {
            for sup in &decl.extends {
                registry.declare_specialization(decl.name.clone(), sup.clone())?;
            }
        }

        Ok(registry.add_all(self.descriptors()))
    }

    /// Merge another manifest into this one.
    pub fn extend(&mut self, other: Self) {
        self.capabilities.extend(other.capabilities);
        self.plugins.extend(other.plugins);
    }

    /// Find every [`MANIFEST_FILE`] below `root`, sorted by path.
    pub fn discover(root: &Path) -> PluginResult<Vec<PathBuf>> {
        if !root.exists() {
            return Err(PluginError::NotFound(root.to_path_buf()));
        }

        let mut found = Vec::new();
        for entry in WalkDir::new(root).follow_links(true) {
            let entry = entry.map_err(|e| {
                PluginError::Io(e.into_io_error().unwrap_or_else(|| {
                    std::io::Error::new(std::io::ErrorKind::Other, "filesystem loop")
                }))
            })?;
            if entry.file_type().is_file() && entry.file_name() == MANIFEST_FILE {
                found.push(entry.into_path());
            }
        }
        found.sort();
        Ok(found)
    }

    /// Discover and merge every manifest below `root`.
    pub fn load_dir(root: &Path) -> PluginResult<Self> {
        let mut merged = Self::default();
        for path in Self::discover(root)? {
            tracing::debug!(path = ?path, "Loading plugin manifest");
            merged.extend(Self::from_file(&path)?);
        }
        Ok(merged)
    }

    /// Whether the manifest declares nothing.
    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty() && self.plugins.is_empty()
    }
}

fn check_id(what: &str, id: &str) -> PluginResult<()> {
    if id.trim().is_empty() {
        return Err(PluginError::InvalidManifest(format!("{what} is required")));
    }
    if id.chars().any(char::is_whitespace) {
        return Err(PluginError::InvalidManifest(format!(
            "{what} '{id}' must not contain whitespace"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
[[capability]]
name = "app.display"
extends = ["app.service"]

[[plugin]]
capability = "app.display"
implementation = "display.swing"
name = "Swing display"
priority = "high"

[[plugin]]
capability = "app.service"
implementation = "service.plain"
priority = -5
"#;

    #[test]
    fn test_parse_manifest() {
        let manifest = PluginManifest::from_toml(SAMPLE).unwrap();

        assert_eq!(manifest.capabilities.len(), 1);
        assert_eq!(manifest.plugins.len(), 2);
        assert_eq!(manifest.plugins[0].priority, Priority::HIGH);
        assert_eq!(manifest.plugins[1].priority, Priority::new(-5.0));
        assert!(manifest.plugins[1].name.is_empty());
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_default_priority_is_normal() {
        let manifest = PluginManifest::from_toml(
            "[[plugin]]\ncapability = \"a\"\nimplementation = \"b\"\n",
        )
        .unwrap();

        assert_eq!(manifest.plugins[0].priority, Priority::NORMAL);
    }

    #[test]
    fn test_validate_rejects_blank_ids() {
        let manifest = PluginManifest::from_toml(
            "[[plugin]]\ncapability = \"\"\nimplementation = \"b\"\n",
        )
        .unwrap();
        assert!(matches!(manifest.validate(), Err(PluginError::InvalidManifest(_))));

        let manifest = PluginManifest::from_toml(
            "[[capability]]\nname = \"a\"\nextends = [\"a\"]\n",
        )
        .unwrap();
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_invalid_priority_name() {
        let result = PluginManifest::from_toml(
            "[[plugin]]\ncapability = \"a\"\nimplementation = \"b\"\npriority = \"urgent\"\n",
        );
        assert!(matches!(result, Err(PluginError::InvalidManifest(_))));
    }

    #[test]
    fn test_nan_priority_rejected() {
        let result = PluginManifest::from_toml(
            "[[plugin]]\ncapability = \"a\"\nimplementation = \"b\"\npriority = nan\n",
        );
        assert!(matches!(result, Err(PluginError::InvalidManifest(_))));
    }

    #[test]
    fn test_install_into_registry() {
        let registry = PluginRegistry::new();
        let manifest = PluginManifest::from_toml(SAMPLE).unwrap();

        let added = manifest.install(&registry).unwrap();
        assert_eq!(added.len(), 2);

        let services = registry.query(&"app.service".into());
        assert_eq!(services.len(), 2);
        assert_eq!(services[0].implementation.as_str(), "display.swing");
        assert_eq!(services[0].name, "Swing display");
    }

    #[test]
    fn test_toml_roundtrip_keeps_band_names() {
        let manifest = PluginManifest::from_toml(SAMPLE).unwrap();
        let text = manifest.to_toml().unwrap();

        assert!(text.contains("priority = \"high\""));
        assert_eq!(PluginManifest::from_toml(&text).unwrap(), manifest);
    }

    #[test]
    fn test_discover_and_load_dir() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("vendor").join("io");
        std::fs::create_dir_all(&nested).unwrap();

        std::fs::write(temp_dir.path().join(MANIFEST_FILE), SAMPLE).unwrap();
        std::fs::write(
            nested.join(MANIFEST_FILE),
            "[[plugin]]\ncapability = \"io.reader\"\nimplementation = \"io.stl\"\n",
        )
        .unwrap();
        std::fs::write(nested.join("notes.toml"), "ignored = true").unwrap();

        let found = PluginManifest::discover(temp_dir.path()).unwrap();
        assert_eq!(found.len(), 2);

        let merged = PluginManifest::load_dir(temp_dir.path()).unwrap();
        assert_eq!(merged.plugins.len(), 3);
        assert_eq!(merged.capabilities.len(), 1);
    }

    #[test]
    fn test_missing_file() {
        let result = PluginManifest::from_file(Path::new("/definitely/not/here.toml"));
        assert!(matches!(result, Err(PluginError::NotFound(_))));
    }
}
