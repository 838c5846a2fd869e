//! Configuration management for plugbay.
//!
//! Handles loading and saving container configuration from TOML files, with
//! environment overrides applied on top.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::plugin::{split_patterns, Capability, BLOCKLIST_ENV};
use crate::service::ResolutionPolicy;

/// Environment variable overriding `resolution.strict`.
pub const STRICT_ENV: &str = "PLUGBAY_STRICT";

/// Environment variable naming an explicit configuration file.
pub const CONFIG_ENV: &str = "PLUGBAY_CONFIG";

/// Name of the project-local configuration file.
pub const LOCAL_CONFIG_FILE: &str = ".plugbay.toml";

/// Container configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    /// Capabilities resolved while the container is built
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub eager: Vec<Capability>,

    /// Dependency resolution policy
    pub resolution: ResolutionConfig,

    /// Plugin sources and filtering
    pub plugins: PluginsConfig,
}

/// How missing or failing dependencies are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolutionConfig {
    /// Abort when a required dependency cannot be satisfied
    pub strict: bool,

    /// Try lower-priority candidates when the best one fails to construct
    pub fallback_on_failure: bool,
}

/// Where descriptors come from and which ones are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginsConfig {
    /// Implementation id patterns excluded from queries
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub blocklist: Vec<String>,

    /// Manifest files to install
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub manifests: Vec<PathBuf>,

    /// Directories searched recursively for `plugins.toml`
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub manifest_dirs: Vec<PathBuf>,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self { strict: true, fallback_on_failure: false }
    }
}

impl ContainerConfig {
    /// Load configuration from the default location.
    ///
    /// Looks for config in:
    /// 1. the file named by `PLUGBAY_CONFIG`
    /// 2. `.plugbay.toml` in current directory
    /// 3. `~/.config/plugbay/config.toml`
    /// 4. Falls back to defaults
    ///
    /// Environment overrides are applied in every case.
    pub fn load() -> anyhow::Result<Self> {
        let mut config = match Self::locate() {
            Some(path) => Self::load_from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// The file [`load`](Self::load) would read, if any.
    pub fn locate() -> Option<PathBuf> {
        if let Ok(explicit) = std::env::var(CONFIG_ENV) {
            if !explicit.is_empty() {
                return Some(PathBuf::from(explicit));
            }
        }

        let local_config = PathBuf::from(LOCAL_CONFIG_FILE);
        if local_config.exists() {
            return Some(local_config);
        }

        Self::config_dir().map(|d| d.join("config.toml")).filter(|p| p.exists())
    }

    /// Load configuration from a specific file.
    ///
    /// Relative manifest paths are resolved against the file's directory.
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {e}", path.display()))?;
        let mut config = Self::from_toml(&content)?;
        if let Some(base) = path.parent() {
            config.rebase(base);
        }
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    pub fn to_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Save configuration to the global config file.
    pub fn save(&self) -> anyhow::Result<PathBuf> {
        let dir = Self::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        std::fs::create_dir_all(&dir)?;

        let config_path = dir.join("config.toml");
        std::fs::write(&config_path, self.to_toml()?)?;
        Ok(config_path)
    }

    /// Get the config directory path.
    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("plugbay"))
    }

    /// Apply `PLUGBAY_STRICT` and `PLUGBAY_BLOCKLIST`.
    ///
    /// Block-list patterns from the environment are appended to the configured
    /// ones.
    pub fn apply_env_overrides(&mut self) -> anyhow::Result<()> {
        if let Ok(value) = std::env::var(STRICT_ENV) {
            self.resolution.strict = parse_flag(&value)
                .ok_or_else(|| anyhow::anyhow!("{STRICT_ENV} must be true or false, got '{value}'"))?;
        }
        if let Ok(value) = std::env::var(BLOCKLIST_ENV) {
            for pattern in split_patterns(&value) {
                if !self.plugins.blocklist.contains(&pattern) {
                    self.plugins.blocklist.push(pattern);
                }
            }
        }
        Ok(())
    }

    pub fn policy(&self) -> ResolutionPolicy {
        ResolutionPolicy {
            strict: self.resolution.strict,
            fallback_on_failure: self.resolution.fallback_on_failure,
        }
    }

    fn rebase(&mut self, base: &Path) {
        for path in self.plugins.manifests.iter_mut().chain(self.plugins.manifest_dirs.iter_mut()) {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
