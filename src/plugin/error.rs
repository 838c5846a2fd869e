//! Plugin registry error types.

use std::path::PathBuf;
use thiserror::Error;

use super::Capability;

/// Result type for registry and manifest operations.
pub type PluginResult<T> = Result<T, PluginError>;

/// Errors that can occur while describing or registering plugins.
#[derive(Debug, Error)]
pub enum PluginError {
    /// Manifest file not found.
    #[error("Manifest not found: {0}")]
    NotFound(PathBuf),

    /// Invalid plugin manifest.
    #[error("Invalid plugin manifest: {0}")]
    InvalidManifest(String),

    /// Block-list pattern does not compile.
    #[error("Invalid block-list pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// Specialization would make the capability hierarchy cyclic.
    #[error("Capability '{sub}' cannot extend '{sup}': the hierarchy would become cyclic")]
    HierarchyCycle { sub: Capability, sup: Capability },

    /// Validation error (e.g., malformed priority).
    #[error("Validation error: {0}")]
    Validation(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
