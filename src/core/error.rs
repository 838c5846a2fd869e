//! Container-level errors.

use thiserror::Error;

use crate::plugin::PluginError;
use crate::service::ResolveError;

/// Errors raised while building or using a [`Container`](super::Container).
#[derive(Debug, Error)]
pub enum ContainerError {
    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for container operations.
pub type ContainerResult<T> = Result<T, ContainerError>;
