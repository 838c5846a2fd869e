//! Container assembly and configuration.
//!
//! This module ties the plugin registry and the resolution engine together
//! into a [`Container`], configured from TOML and the environment.

mod config;
mod container;
mod error;

pub use config::{
    ContainerConfig, PluginsConfig, ResolutionConfig, CONFIG_ENV, LOCAL_CONFIG_FILE, STRICT_ENV,
};
pub use container::{Container, ContainerBuilder};
pub use error::{ContainerError, ContainerResult};
