//! # plugbay
//!
//! Plugin registry and service container.
//!
//! plugbay keeps a registry of plugin descriptors ordered by priority and
//! builds singleton services from them on demand, resolving each service's
//! declared dependencies recursively.
//!
//! ## Features
//!
//! - **Priority Ordering**: Named priority bands, stable on ties
//! - **Lazy Singletons**: Each service is built at most once, even under contention
//! - **Strict or Lenient**: Missing required dependencies abort or degrade
//! - **Hot Plugging**: Descriptors can be added and removed at runtime
//! - **Manifests**: Plugins declared in `plugins.toml` files
//!
//! ## Quick Start
//!
//! ```no_run
//! use plugbay::{Container, Implementation, Instance, PluginDescriptor, Priority};
//!
//! struct Console;
//!
//! let container = Container::builder()
//!     .implementation(Implementation::new("log.console", |_| Ok(Instance::plain(Console))))
//!     .plugin(PluginDescriptor::new("log", "log.console").with_priority(Priority::HIGH))
//!     .build()?;
//!
//! let _console = container.resolve_as::<Console>("log")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
// Allow common patterns that are intentional in this codebase
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::manual_let_else)]
#![allow(clippy::derivable_impls)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::significant_drop_tightening)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::float_cmp)]

pub mod core;
pub mod plugin;
pub mod service;

// Re-export commonly used types
pub use core::{Container, ContainerBuilder, ContainerConfig, ContainerError, ContainerResult};
pub use plugin::{
    Capability, ImplementationId, PluginDescriptor, PluginError, PluginManifest, PluginRegistry,
    PluginResult, Priority,
};
pub use service::{
    Dependencies, Implementation, Instance, InstanceIndex, LiveInstance, ResolveError,
    ResolveResult, Service, SingletonCapabilityCache,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "plugbay";
