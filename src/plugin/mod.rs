//! Plugin descriptors and the registry that indexes them.
//!
//! # Overview
//!
//! A [`PluginDescriptor`] names a capability, the implementation that provides
//! it, a display name and a [`Priority`]. The [`PluginRegistry`] keeps
//! descriptors sorted per capability and answers "which plugins provide X,
//! best first?" without constructing anything.
//!
//! Capabilities are identifiers, not types. Specialization between them is
//! declared explicitly (see [`CapabilityTree`]) so that a request for a general
//! capability also sees plugins registered for a more specific one.
//!
//! # Example Manifest
//!
//! ```toml
//! [[capability]]
//! name = "app.display"
//! extends = ["app.service"]
//!
//! [[plugin]]
//! capability = "app.display"
//! implementation = "display.swing"
//! name = "Swing display"
//! priority = "high"
//! ```

mod blocklist;
mod capability;
mod descriptor;
mod error;
mod manifest;
mod priority;
mod registry;

pub use blocklist::{split_patterns, BlockList, BLOCKLIST_ENV};
pub use capability::CapabilityTree;
pub use descriptor::{Capability, ImplementationId, PluginDescriptor};
pub use error::{PluginError, PluginResult};
pub use manifest::{CapabilityDecl, PluginEntry, PluginManifest, MANIFEST_FILE};
pub use priority::Priority;
pub use registry::{PluginRegistry, RegistryEvent, RegistryListener, SubscriptionId};
