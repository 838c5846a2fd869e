//! Service construction and caching.
//!
//! # Architecture
//!
//! ```text
//! resolve("app.main")
//!     │
//!     ├─ InstanceIndex::get_first ──► live instance? return it
//!     │
//!     └─ PluginRegistry::query ──► best descriptor
//!            │
//!            ├─ Catalog::get(implementation) ──► factory + declared dependencies
//!            ├─ resolve(dependency) ...        (depth-first, declaration order)
//!            ├─ factory(&Dependencies)
//!            ├─ Service::initialize, Service::register_notifications
//!            └─ InstanceIndex::add
//! ```
//!
//! [`SingletonCapabilityCache`] sits on top of the engine for consumers that
//! want every implementation of a capability at once.

mod engine;
mod error;
mod implementation;
mod index;
mod instance;
mod singleton;

pub use engine::{ResolutionEngine, ResolutionPolicy, ResolutionReport};
pub use error::{ResolutionChain, ResolveError, ResolveResult};
pub use implementation::{Catalog, Dependencies, Dependency, Factory, Implementation};
pub use index::{InstanceIndex, LiveInstance, Provenance};
pub use instance::{Instance, Service};
pub use singleton::SingletonCapabilityCache;
