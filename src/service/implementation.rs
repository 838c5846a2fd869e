//! Implementation catalog: how to build each plugin and what it depends on.
//!
//! Descriptors only name an [`ImplementationId`]. The catalog maps that id to
//! an [`Implementation`]: a factory plus the dependencies it declares. This is
//! the explicit replacement for annotation scanning; a plugin states its
//! dependencies once, at registration, and the engine wires them.

use std::any::{type_name, Any};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use anyhow::anyhow;
use parking_lot::RwLock;

use super::{Instance, LiveInstance};
use crate::plugin::{Capability, ImplementationId};

/// A declared dependency on another capability.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Dependency {
    pub capability: Capability,
    pub required: bool,
}

impl Dependency {
    pub fn required(capability: impl Into<Capability>) -> Self {
        Self { capability: capability.into(), required: true }
    }

    pub fn optional(capability: impl Into<Capability>) -> Self {
        Self { capability: capability.into(), required: false }
    }
}

/// Factory signature: build an instance from its bound dependencies.
pub type Factory = Arc<dyn Fn(&Dependencies) -> anyhow::Result<Instance> + Send + Sync>;

/// A constructible plugin implementation.
#[derive(Clone)]
pub struct Implementation {
    id: ImplementationId,
    dependencies: Vec<Dependency>,
    factory: Factory,
}

impl fmt::Debug for Implementation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Implementation")
            .field("id", &self.id)
            .field("dependencies", &self.dependencies)
            .finish()
    }
}

impl Implementation {
    pub fn new<F>(id: impl Into<ImplementationId>, factory: F) -> Self
    where
        F: Fn(&Dependencies) -> anyhow::Result<Instance> + Send + Sync + 'static,
    {
        Self { id: id.into(), dependencies: Vec::new(), factory: Arc::new(factory) }
    }

    /// Declare a required dependency.
    pub fn depends_on(mut self, capability: impl Into<Capability>) -> Self {
        self.dependencies.push(Dependency::required(capability));
        self
    }

    /// Declare an optional dependency.
    pub fn optionally_depends_on(mut self, capability: impl Into<Capability>) -> Self {
        self.dependencies.push(Dependency::optional(capability));
        self
    }

    pub fn id(&self) -> &ImplementationId {
        &self.id
    }

    /// Dependencies in declaration order.
    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    pub(crate) fn construct(&self, dependencies: &Dependencies) -> anyhow::Result<Instance> {
        (self.factory)(dependencies)
    }
}

/// Values bound to an implementation's declared dependencies.
///
/// Absent bindings are optional dependencies that could not be satisfied, or
/// required ones downgraded by a lenient container.
#[derive(Debug, Clone, Default)]
pub struct Dependencies {
    bound: Vec<(Dependency, Option<LiveInstance>)>,
}

impl Dependencies {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn bind(&mut self, dependency: Dependency, value: Option<LiveInstance>) {
        self.bound.push((dependency, value));
    }

    /// The bound instance for `capability`, if any.
    pub fn get(&self, capability: &str) -> Option<&LiveInstance> {
        self.bound
            .iter()
            .find(|(d, _)| d.capability.as_str() == capability)
            .and_then(|(_, v)| v.as_ref())
    }

    /// The bound instance for `capability` as a `T`.
    pub fn get_as<T: Any + Send + Sync>(&self, capability: &str) -> Option<Arc<T>> {
        self.get(capability).and_then(|live| live.instance().downcast::<T>())
    }

    /// Like [`get_as`](Self::get_as) but fails when absent or of another type.
    pub fn require<T: Any + Send + Sync>(&self, capability: &str) -> anyhow::Result<Arc<T>> {
        let live = self
            .get(capability)
            .ok_or_else(|| anyhow!("dependency '{capability}' is not available"))?;
        live.instance().downcast::<T>().ok_or_else(|| {
            anyhow!(
                "dependency '{capability}' is a {}, expected {}",
                live.instance().type_name(),
                type_name::<T>()
            )
        })
    }

    pub fn is_bound(&self, capability: &str) -> bool {
        self.get(capability).is_some()
    }

    /// Every declared dependency with its binding, in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&Dependency, Option<&LiveInstance>)> {
        self.bound.iter().map(|(d, v)| (d, v.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.bound.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bound.is_empty()
    }
}

/// Table of known implementations, plus default implementations that make a
/// capability directly constructible when no plugin provides it.
#[derive(Default)]
pub struct Catalog {
    implementations: RwLock<HashMap<ImplementationId, Arc<Implementation>>>,
    defaults: RwLock<HashMap<Capability, Arc<Implementation>>>,
}

impl fmt::Debug for Catalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Catalog")
            .field("implementations", &self.implementations.read().len())
            .field("defaults", &self.defaults.read().len())
            .finish()
    }
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an implementation, returning the one it replaced.
    pub fn register(&self, implementation: Implementation) -> Option<Arc<Implementation>> {
        let id = implementation.id.clone();
        let previous = self.implementations.write().insert(id.clone(), Arc::new(implementation));
        if previous.is_some() {
            tracing::debug!(implementation = %id, "Implementation replaced");
        }
        previous
    }

    /// Register the implementation used when nothing provides `capability`.
    pub fn register_default(
        &self,
        capability: impl Into<Capability>,
        implementation: Implementation,
    ) -> Option<Arc<Implementation>> {
        self.defaults.write().insert(capability.into(), Arc::new(implementation))
    }

    pub fn get(&self, id: &ImplementationId) -> Option<Arc<Implementation>> {
        self.implementations.read().get(id).cloned()
    }

    pub fn default_for(&self, capability: &Capability) -> Option<Arc<Implementation>> {
        self.defaults.read().get(capability).cloned()
    }

    pub fn contains(&self, id: &ImplementationId) -> bool {
        self.implementations.read().contains_key(id)
    }

    pub fn unregister(&self, id: &ImplementationId) -> Option<Arc<Implementation>> {
        self.implementations.write().remove(id)
    }

    pub fn len(&self) -> usize {
        self.implementations.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.implementations.write().clear();
        self.defaults.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::Priority;
    use crate::service::Provenance;

    struct Greeting(&'static str);

    fn live(capability: &str, value: Instance) -> LiveInstance {
        LiveInstance::new(
            value,
            Provenance::new(capability, format!("{capability}.impl"), "", Priority::NORMAL),
            0,
        )
    }

    #[test]
    fn test_declared_dependencies_keep_order() {
        let implementation = Implementation::new("app.main", |_| Ok(Instance::plain(())))
            .depends_on("log")
            .optionally_depends_on("ui")
            .depends_on("db");

        let names: Vec<_> =
            implementation.dependencies().iter().map(|d| d.capability.as_str()).collect();
        assert_eq!(names, vec!["log", "ui", "db"]);
        assert!(!implementation.dependencies()[1].required);
    }

    #[test]
    fn test_dependencies_lookup() {
        let mut deps = Dependencies::new();
        deps.bind(Dependency::required("greeting"), Some(live("greeting", Instance::plain(Greeting("hi")))));
        deps.bind(Dependency::optional("ui"), None);

        assert_eq!(deps.get_as::<Greeting>("greeting").unwrap().0, "hi");
        assert!(deps.require::<Greeting>("greeting").is_ok());
        assert!(deps.require::<String>("greeting").is_err());
        assert!(deps.require::<Greeting>("ui").is_err());
        assert!(!deps.is_bound("ui"));
        assert_eq!(deps.len(), 2);
    }

    #[test]
    fn test_catalog_register_and_defaults() {
        let catalog = Catalog::new();
        assert!(catalog.register(Implementation::new("a", |_| Ok(Instance::plain(1u8)))).is_none());
        assert!(catalog.register(Implementation::new("a", |_| Ok(Instance::plain(2u8)))).is_some());
        catalog.register_default("cap", Implementation::new("cap.default", |_| Ok(Instance::plain(()))));

        assert!(catalog.contains(&"a".into()));
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.default_for(&"cap".into()).unwrap().id().as_str(), "cap.default");

        let built = catalog.get(&"a".into()).unwrap().construct(&Dependencies::new()).unwrap();
        assert_eq!(*built.downcast_ref::<u8>().unwrap(), 2);

        catalog.clear();
        assert!(catalog.is_empty());
        assert!(catalog.default_for(&"cap".into()).is_none());
    }
}
