//! The container aggregate.
//!
//! A [`Container`] owns one registry, one instance index, one implementation
//! catalog and one resolution engine, all wired together by a
//! [`ContainerBuilder`]. Dropping the container disposes it.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::{ContainerConfig, ContainerError, ContainerResult};
use crate::plugin::{
    BlockList, Capability, PluginDescriptor, PluginManifest, PluginRegistry, RegistryEvent,
    SubscriptionId,
};
use crate::service::{
    Catalog, Implementation, InstanceIndex, LiveInstance, ResolutionEngine, ResolutionReport,
    ResolveResult, SingletonCapabilityCache,
};

/// Assembles a [`Container`] from configuration, manifests and code.
#[derive(Default)]
pub struct ContainerBuilder {
    config: ContainerConfig,
    manifests: Vec<PluginManifest>,
    descriptors: Vec<PluginDescriptor>,
    specializations: Vec<(Capability, Capability)>,
    implementations: Vec<Implementation>,
    defaults: Vec<(Capability, Implementation)>,
}

impl ContainerBuilder {
    /// A builder with default configuration (strict, no fallback).
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: ContainerConfig) -> Self {
        Self { config, ..Self::default() }
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.config.resolution.strict = strict;
        self
    }

    pub fn fallback_on_failure(mut self, enabled: bool) -> Self {
        self.config.resolution.fallback_on_failure = enabled;
        self
    }

    /// Add a block-list pattern.
    pub fn block(mut self, pattern: impl Into<String>) -> Self {
        self.config.plugins.blocklist.push(pattern.into());
        self
    }

    pub fn plugin(mut self, descriptor: PluginDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    pub fn implementation(mut self, implementation: Implementation) -> Self {
        self.implementations.push(implementation);
        self
    }

    /// Register the implementation built when no plugin provides `capability`.
    pub fn default_implementation(
        mut self,
        capability: impl Into<Capability>,
        implementation: Implementation,
    ) -> Self {
        self.defaults.push((capability.into(), implementation));
        self
    }

    /// Declare `sub` a specialization of `sup`.
    pub fn specialize(mut self, sub: impl Into<Capability>, sup: impl Into<Capability>) -> Self {
        self.specializations.push((sub.into(), sup.into()));
        self
    }

    pub fn manifest(mut self, manifest: PluginManifest) -> Self {
        self.manifests.push(manifest);
        self
    }

    pub fn manifest_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.plugins.manifests.push(path.into());
        self
    }

    pub fn manifest_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.plugins.manifest_dirs.push(path.into());
        self
    }

    /// Resolve `capability` while building.
    pub fn eager(mut self, capability: impl Into<Capability>) -> Self {
        self.config.eager.push(capability.into());
        self
    }

    /// Wire everything together and run eager resolution.
    ///
    /// In strict mode an eager capability that fails aborts the build; in
    /// lenient mode the failure is logged and the container is returned.
    pub fn build(self) -> ContainerResult<Container> {
        let blocklist = BlockList::from_patterns(&self.config.plugins.blocklist)?;
        let registry = Arc::new(PluginRegistry::with_blocklist(Arc::new(blocklist)));
        let index = Arc::new(InstanceIndex::new());
        let catalog = Arc::new(Catalog::new());

        for implementation in self.implementations {
            catalog.register(implementation);
        }
        for (capability, implementation) in self.defaults {
            catalog.register_default(capability, implementation);
        }

        let invalidation = subscribe_invalidation(&registry, &index);

        for (sub, sup) in self.specializations {
            registry.declare_specialization(sub, sup)?;
        }
        for path in &self.config.plugins.manifests {
            PluginManifest::from_file(path)?.install(&registry)?;
        }
        for dir in &self.config.plugins.manifest_dirs {
            if dir.is_file() {
                return Err(ContainerError::Config(format!(
                    "manifest directory {} is a file",
                    dir.display()
                )));
            }
            PluginManifest::load_dir(dir)?.install(&registry)?;
        }
        for manifest in &self.manifests {
            manifest.install(&registry)?;
        }
        registry.add_all(self.descriptors);

        let engine = Arc::new(ResolutionEngine::new(
            Arc::clone(&registry),
            index,
            catalog,
            self.config.policy(),
        ));

        tracing::debug!(
            plugins = registry.len(),
            implementations = engine.catalog().len(),
            strict = self.config.resolution.strict,
            "Container built"
        );

        let container = Container {
            config: self.config,
            engine,
            caches: Mutex::new(HashMap::new()),
            invalidation,
            disposed: AtomicBool::new(false),
        };

        let eager = container.config.eager.clone();
        container.preload(&eager)?;
        Ok(container)
    }
}

/// Unfile live instances from capabilities that no remaining descriptor backs.
fn subscribe_invalidation(registry: &Arc<PluginRegistry>, index: &Arc<InstanceIndex>) -> SubscriptionId {
    let weak_registry: Weak<PluginRegistry> = Arc::downgrade(registry);
    let index = Arc::clone(index);

    registry.subscribe_all(Arc::new(move |event: &RegistryEvent| {
        let RegistryEvent::Removed(descriptor) = event else {
            return;
        };
        let Some(registry) = weak_registry.upgrade() else {
            return;
        };
        let implementation = &descriptor.implementation;

        let removed = if registry.has_implementation(implementation) {
            let backed: HashSet<Capability> = registry
                .descriptors()
                .iter()
                .filter(|d| &d.implementation == implementation)
                .flat_map(|d| registry.ancestors(&d.capability))
                .collect();
            let stale: Vec<Capability> = registry
                .ancestors(&descriptor.capability)
                .into_iter()
                .filter(|key| !backed.contains(key))
                .collect();
            index.remove(implementation, &stale)
        } else {
            index.remove_all_of_type(implementation)
        };

        if !removed.is_empty() {
            tracing::debug!(
                implementation = %implementation,
                capability = %descriptor.capability,
                instances = removed.len(),
                "Live instances dropped"
            );
        }
    }))
}

/// A plugin registry with lazily built singleton services.
pub struct Container {
    config: ContainerConfig,
    engine: Arc<ResolutionEngine>,
    caches: Mutex<HashMap<Capability, Arc<SingletonCapabilityCache>>>,
    invalidation: SubscriptionId,
    disposed: AtomicBool,
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("strict", &self.is_strict())
            .field("plugins", &self.registry().len())
            .field("instances", &self.index().len())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl Container {
    pub fn builder() -> ContainerBuilder {
        ContainerBuilder::new()
    }

    /// Build a container from configuration alone.
    pub fn from_config(config: ContainerConfig) -> ContainerResult<Self> {
        ContainerBuilder::from_config(config).build()
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        self.engine.registry()
    }

    pub fn index(&self) -> &Arc<InstanceIndex> {
        self.engine.index()
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        self.engine.catalog()
    }

    pub fn engine(&self) -> &Arc<ResolutionEngine> {
        &self.engine
    }

    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    pub fn is_strict(&self) -> bool {
        self.engine.policy().strict
    }

    /// Resolve the best service for `capability`.
    pub fn resolve(&self, capability: impl Into<Capability>) -> ResolveResult<LiveInstance> {
        self.engine.resolve(&capability.into())
    }

    /// Resolve and downcast to the concrete service type.
    pub fn resolve_as<T: std::any::Any + Send + Sync>(
        &self,
        capability: impl Into<Capability>,
    ) -> ResolveResult<Arc<T>> {
        self.engine.resolve_as(&capability.into())
    }

    /// Like [`resolve`](Self::resolve) but a missing service is `None`.
    pub fn resolve_optional(
        &self,
        capability: impl Into<Capability>,
    ) -> ResolveResult<Option<LiveInstance>> {
        self.engine.resolve_optional(&capability.into())
    }

    /// Build every plugin of `capability`, collecting failures.
    pub fn resolve_all(&self, capability: impl Into<Capability>) -> ResolutionReport {
        self.engine.resolve_all(&capability.into())
    }

    /// The shared cache of every instance of `capability`.
    pub fn singleton_cache(&self, capability: impl Into<Capability>) -> Arc<SingletonCapabilityCache> {
        let capability = capability.into();
        let mut caches = self.caches.lock();
        Arc::clone(caches.entry(capability.clone()).or_insert_with(|| {
            SingletonCapabilityCache::new(Arc::clone(&self.engine), capability)
        }))
    }

    /// Every instance of `capability`, highest priority first.
    pub fn instances(&self, capability: impl Into<Capability>) -> Arc<[LiveInstance]> {
        self.singleton_cache(capability).instances()
    }

    /// Resolve each capability up front.
    ///
    /// Strict containers stop at the first failure. Lenient ones log and carry
    /// on, except for cycles which always fail.
    pub fn preload(&self, capabilities: &[Capability]) -> ResolveResult<()> {
        for capability in capabilities {
            match self.engine.resolve(capability) {
                Ok(_) => {}
                Err(e) if self.is_strict() || e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::warn!(capability = %capability, error = %e, "Eager service unavailable");
                }
            }
        }
        Ok(())
    }

    /// Add a descriptor at runtime.
    pub fn add_plugin(&self, descriptor: PluginDescriptor) -> Arc<PluginDescriptor> {
        self.registry().add(descriptor)
    }

    /// Remove a descriptor at runtime, dropping instances built from it.
    pub fn remove_plugin(&self, descriptor: &Arc<PluginDescriptor>) -> bool {
        self.registry().remove(descriptor)
    }

    pub fn register_implementation(&self, implementation: Implementation) {
        self.catalog().register(implementation);
    }

    /// Tear the container down.
    ///
    /// Resolution stops first, then every live instance is disposed (most
    /// recently built first), then the registry and catalog are emptied.
    /// Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.engine.shut_down();
        self.caches.lock().clear();

        let drained = self.index().drain();
        let count = drained.len();
        for live in drained {
            if let Some(lifecycle) = live.instance().lifecycle() {
                lifecycle.dispose();
            }
        }

        self.registry().unsubscribe(self.invalidation);
        self.registry().clear();
        self.catalog().clear();

        tracing::debug!(instances = count, "Container disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

impl Drop for Container {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl TryFrom<ContainerConfig> for Container {
    type Error = ContainerError;

    fn try_from(config: ContainerConfig) -> ContainerResult<Self> {
        Self::from_config(config)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::service::{Instance, ResolveError, Service};

    struct Logger;

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Service for Recorder {
        fn dispose(&self) {
            self.log.lock().push(self.name);
        }
    }

    fn logger() -> Implementation {
        Implementation::new("logger.console", |_| Ok(Instance::plain(Logger)))
    }

    #[test]
    fn test_builder_defaults() {
        let container = Container::builder().build().unwrap();
        assert!(container.is_strict());
        assert!(container.registry().is_empty());
        assert!(!container.is_disposed());
    }

    #[test]
    fn test_resolve_through_builder() {
        let container = Container::builder()
            .implementation(logger())
            .plugin(PluginDescriptor::new("log", "logger.console"))
            .build()
            .unwrap();

        let first = container.resolve("log").unwrap();
        let second = container.resolve("log").unwrap();
        assert!(first.same_as(&second));
        assert!(container.resolve_as::<Logger>("log").is_ok());
    }

    #[test]
    fn test_strict_eager_failure_aborts_build() {
        let result = Container::builder().eager("missing").build();
        assert!(matches!(
            result,
            Err(ContainerError::Resolve(ResolveError::UnresolvableRequired { .. }))
        ));
    }

    #[test]
    fn test_lenient_eager_failure_is_logged() {
        let container = Container::builder().strict(false).eager("missing").build().unwrap();
        assert!(container.index().is_empty());
    }

    #[test]
    fn test_invalid_block_pattern_fails_build() {
        let result = Container::builder().block("(").build();
        assert!(matches!(result, Err(ContainerError::Plugin(_))));
    }

    #[test]
    fn test_manifest_dir_must_be_directory() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let result = Container::builder().manifest_dir(file.path()).build();
        assert!(matches!(result, Err(ContainerError::Config(_))));
    }

    #[test]
    fn test_remove_plugin_drops_instance() {
        let container = Container::builder()
            .implementation(logger())
            .plugin(PluginDescriptor::new("log", "logger.console"))
            .build()
            .unwrap();
        container.resolve("log").unwrap();
        assert_eq!(container.index().len(), 1);

        let descriptor = container.registry().query(&"log".into()).remove(0);
        assert!(container.remove_plugin(&descriptor));
        assert!(container.index().is_empty());
    }

    #[test]
    fn test_remove_keeps_instance_still_registered_elsewhere() {
        let container = Container::builder()
            .implementation(logger())
            .plugin(PluginDescriptor::new("log", "logger.console"))
            .plugin(PluginDescriptor::new("sink", "logger.console"))
            .build()
            .unwrap();
        container.resolve("log").unwrap();

        let sink = container.registry().query(&"sink".into()).remove(0);
        container.remove_plugin(&sink);
        assert_eq!(container.index().len(), 1);
    }

    #[test]
    fn test_remove_resolved_descriptor_unfiles_instance() {
        let container = Container::builder()
            .implementation(logger())
            .plugin(PluginDescriptor::new("log", "logger.console"))
            .plugin(PluginDescriptor::new("sink", "logger.console"))
            .build()
            .unwrap();
        container.resolve("log").unwrap();

        let log = container.registry().query(&"log".into()).remove(0);
        assert!(container.remove_plugin(&log));

        assert!(container.registry().query(&"log".into()).is_empty());
        assert!(matches!(
            container.resolve("log"),
            Err(ResolveError::UnresolvableRequired { .. })
        ));
        assert_eq!(
            container.resolve("sink").unwrap().implementation().as_str(),
            "logger.console"
        );
    }

    #[test]
    fn test_remove_keeps_ancestor_backed_by_other_descriptor() {
        let container = Container::builder()
            .implementation(logger())
            .specialize("log.file", "log")
            .plugin(PluginDescriptor::new("log.file", "logger.console"))
            .plugin(PluginDescriptor::new("log", "logger.console"))
            .build()
            .unwrap();
        let live = container.resolve("log.file").unwrap();

        let file = container.registry().query(&"log.file".into()).remove(0);
        assert!(container.remove_plugin(&file));

        assert!(container.index().find(&"log.file".into(), &"logger.console".into()).is_none());
        assert!(container.resolve("log").unwrap().same_as(&live));
    }

    #[test]
    fn test_singleton_cache_is_shared() {
        let container = Container::builder().build().unwrap();
        let a = container.singleton_cache("tool");
        let b = container.singleton_cache("tool");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_dispose_order_and_idempotence() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (l1, l2) = (Arc::clone(&log), Arc::clone(&log));

        let container = Container::builder()
            .implementation(Implementation::new("store.mem", move |_| {
                Ok(Instance::service(Recorder { name: "store", log: Arc::clone(&l1) }))
            }))
            .implementation(
                Implementation::new("app.impl", move |_| {
                    Ok(Instance::service(Recorder { name: "app", log: Arc::clone(&l2) }))
                })
                .depends_on("store"),
            )
            .plugin(PluginDescriptor::new("store", "store.mem"))
            .plugin(PluginDescriptor::new("app", "app.impl"))
            .build()
            .unwrap();

        container.resolve("app").unwrap();
        container.dispose();
        container.dispose();

        assert_eq!(*log.lock(), vec!["app", "store"]);
        assert!(container.index().is_empty());
        assert!(container.registry().is_empty());
        assert!(matches!(container.resolve("app"), Err(ResolveError::Disposed)));
    }

    #[test]
    fn test_drop_disposes() {
        let disposed = Arc::new(AtomicUsize::new(0));

        struct Counted(Arc<AtomicUsize>);
        impl Service for Counted {
            fn dispose(&self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let counter = Arc::clone(&disposed);
        let container = Container::builder()
            .implementation(Implementation::new("counted", move |_| {
                Ok(Instance::service(Counted(Arc::clone(&counter))))
            }))
            .plugin(PluginDescriptor::new("svc", "counted"))
            .build()
            .unwrap();
        container.resolve("svc").unwrap();

        drop(container);
        assert_eq!(disposed.load(Ordering::SeqCst), 1);
    }
}
