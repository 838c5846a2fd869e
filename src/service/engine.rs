//! Recursive service resolution.
//!
//! The engine turns a capability request into a live instance: reuse what the
//! [`InstanceIndex`] already holds, otherwise pick the best descriptor from the
//! [`PluginRegistry`], resolve its declared dependencies depth-first, build it,
//! run its hooks and publish it in the index.
//!
//! Two independent knobs decide what happens when something is missing: the
//! dependency's own `required` flag, and the container-wide `strict` flag. A
//! missing required dependency aborts in strict mode and degrades to an absent
//! binding (with a warning) in lenient mode. Cycles always abort.

use std::any::{type_name, Any};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::ReentrantMutex;

use super::{
    Catalog, Dependencies, Implementation, InstanceIndex, LiveInstance, Provenance,
    ResolutionChain, ResolveError, ResolveResult,
};
use crate::plugin::{Capability, PluginDescriptor, PluginRegistry, Priority};

/// Failure policy applied during resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolutionPolicy {
    /// Abort when a required dependency cannot be satisfied.
    pub strict: bool,
    /// Try the next candidate when the best one fails to build.
    pub fallback_on_failure: bool,
}

impl Default for ResolutionPolicy {
    fn default() -> Self {
        Self { strict: true, fallback_on_failure: false }
    }
}

impl ResolutionPolicy {
    pub fn strict() -> Self {
        Self::default()
    }

    pub fn lenient() -> Self {
        Self { strict: false, ..Self::default() }
    }
}

/// Outcome of resolving every descriptor of a capability.
#[derive(Debug, Default)]
pub struct ResolutionReport {
    /// Live instances, in registry order.
    pub resolved: Vec<LiveInstance>,
    /// Descriptors that could not be built.
    pub failures: Vec<(Arc<PluginDescriptor>, ResolveError)>,
}

impl ResolutionReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Builds services and their dependencies on demand.
pub struct ResolutionEngine {
    registry: Arc<PluginRegistry>,
    index: Arc<InstanceIndex>,
    catalog: Arc<Catalog>,
    policy: ResolutionPolicy,
    /// Serializes construction. Reentrant so a thread can recurse into
    /// dependencies while holding it.
    construction: ReentrantMutex<()>,
    disposed: AtomicBool,
}

impl std::fmt::Debug for ResolutionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolutionEngine")
            .field("policy", &self.policy)
            .field("instances", &self.index.len())
            .finish()
    }
}

impl ResolutionEngine {
    pub fn new(
        registry: Arc<PluginRegistry>,
        index: Arc<InstanceIndex>,
        catalog: Arc<Catalog>,
        policy: ResolutionPolicy,
    ) -> Self {
        Self {
            registry,
            index,
            catalog,
            policy,
            construction: ReentrantMutex::new(()),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    pub fn index(&self) -> &Arc<InstanceIndex> {
        &self.index
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn policy(&self) -> ResolutionPolicy {
        self.policy
    }

    /// Resolve `capability`, building it and its dependencies if needed.
    pub fn resolve(&self, capability: &Capability) -> ResolveResult<LiveInstance> {
        let mut chain = ResolutionChain::new();
        self.load(capability, &mut chain)
    }

    /// Resolve `capability` as an optional request: anything but a fatal error
    /// yields `None`.
    pub fn resolve_optional(&self, capability: &Capability) -> ResolveResult<Option<LiveInstance>> {
        match self.resolve(capability) {
            Ok(live) => Ok(Some(live)),
            Err(e) if e.is_fatal() => Err(e),
            Err(ResolveError::UnresolvableRequired { .. }) => Ok(None),
            Err(e) => {
                tracing::warn!(capability = %capability, error = %e, "Optional service unavailable");
                Ok(None)
            }
        }
    }

    /// Resolve `capability` and downcast the instance to `T`.
    pub fn resolve_as<T: Any + Send + Sync>(&self, capability: &Capability) -> ResolveResult<Arc<T>> {
        let live = self.resolve(capability)?;
        live.downcast::<T>().ok_or_else(|| ResolveError::TypeMismatch {
            capability: capability.clone(),
            implementation: live.implementation().clone(),
            expected: type_name::<T>(),
            actual: live.instance().type_name(),
        })
    }

    /// Build exactly the implementation named by `descriptor`, or return its
    /// live instance.
    pub fn resolve_descriptor(&self, descriptor: &PluginDescriptor) -> ResolveResult<LiveInstance> {
        self.ensure_live()?;
        if let Some(live) = self.index.find(&descriptor.capability, &descriptor.implementation) {
            return Ok(live);
        }

        let _guard = self.construction.lock();
        let mut chain = ResolutionChain::new();
        chain.push(descriptor.capability.clone());
        self.create_exact(Provenance::from(descriptor), &mut chain)
    }

    /// Build every descriptor of `capability`, isolating failures.
    pub fn resolve_all(&self, capability: &Capability) -> ResolutionReport {
        let mut report = ResolutionReport::default();

        for descriptor in self.registry.query(capability) {
            match self.resolve_descriptor(&descriptor) {
                Ok(live) => report.resolved.push(live),
                Err(e) => {
                    tracing::warn!(
                        capability = %capability,
                        implementation = %descriptor.implementation,
                        error = %e,
                        "Skipping invalid plugin"
                    );
                    report.failures.push((descriptor, e));
                }
            }
        }

        report
    }

    /// Refuse any further resolution.
    pub(crate) fn shut_down(&self) {
        // Wait for in-flight construction so nothing is published afterwards.
        let _guard = self.construction.lock();
        self.disposed.store(true, Ordering::SeqCst);
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    fn ensure_live(&self) -> ResolveResult<()> {
        if self.is_disposed() {
            return Err(ResolveError::Disposed);
        }
        Ok(())
    }

    fn load(&self, capability: &Capability, chain: &mut ResolutionChain) -> ResolveResult<LiveInstance> {
        self.ensure_live()?;
        if chain.contains(capability) {
            return Err(ResolveError::CycleDetected { chain: chain.with(capability) });
        }

        if let Some(live) = self.existing(capability) {
            return Ok(live);
        }

        let _guard = self.construction.lock();
        // Another thread may have finished while we waited.
        if let Some(live) = self.existing(capability) {
            return Ok(live);
        }
        self.ensure_live()?;

        chain.push(capability.clone());
        let result = self.load_candidates(capability, chain);
        chain.pop();
        result
    }

    /// Best live instance for `capability` whose implementation is not blocked.
    fn existing(&self, capability: &Capability) -> Option<LiveInstance> {
        let blocklist = self.registry.blocklist();
        if blocklist.is_empty() {
            return self.index.get_first(capability);
        }
        self.index
            .get(capability)
            .into_iter()
            .find(|live| !blocklist.is_blocked(live.implementation()))
    }

    fn load_candidates(
        &self,
        capability: &Capability,
        chain: &mut ResolutionChain,
    ) -> ResolveResult<LiveInstance> {
        let mut failure = None;

        for descriptor in self.registry.query(capability) {
            match self.create_exact(Provenance::from(descriptor.as_ref()), chain) {
                Ok(live) => return Ok(live),
                Err(e) if e.is_fatal() || !self.policy.fallback_on_failure => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        capability = %capability,
                        implementation = %descriptor.implementation,
                        error = %e,
                        "Plugin failed, trying next candidate"
                    );
                    failure = Some(e);
                }
            }
        }

        if let Some(e) = failure {
            return Err(e);
        }

        if let Some(default) = self.catalog.default_for(capability) {
            let provenance =
                Provenance::new(capability.clone(), default.id().clone(), "", Priority::NORMAL);
            return self.build(&default, provenance, chain);
        }

        Err(ResolveError::UnresolvableRequired {
            capability: capability.clone(),
            chain: chain.clone(),
        })
    }

    fn create_exact(
        &self,
        provenance: Provenance,
        chain: &mut ResolutionChain,
    ) -> ResolveResult<LiveInstance> {
        if let Some(live) = self.index.find(&provenance.capability, &provenance.implementation) {
            return Ok(live);
        }

        let Some(implementation) = self.catalog.get(&provenance.implementation) else {
            return Err(ResolveError::ConstructionFailure {
                capability: provenance.capability,
                implementation: provenance.implementation,
                reason: "implementation is not registered".to_string(),
                chain: chain.clone(),
            });
        };

        self.build(&implementation, provenance, chain)
    }

    fn build(
        &self,
        implementation: &Implementation,
        provenance: Provenance,
        chain: &mut ResolutionChain,
    ) -> ResolveResult<LiveInstance> {
        let dependencies = self.bind_dependencies(implementation, chain)?;

        let failure = |reason: String| ResolveError::ConstructionFailure {
            capability: provenance.capability.clone(),
            implementation: provenance.implementation.clone(),
            reason,
            chain: chain.clone(),
        };

        let instance = implementation.construct(&dependencies).map_err(|e| failure(format!("{e:#}")))?;

        // Hooks run before publication; notifications strictly after init.
        if let Some(lifecycle) = instance.lifecycle() {
            lifecycle
                .initialize()
                .map_err(|e| failure(format!("initialization failed: {e:#}")))?;
            lifecycle.register_notifications(&self.registry);
        }

        let keys = self.registry.ancestors(&provenance.capability);
        let live = self.index.add(instance, provenance, &keys);

        tracing::debug!(
            capability = %live.capability(),
            implementation = %live.implementation(),
            priority = %live.priority(),
            chain = %chain,
            "Service constructed"
        );
        Ok(live)
    }

    fn bind_dependencies(
        &self,
        implementation: &Implementation,
        chain: &mut ResolutionChain,
    ) -> ResolveResult<Dependencies> {
        let mut dependencies = Dependencies::new();

        for dependency in implementation.dependencies() {
            let value = match self.load(&dependency.capability, chain) {
                Ok(live) => Some(live),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) if dependency.required && self.policy.strict => return Err(e),
                Err(e) if dependency.required => {
                    tracing::warn!(
                        implementation = %implementation.id(),
                        dependency = %dependency.capability,
                        chain = %chain,
                        error = %e,
                        "Required dependency unavailable, binding absent"
                    );
                    None
                }
                Err(e) => {
                    tracing::debug!(
                        implementation = %implementation.id(),
                        dependency = %dependency.capability,
                        error = %e,
                        "Optional dependency unavailable"
                    );
                    None
                }
            };
            dependencies.bind(dependency.clone(), value);
        }

        Ok(dependencies)
    }
}
