//! Memoized "every implementation of X" view.
//!
//! Menus, tool bars and similar consumers want all implementations of a
//! capability, built once and keyed by name. The cache builds them through the
//! engine on first read and forgets them whenever the registry reports a change
//! for the capability or the block list is edited; the next read rebuilds.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use arc_swap::ArcSwapOption;

use super::{LiveInstance, ResolutionEngine};
use crate::plugin::{Capability, ImplementationId, RegistryEvent, SubscriptionId};

struct Snapshot {
    generation: u64,
    blocklist: u64,
    instances: Arc<[LiveInstance]>,
    by_name: HashMap<String, LiveInstance>,
    names: Vec<String>,
}

impl Snapshot {
    fn build(generation: u64, blocklist: u64, instances: Vec<LiveInstance>) -> Self {
        let mut by_name: HashMap<String, LiveInstance> = HashMap::new();
        let mut names = Vec::new();
        for live in &instances {
            if live.name().is_empty() || by_name.contains_key(live.name()) {
                continue;
            }
            names.push(live.name().to_string());
            by_name.insert(live.name().to_string(), live.clone());
        }
        Self { generation, blocklist, instances: instances.into(), by_name, names }
    }
}

/// Lazily populated, invalidation-aware set of all instances of a capability.
pub struct SingletonCapabilityCache {
    capability: Capability,
    engine: Arc<ResolutionEngine>,
    snapshot: ArcSwapOption<Snapshot>,
    generation: AtomicU64,
    subscription: SubscriptionId,
}

impl std::fmt::Debug for SingletonCapabilityCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingletonCapabilityCache")
            .field("capability", &self.capability)
            .field("populated", &self.is_populated())
            .finish()
    }
}

impl SingletonCapabilityCache {
    /// Create a cache for `capability` and subscribe it to registry changes.
    pub fn new(engine: Arc<ResolutionEngine>, capability: Capability) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let weak = weak.clone();
            let subscription = engine.registry().subscribe(
                capability.clone(),
                Arc::new(move |_: &RegistryEvent| {
                    if let Some(cache) = weak.upgrade() {
                        cache.invalidate();
                    }
                }),
            );
            Self {
                capability,
                engine,
                snapshot: ArcSwapOption::empty(),
                generation: AtomicU64::new(0),
                subscription,
            }
        })
    }

    pub fn capability(&self) -> &Capability {
        &self.capability
    }

    /// Every instance of the capability, highest priority first.
    pub fn instances(&self) -> Arc<[LiveInstance]> {
        Arc::clone(&self.current().instances)
    }

    /// Instance registered under `name`; the first one wins on collisions.
    pub fn get(&self, name: &str) -> Option<LiveInstance> {
        self.current().by_name.get(name).cloned()
    }

    /// Names in priority order.
    pub fn names(&self) -> Vec<String> {
        self.current().names.clone()
    }

    /// The cached instance built from `implementation`.
    pub fn instance_of(&self, implementation: &ImplementationId) -> Option<LiveInstance> {
        self.current().instances.iter().find(|l| l.implementation() == implementation).cloned()
    }

    /// Forget the memoized set; the next read rebuilds it.
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.snapshot.store(None);
        tracing::debug!(capability = %self.capability, "Singleton cache invalidated");
    }

    /// Whether a read would be served without rebuilding.
    pub fn is_populated(&self) -> bool {
        self.fresh().is_some()
    }

    fn fresh(&self) -> Option<Arc<Snapshot>> {
        let generation = self.generation.load(Ordering::Acquire);
        let blocklist = self.engine.registry().blocklist().version();
        self.snapshot
            .load_full()
            .filter(|snap| snap.generation == generation && snap.blocklist == blocklist)
    }

    fn current(&self) -> Arc<Snapshot> {
        if let Some(snap) = self.fresh() {
            return snap;
        }

        // Snapshots built from a registry state that changed meanwhile carry a
        // stale generation and are rebuilt on the next read.
        let generation = self.generation.load(Ordering::Acquire);
        let blocklist = self.engine.registry().blocklist().version();
        let report = self.engine.resolve_all(&self.capability);
        let snap = Arc::new(Snapshot::build(generation, blocklist, report.resolved));
        self.snapshot.store(Some(Arc::clone(&snap)));

        tracing::debug!(
            capability = %self.capability,
            instances = snap.instances.len(),
            failures = report.failures.len(),
            "Singleton cache populated"
        );
        snap
    }
}

impl Drop for SingletonCapabilityCache {
    fn drop(&mut self) {
        self.engine.registry().unsubscribe(self.subscription);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::plugin::{PluginDescriptor, PluginRegistry};
    use crate::service::{Catalog, Implementation, Instance, InstanceIndex, ResolutionPolicy};

    struct Tool(&'static str);

    fn engine() -> Arc<ResolutionEngine> {
        Arc::new(ResolutionEngine::new(
            Arc::new(PluginRegistry::new()),
            Arc::new(InstanceIndex::new()),
            Arc::new(Catalog::new()),
            ResolutionPolicy::strict(),
        ))
    }

    fn tool(engine: &ResolutionEngine, id: &'static str, name: &str, priority: f64) -> Arc<PluginDescriptor> {
        engine.catalog().register(Implementation::new(id, move |_| Ok(Instance::plain(Tool(id)))));
        engine
            .registry()
            .add(PluginDescriptor::new("tool", id).with_name(name).with_priority(priority))
    }

    fn ids(instances: &[LiveInstance]) -> Vec<&str> {
        instances.iter().map(|l| l.implementation().as_str()).collect()
    }

    #[test]
    fn test_populates_all_in_priority_order() {
        let engine = engine();
        tool(&engine, "pencil", "Pencil", 0.0);
        tool(&engine, "brush", "Brush", 10.0);
        let cache = SingletonCapabilityCache::new(Arc::clone(&engine), "tool".into());

        assert!(!cache.is_populated());
        assert_eq!(ids(&cache.instances()), vec!["brush", "pencil"]);
        assert!(cache.is_populated());
        assert_eq!(cache.names(), vec!["Brush".to_string(), "Pencil".to_string()]);
        assert_eq!(cache.get("Pencil").unwrap().downcast::<Tool>().unwrap().0, "pencil");
        assert!(cache.instance_of(&"brush".into()).is_some());
    }

    #[test]
    fn test_memoized_until_change() {
        let engine = engine();
        tool(&engine, "pencil", "Pencil", 0.0);
        let cache = SingletonCapabilityCache::new(Arc::clone(&engine), "tool".into());

        let first = cache.instances();
        let second = cache.instances();
        assert!(Arc::ptr_eq(&first, &second));

        tool(&engine, "eraser", "Eraser", 5.0);
        assert!(!cache.is_populated());
        assert_eq!(ids(&cache.instances()), vec!["eraser", "pencil"]);
        // Pencil was not rebuilt.
        assert!(first[0].same_as(&cache.instance_of(&"pencil".into()).unwrap()));
    }

    #[test]
    fn test_remove_drops_implementation() {
        let engine = engine();
        tool(&engine, "pencil", "Pencil", 0.0);
        let brush = tool(&engine, "brush", "Brush", 10.0);
        let cache = SingletonCapabilityCache::new(Arc::clone(&engine), "tool".into());
        assert_eq!(cache.instances().len(), 2);

        engine.registry().remove(&brush);
        assert_eq!(ids(&cache.instances()), vec!["pencil"]);
        assert!(cache.get("Brush").is_none());
    }

    #[test]
    fn test_blocklist_edit_refreshes_view() {
        let engine = engine();
        tool(&engine, "tool.a", "A", 10.0);
        tool(&engine, "tool.b", "B", 0.0);
        let cache = SingletonCapabilityCache::new(Arc::clone(&engine), "tool".into());
        assert_eq!(cache.instances().len(), 2);

        engine.registry().blocklist().push("tool\\.b").unwrap();
        assert!(!cache.is_populated());
        assert_eq!(ids(&cache.instances()), vec!["tool.a"]);
        assert!(cache.get("B").is_none());

        engine.registry().blocklist().clear();
        assert_eq!(ids(&cache.instances()), vec!["tool.a", "tool.b"]);
    }

    #[test]
    fn test_name_collision_first_wins() {
        let engine = engine();
        tool(&engine, "a", "Same", 10.0);
        tool(&engine, "b", "Same", 0.0);
        tool(&engine, "c", "", 0.0);
        let cache = SingletonCapabilityCache::new(Arc::clone(&engine), "tool".into());

        assert_eq!(cache.get("Same").unwrap().implementation().as_str(), "a");
        assert_eq!(cache.names(), vec!["Same".to_string()]);
        assert_eq!(cache.instances().len(), 3);
    }

    #[test]
    fn test_notifications_collapse() {
        let engine = engine();
        let builds = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&builds);
        engine.catalog().register(Implementation::new("counted", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Instance::plain(Tool("counted")))
        }));
        engine.registry().add(PluginDescriptor::new("tool", "counted"));
        let cache = SingletonCapabilityCache::new(Arc::clone(&engine), "tool".into());
        cache.instances();

        cache.invalidate();
        cache.invalidate();
        cache.invalidate();
        assert_eq!(cache.instances().len(), 1);
        // Invalidation forgets the view, not the instances.
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let engine = engine();
        let cache = SingletonCapabilityCache::new(Arc::clone(&engine), "tool".into());
        assert_eq!(engine.registry().subscriber_count(), 1);

        drop(cache);
        assert_eq!(engine.registry().subscriber_count(), 0);
    }
}
