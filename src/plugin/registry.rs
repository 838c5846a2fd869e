//! In-process registry of plugin descriptors.
//!
//! Descriptors are kept per capability in descending priority order, stable on
//! ties. Queries merge every capability assignable to the requested one and
//! drop blocked implementations. Add and remove notify subscribers once the
//! registry lock has been released, so listeners may query the registry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::{
    BlockList, Capability, CapabilityTree, ImplementationId, PluginDescriptor, PluginResult,
};

/// Change notification emitted by the registry.
#[derive(Debug, Clone)]
pub enum RegistryEvent {
    /// A descriptor was added.
    Added(Arc<PluginDescriptor>),
    /// A descriptor was removed.
    Removed(Arc<PluginDescriptor>),
}

impl RegistryEvent {
    /// The descriptor the event is about.
    pub fn descriptor(&self) -> &Arc<PluginDescriptor> {
        match self {
            Self::Added(d) | Self::Removed(d) => d,
        }
    }
}

/// Callback invoked for registry events.
pub type RegistryListener = Arc<dyn Fn(&RegistryEvent) + Send + Sync>;

/// Handle returned by [`PluginRegistry::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    /// `None` subscribes to every capability.
    capability: Option<Capability>,
    listener: RegistryListener,
}

#[derive(Debug)]
struct Entry {
    seq: u64,
    descriptor: Arc<PluginDescriptor>,
}

#[derive(Debug, Default)]
struct RegistryState {
    by_capability: HashMap<Capability, Vec<Entry>>,
    hierarchy: CapabilityTree,
    next_seq: u64,
}

impl RegistryState {
    /// Every live entry assignable to `capability`, sorted.
    fn matching(&self, capability: &Capability) -> Vec<&Entry> {
        let mut entries: Vec<&Entry> = self
            .by_capability
            .iter()
            .filter(|(c, _)| self.hierarchy.is_assignable(c, capability))
            .flat_map(|(_, list)| list.iter())
            .collect();
        entries.sort_by(|a, b| {
            b.descriptor.priority.cmp(&a.descriptor.priority).then(a.seq.cmp(&b.seq))
        });
        entries
    }
}

/// Registry of plugin descriptors, shared between readers and occasional writers.
pub struct PluginRegistry {
    state: RwLock<RegistryState>,
    blocklist: Arc<BlockList>,
    listeners: RwLock<Vec<Subscription>>,
    next_listener: AtomicU64,
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("descriptors", &self.len())
            .field("blocklist", &self.blocklist.patterns())
            .finish()
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginRegistry {
    /// Create an empty registry with an empty block list.
    pub fn new() -> Self {
        Self::with_blocklist(Arc::new(BlockList::new()))
    }

    /// Create an empty registry filtered by the given block list.
    pub fn with_blocklist(blocklist: Arc<BlockList>) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            blocklist,
            listeners: RwLock::new(Vec::new()),
            next_listener: AtomicU64::new(0),
        }
    }

    /// The block list consulted by [`query`](Self::query).
    pub fn blocklist(&self) -> &Arc<BlockList> {
        &self.blocklist
    }

    /// Descriptors compatible with `capability`, highest priority first.
    pub fn query(&self, capability: &Capability) -> Vec<Arc<PluginDescriptor>> {
        let state = self.state.read();
        state
            .matching(capability)
            .into_iter()
            .filter(|e| !self.blocklist.is_blocked(&e.descriptor.implementation))
            .map(|e| Arc::clone(&e.descriptor))
            .collect()
    }

    /// Whether any unblocked descriptor is compatible with `capability`.
    pub fn contains(&self, capability: &Capability) -> bool {
        !self.query(capability).is_empty()
    }

    /// Add a descriptor in sorted position and notify subscribers.
    pub fn add(&self, descriptor: PluginDescriptor) -> Arc<PluginDescriptor> {
        let descriptor = Arc::new(descriptor);
        {
            let mut state = self.state.write();
            let seq = state.next_seq;
            state.next_seq += 1;

            let list = state.by_capability.entry(descriptor.capability.clone()).or_default();
            // After every entry of equal or higher priority: stable on ties.
            let pos = list.partition_point(|e| e.descriptor.priority >= descriptor.priority);
            list.insert(pos, Entry { seq, descriptor: Arc::clone(&descriptor) });
        }

        tracing::debug!(
            capability = %descriptor.capability,
            implementation = %descriptor.implementation,
            priority = %descriptor.priority,
            "Plugin added"
        );
        self.notify(&RegistryEvent::Added(Arc::clone(&descriptor)));
        descriptor
    }

    /// Add several descriptors, returning their handles in input order.
    pub fn add_all(
        &self,
        descriptors: impl IntoIterator<Item = PluginDescriptor>,
    ) -> Vec<Arc<PluginDescriptor>> {
        descriptors.into_iter().map(|d| self.add(d)).collect()
    }

    /// Remove a descriptor by identity. Returns `false` if it was not registered.
    pub fn remove(&self, descriptor: &Arc<PluginDescriptor>) -> bool {
        let removed = {
            let mut state = self.state.write();
            let Some(list) = state.by_capability.get_mut(&descriptor.capability) else {
                return false;
            };
            let Some(pos) = list.iter().position(|e| Arc::ptr_eq(&e.descriptor, descriptor))
            else {
                return false;
            };
            let entry = list.remove(pos);
            if list.is_empty() {
                state.by_capability.remove(&descriptor.capability);
            }
            entry.descriptor
        };

        tracing::debug!(
            capability = %removed.capability,
            implementation = %removed.implementation,
            "Plugin removed"
        );
        self.notify(&RegistryEvent::Removed(Arc::clone(&removed)));
        true
    }

    /// Remove every descriptor naming `implementation`.
    pub fn remove_implementation(
        &self,
        implementation: &ImplementationId,
    ) -> Vec<Arc<PluginDescriptor>> {
        let targets: Vec<Arc<PluginDescriptor>> = {
            let state = self.state.read();
            state
                .by_capability
                .values()
                .flat_map(|list| list.iter())
                .filter(|e| &e.descriptor.implementation == implementation)
                .map(|e| Arc::clone(&e.descriptor))
                .collect()
        };

        targets.into_iter().filter(|d| self.remove(d)).collect()
    }

    /// Whether any descriptor, blocked or not, names `implementation`.
    pub fn has_implementation(&self, implementation: &ImplementationId) -> bool {
        self.state
            .read()
            .by_capability
            .values()
            .any(|list| list.iter().any(|e| &e.descriptor.implementation == implementation))
    }

    /// Every registered descriptor, blocked or not, grouped by capability name
    /// and sorted by priority within each group.
    pub fn descriptors(&self) -> Vec<Arc<PluginDescriptor>> {
        let state = self.state.read();
        let mut capabilities: Vec<&Capability> = state.by_capability.keys().collect();
        capabilities.sort();
        capabilities
            .into_iter()
            .flat_map(|c| state.by_capability[c].iter().map(|e| Arc::clone(&e.descriptor)))
            .collect()
    }

    /// Capabilities that have at least one descriptor, sorted by name.
    pub fn capabilities(&self) -> Vec<Capability> {
        let mut capabilities: Vec<Capability> =
            self.state.read().by_capability.keys().cloned().collect();
        capabilities.sort();
        capabilities
    }

    /// Declare `sub` a specialization of `sup`.
    pub fn declare_specialization(
        &self,
        sub: impl Into<Capability>,
        sup: impl Into<Capability>,
    ) -> PluginResult<()> {
        self.state.write().hierarchy.declare(sub.into(), sup.into())
    }

    /// Whether a plugin of capability `from` satisfies a request for `to`.
    pub fn is_assignable(&self, from: &Capability, to: &Capability) -> bool {
        self.state.read().hierarchy.is_assignable(from, to)
    }

    /// `capability` followed by all of its ancestors.
    pub fn ancestors(&self, capability: &Capability) -> Vec<Capability> {
        self.state.read().hierarchy.ancestors(capability)
    }

    /// Subscribe to events for descriptors assignable to `capability`.
    pub fn subscribe(&self, capability: Capability, listener: RegistryListener) -> SubscriptionId {
        self.push_listener(Some(capability), listener)
    }

    /// Subscribe to every event.
    pub fn subscribe_all(&self, listener: RegistryListener) -> SubscriptionId {
        self.push_listener(None, listener)
    }

    /// Drop a subscription. Returns `false` if it was unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|s| s.id != id);
        listeners.len() != before
    }

    /// Number of active subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Number of registered descriptors, including blocked ones.
    pub fn len(&self) -> usize {
        self.state.read().by_capability.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every descriptor and specialization without notifying anyone.
    pub fn clear(&self) {
        let mut state = self.state.write();
        state.by_capability.clear();
        state.hierarchy.clear();
    }

    fn push_listener(
        &self,
        capability: Option<Capability>,
        listener: RegistryListener,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push(Subscription { id, capability, listener });
        id
    }

    fn notify(&self, event: &RegistryEvent) {
        let capability = &event.descriptor().capability;
        let interested: Vec<RegistryListener> = {
            let listeners = self.listeners.read();
            let state = self.state.read();
            listeners
                .iter()
                .filter(|s| match &s.capability {
                    Some(c) => state.hierarchy.is_assignable(capability, c),
                    None => true,
                })
                .map(|s| Arc::clone(&s.listener))
                .collect()
        };

        for listener in interested {
            listener(event);
        }
    }
}
