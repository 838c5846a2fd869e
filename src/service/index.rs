//! Index of live instances, ordered like the registry.
//!
//! An instance is filed under the capability of the descriptor it was built
//! from and under every ancestor of that capability, so a request for a
//! general capability finds instances built for specific ones.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use super::Instance;
use crate::plugin::{Capability, ImplementationId, PluginDescriptor, Priority};

/// Where a live instance came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Provenance {
    pub capability: Capability,
    pub implementation: ImplementationId,
    pub name: String,
    pub priority: Priority,
}

impl Provenance {
    pub fn new(
        capability: impl Into<Capability>,
        implementation: impl Into<ImplementationId>,
        name: impl Into<String>,
        priority: Priority,
    ) -> Self {
        Self {
            capability: capability.into(),
            implementation: implementation.into(),
            name: name.into(),
            priority,
        }
    }
}

impl From<&PluginDescriptor> for Provenance {
    fn from(descriptor: &PluginDescriptor) -> Self {
        Self {
            capability: descriptor.capability.clone(),
            implementation: descriptor.implementation.clone(),
            name: descriptor.name.clone(),
            priority: descriptor.priority,
        }
    }
}

/// A constructed instance together with its provenance.
#[derive(Clone)]
pub struct LiveInstance {
    instance: Instance,
    provenance: Arc<Provenance>,
    seq: u64,
}

impl fmt::Debug for LiveInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveInstance")
            .field("implementation", &self.provenance.implementation)
            .field("capability", &self.provenance.capability)
            .field("priority", &self.provenance.priority)
            .finish()
    }
}

impl LiveInstance {
    pub(crate) fn new(instance: Instance, provenance: Provenance, seq: u64) -> Self {
        Self { instance, provenance: Arc::new(provenance), seq }
    }

    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    pub fn implementation(&self) -> &ImplementationId {
        &self.provenance.implementation
    }

    pub fn capability(&self) -> &Capability {
        &self.provenance.capability
    }

    pub fn priority(&self) -> Priority {
        self.provenance.priority
    }

    pub fn name(&self) -> &str {
        &self.provenance.name
    }

    /// Shortcut for `instance().downcast()`.
    pub fn downcast<T: std::any::Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.instance.downcast::<T>()
    }

    /// Whether both refer to the same object.
    pub fn same_as(&self, other: &Self) -> bool {
        self.instance.ptr_eq(&other.instance)
    }
}

#[derive(Default)]
struct IndexState {
    by_capability: HashMap<Capability, Vec<LiveInstance>>,
    next_seq: u64,
}

/// Live instances per capability, highest priority first.
#[derive(Default)]
pub struct InstanceIndex {
    state: RwLock<IndexState>,
}

impl fmt::Debug for InstanceIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceIndex").field("instances", &self.len()).finish()
    }
}

impl InstanceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Instances compatible with `capability`, by descending priority.
    pub fn get(&self, capability: &Capability) -> Vec<LiveInstance> {
        self.state.read().by_capability.get(capability).cloned().unwrap_or_default()
    }

    /// Highest-priority instance compatible with `capability`.
    pub fn get_first(&self, capability: &Capability) -> Option<LiveInstance> {
        self.state.read().by_capability.get(capability).and_then(|list| list.first().cloned())
    }

    /// The instance `offset` positions away from `reference` in
    /// [`get`](Self::get) order: `+1` is the next lower priority, `-1` the next
    /// higher one.
    pub fn get_relative(
        &self,
        capability: &Capability,
        reference: &ImplementationId,
        offset: isize,
    ) -> Option<LiveInstance> {
        let state = self.state.read();
        let list = state.by_capability.get(capability)?;
        let pos = list.iter().position(|live| live.implementation() == reference)?;
        let target = pos.checked_add_signed(offset)?;
        list.get(target).cloned()
    }

    /// The instance built from `implementation`, if filed under `capability`.
    pub fn find(
        &self,
        capability: &Capability,
        implementation: &ImplementationId,
    ) -> Option<LiveInstance> {
        self.state
            .read()
            .by_capability
            .get(capability)?
            .iter()
            .find(|live| live.implementation() == implementation)
            .cloned()
    }

    /// File `instance` under each of `keys` in sorted position.
    ///
    /// If the implementation is already indexed under the first key, the
    /// existing entry is returned and nothing is inserted.
    pub fn add(&self, instance: Instance, provenance: Provenance, keys: &[Capability]) -> LiveInstance {
        let mut state = self.state.write();

        if let Some(existing) = keys.first().and_then(|key| {
            state.by_capability.get(key).and_then(|list| {
                list.iter().find(|live| live.implementation() == &provenance.implementation)
            })
        }) {
            return existing.clone();
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        let live = LiveInstance::new(instance, provenance, seq);

        for key in keys {
            let list = state.by_capability.entry(key.clone()).or_default();
            if list.iter().any(|l| l.implementation() == live.implementation()) {
                continue;
            }
            let pos = list.partition_point(|l| l.priority() >= live.priority());
            list.insert(pos, live.clone());
        }

        live
    }

    /// Unfile `implementation` from each of `keys`. Returns the instances
    /// that are no longer filed under any key.
    pub fn remove(&self, implementation: &ImplementationId, keys: &[Capability]) -> Vec<LiveInstance> {
        let mut state = self.state.write();
        let mut unfiled: Vec<LiveInstance> = Vec::new();

        for key in keys {
            let Some(list) = state.by_capability.get_mut(key) else {
                continue;
            };
            list.retain(|live| {
                if live.implementation() != implementation {
                    return true;
                }
                if !unfiled.iter().any(|u| u.seq == live.seq) {
                    unfiled.push(live.clone());
                }
                false
            });
            if list.is_empty() {
                state.by_capability.remove(key);
            }
        }

        unfiled.retain(|gone| {
            !state.by_capability.values().flatten().any(|live| live.seq == gone.seq)
        });
        unfiled
    }

    /// Remove every instance built from `implementation`.
    pub fn remove_all_of_type(&self, implementation: &ImplementationId) -> Vec<LiveInstance> {
        let mut state = self.state.write();
        let mut removed: Vec<LiveInstance> = Vec::new();

        state.by_capability.retain(|_, list| {
            list.retain(|live| {
                if live.implementation() != implementation {
                    return true;
                }
                if !removed.iter().any(|r| r.seq == live.seq) {
                    removed.push(live.clone());
                }
                false
            });
            !list.is_empty()
        });

        removed
    }

    /// Empty the index, returning each instance once, most recently
    /// constructed first. Dependents are always built after their
    /// dependencies, so this is a safe teardown order.
    pub fn drain(&self) -> Vec<LiveInstance> {
        let mut state = self.state.write();
        let mut seen = HashSet::new();
        let mut all: Vec<LiveInstance> = state
            .by_capability
            .drain()
            .flat_map(|(_, list)| list)
            .filter(|live| seen.insert(live.seq))
            .collect();
        all.sort_by(|a, b| b.seq.cmp(&a.seq));
        all
    }

    /// Number of distinct live instances.
    pub fn len(&self) -> usize {
        let state = self.state.read();
        state
            .by_capability
            .values()
            .flat_map(|list| list.iter().map(|l| l.seq))
            .collect::<HashSet<_>>()
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().by_capability.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    fn add(index: &InstanceIndex, capability: &str, implementation: &'static str, priority: f64) -> LiveInstance {
        index.add(
            Instance::plain(Named(implementation)),
            Provenance::new(capability, implementation, implementation, Priority::new(priority)),
            &[Capability::from(capability)],
        )
    }

    fn names(list: &[LiveInstance]) -> Vec<&str> {
        list.iter().map(|l| l.implementation().as_str()).collect()
    }

    fn abc() -> InstanceIndex {
        let index = InstanceIndex::new();
        add(&index, "t", "b", 20.0);
        add(&index, "t", "c", 10.0);
        add(&index, "t", "a", 30.0);
        index
    }

    #[test]
    fn test_sorted_by_priority() {
        let index = abc();
        assert_eq!(names(&index.get(&"t".into())), vec!["a", "b", "c"]);
        assert_eq!(index.get_first(&"t".into()).unwrap().implementation().as_str(), "a");
    }

    #[test]
    fn test_ties_keep_first_registration() {
        let index = InstanceIndex::new();
        add(&index, "t", "one", 1.0);
        add(&index, "t", "two", 1.0);

        assert_eq!(names(&index.get(&"t".into())), vec!["one", "two"]);
    }

    #[test]
    fn test_get_relative() {
        let index = abc();
        let t = Capability::from("t");

        let next = index.get_relative(&t, &"b".into(), 1).unwrap();
        assert_eq!(next.implementation().as_str(), "c");

        let prev = index.get_relative(&t, &"b".into(), -1).unwrap();
        assert_eq!(prev.implementation().as_str(), "a");

        assert!(index.get_relative(&t, &"c".into(), 1).is_none());
        assert!(index.get_relative(&t, &"a".into(), -1).is_none());
        assert!(index.get_relative(&t, &"missing".into(), 1).is_none());
        assert_eq!(index.get_relative(&t, &"a".into(), 0).unwrap().implementation().as_str(), "a");
    }

    #[test]
    fn test_add_is_idempotent_per_implementation() {
        let index = InstanceIndex::new();
        let first = add(&index, "t", "x", 0.0);
        let second = add(&index, "t", "x", 0.0);

        assert!(first.same_as(&second));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_multiple_keys() {
        let index = InstanceIndex::new();
        let keys = [Capability::from("display.swing"), Capability::from("display")];
        index.add(
            Instance::plain(Named("swing")),
            Provenance::new("display.swing", "swing", "", Priority::NORMAL),
            &keys,
        );

        assert!(index.get_first(&"display".into()).is_some());
        assert!(index.find(&"display.swing".into(), &"swing".into()).is_some());
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_remove_all_of_type() {
        let index = abc();
        let removed = index.remove_all_of_type(&"b".into());

        assert_eq!(removed.len(), 1);
        assert_eq!(names(&index.get(&"t".into())), vec!["a", "c"]);
        assert!(index.remove_all_of_type(&"b".into()).is_empty());
    }

    #[test]
    fn test_remove_from_some_keys() {
        let index = InstanceIndex::new();
        let keys = [Capability::from("display.swing"), Capability::from("display")];
        index.add(
            Instance::plain(Named("swing")),
            Provenance::new("display.swing", "swing", "", Priority::NORMAL),
            &keys,
        );

        assert!(index.remove(&"swing".into(), &keys[1..]).is_empty());
        assert!(index.get_first(&"display".into()).is_none());
        assert!(index.find(&"display.swing".into(), &"swing".into()).is_some());

        let gone = index.remove(&"swing".into(), &keys[..1]);
        assert_eq!(names(&gone), vec!["swing"]);
        assert!(index.is_empty());
    }

    #[test]
    fn test_drain_latest_first() {
        let index = abc();
        let drained = index.drain();

        assert_eq!(names(&drained), vec!["a", "c", "b"]);
        assert!(index.is_empty());
    }
}
