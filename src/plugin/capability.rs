//! Capability specialization hierarchy.
//!
//! Capabilities are plain identifiers, so "is a specialization of" has to be
//! declared explicitly. A query for `app.service` also matches descriptors of
//! `app.display` once `app.display` has been declared to extend `app.service`.

use std::collections::{HashMap, HashSet, VecDeque};

use super::{Capability, PluginError, PluginResult};

/// Directed acyclic "extends" relation between capabilities.
#[derive(Debug, Clone, Default)]
pub struct CapabilityTree {
    parents: HashMap<Capability, Vec<Capability>>,
}

impl CapabilityTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `sub` a specialization of `sup`.
    ///
    /// Declaring the same edge twice is a no-op. Edges that would close a cycle
    /// are rejected.
    pub fn declare(&mut self, sub: Capability, sup: Capability) -> PluginResult<()> {
        if sub == sup || self.is_assignable(&sup, &sub) {
            return Err(PluginError::HierarchyCycle { sub, sup });
        }

        let parents = self.parents.entry(sub).or_default();
        if !parents.contains(&sup) {
            parents.push(sup);
        }
        Ok(())
    }

    /// Whether a plugin of capability `from` satisfies a request for `to`.
    pub fn is_assignable(&self, from: &Capability, to: &Capability) -> bool {
        if from == to {
            return true;
        }
        self.ancestors(from).iter().any(|c| c == to)
    }

    /// `capability` followed by all of its ancestors, breadth first.
    pub fn ancestors(&self, capability: &Capability) -> Vec<Capability> {
        let mut seen = HashSet::new();
        let mut order = Vec::new();
        let mut queue = VecDeque::from([capability.clone()]);

        while let Some(current) = queue.pop_front() {
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Some(parents) = self.parents.get(&current) {
                queue.extend(parents.iter().cloned());
            }
            order.push(current);
        }

        order
    }

    /// Direct parents of a capability.
    pub fn parents(&self, capability: &Capability) -> &[Capability] {
        self.parents.get(capability).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn clear(&mut self) {
        self.parents.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cap(s: &str) -> Capability {
        Capability::from(s)
    }

    #[test]
    fn test_assignable_transitively() {
        let mut tree = CapabilityTree::new();
        tree.declare(cap("display.swing"), cap("display")).unwrap();
        tree.declare(cap("display"), cap("service")).unwrap();

        assert!(tree.is_assignable(&cap("display.swing"), &cap("service")));
        assert!(tree.is_assignable(&cap("display"), &cap("display")));
        assert!(!tree.is_assignable(&cap("service"), &cap("display")));
    }

    #[test]
    fn test_ancestors_order() {
        let mut tree = CapabilityTree::new();
        tree.declare(cap("c"), cap("b")).unwrap();
        tree.declare(cap("b"), cap("a")).unwrap();

        assert_eq!(tree.ancestors(&cap("c")), vec![cap("c"), cap("b"), cap("a")]);
        assert_eq!(tree.ancestors(&cap("z")), vec![cap("z")]);
    }

    #[test]
    fn test_diamond_lists_each_ancestor_once() {
        let mut tree = CapabilityTree::new();
        tree.declare(cap("d"), cap("b")).unwrap();
        tree.declare(cap("d"), cap("c")).unwrap();
        tree.declare(cap("b"), cap("a")).unwrap();
        tree.declare(cap("c"), cap("a")).unwrap();

        let ancestors = tree.ancestors(&cap("d"));
        assert_eq!(ancestors.len(), 4);
        assert_eq!(ancestors.iter().filter(|c| **c == cap("a")).count(), 1);
    }

    #[test]
    fn test_cycle_rejected() {
        let mut tree = CapabilityTree::new();
        tree.declare(cap("b"), cap("a")).unwrap();

        assert!(matches!(
            tree.declare(cap("a"), cap("b")),
            Err(PluginError::HierarchyCycle { .. })
        ));
        assert!(tree.declare(cap("a"), cap("a")).is_err());
    }

    #[test]
    fn test_duplicate_edge_is_noop() {
        let mut tree = CapabilityTree::new();
        tree.declare(cap("b"), cap("a")).unwrap();
        tree.declare(cap("b"), cap("a")).unwrap();

        assert_eq!(tree.parents(&cap("b")), &[cap("a")]);
    }
}
