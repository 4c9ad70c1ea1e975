use crate::graph::NodeId;
use crate::intset::{IntSet, SortedIntSet};
use crate::lattice::JoinSemiLattice;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// What one statement evaluation added to the [`PointsToGraph`](crate::graph::PointsToGraph).
///
/// Only [`PointsToGraph`](crate::graph::PointsToGraph) operations create non-empty deltas, and
/// they only ever record edges that were not in the graph before, so a delta is exactly the
/// growth its producer caused. Dependent statements consume deltas instead of rescanning
/// whole points-to sets.
///
/// Deltas form a join semi-lattice under [`combine`](GraphDelta::combine): the order is edge
/// set inclusion and the empty delta is bottom.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphDelta {
    edges: BTreeMap<NodeId, SortedIntSet>,
    calls: SortedIntSet,
    class_inits: SortedIntSet,
}

impl GraphDelta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty() && self.calls.is_empty() && self.class_inits.is_empty()
    }

    pub(crate) fn record_edges(&mut self, node: NodeId, objects: SortedIntSet) {
        if objects.is_empty() {
            return;
        }
        match self.edges.get_mut(&node) {
            Some(existing) => *existing = existing.union(&objects),
            None => {
                self.edges.insert(node, objects);
            }
        }
    }

    pub(crate) fn record_call(&mut self, call: u32) {
        self.calls.insert(call);
    }

    pub(crate) fn record_class_init(&mut self, init: u32) {
        self.class_inits.insert(init);
    }

    /// Fold `other` into `self`.
    pub fn combine(&mut self, other: &GraphDelta) {
        for (node, objects) in &other.edges {
            self.record_edges(*node, objects.clone());
        }
        self.calls = self.calls.union(&other.calls);
        self.class_inits = self.class_inits.union(&other.class_inits);
    }

    pub fn combined(mut self, other: &GraphDelta) -> GraphDelta {
        self.combine(other);
        self
    }

    /// Objects newly added to `node`, empty if it did not grow.
    pub fn get(&self, node: NodeId) -> SortedIntSet {
        self.edges.get(&node).cloned().unwrap_or_default()
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &SortedIntSet)> {
        self.edges.iter().map(|(n, s)| (*n, s))
    }

    /// Ids of newly registered call-graph edges.
    pub fn calls(&self) -> &SortedIntSet {
        &self.calls
    }

    /// Newly triggered class initializers, as method indices.
    pub fn class_inits(&self) -> &SortedIntSet {
        &self.class_inits
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(|s| s.len()).sum()
    }

    fn is_within(&self, other: &GraphDelta) -> bool {
        self.calls.is_subset(&other.calls)
            && self.class_inits.is_subset(&other.class_inits)
            && self.edges.iter().all(|(node, objects)| {
                other
                    .edges
                    .get(node)
                    .is_some_and(|theirs| objects.is_subset(theirs))
            })
    }
}

impl PartialOrd for GraphDelta {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self == other {
            Some(Ordering::Equal)
        } else if self.is_within(other) {
            Some(Ordering::Less)
        } else if other.is_within(self) {
            Some(Ordering::Greater)
        } else {
            None
        }
    }
}

impl JoinSemiLattice for GraphDelta {
    fn join(&mut self, other: &Self) {
        self.combine(other)
    }
}
