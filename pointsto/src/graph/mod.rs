//! The shared points-to graph every statement reads and grows.

mod call_graph;
mod delta;
mod iterable;
mod node;
#[cfg(test)]
mod tests;

pub use call_graph::{CallEdge, CallGraph, CallGraphNode, build_call_graph};
pub use delta::GraphDelta;
pub use iterable::{DeltaView, FullView, PointsToIterable};
pub use node::{FieldKey, GraphNode, NodeId, ObjectField};

use crate::arena::Interner;
use crate::heap::{InstanceKey, ObjectId};
use crate::intset::{
    ConcurrentBitVectorIntSet, ConcurrentMonotonicIntSet, IntSet, IntSetKind, MutableIntSet,
    SharedIntSet, SortedIntSet,
};
use pointsto_ir::{ClassHierarchy, MethodId, TypeId};
use std::sync::Arc;
use std::sync::atomic::{Ordering, fence};

/// Dense id of a (statement, context) pair that can be notified of graph growth.
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct SubscriberId(pub u32);

/// Accept objects whose type is a subtype of `ty` but of none of `excluded`.
#[derive(Debug, Clone)]
pub struct TypeFilter {
    pub ty: TypeId,
    pub excluded: Vec<TypeId>,
}

impl TypeFilter {
    pub fn new(ty: TypeId) -> Self {
        Self {
            ty,
            excluded: Vec::new(),
        }
    }

    pub fn excluding(ty: TypeId, excluded: Vec<TypeId>) -> Self {
        Self { ty, excluded }
    }

    pub fn accepts(&self, hierarchy: &ClassHierarchy, ty: TypeId) -> bool {
        hierarchy.is_subtype(ty, self.ty)
            && !self.excluded.iter().any(|e| hierarchy.is_subtype(ty, *e))
    }
}

#[derive(Debug)]
struct NodeData {
    points_to: SharedIntSet,
    subscribers: ConcurrentMonotonicIntSet,
}

/// Every node's points-to set, the call graph, and the class initializers that have run.
///
/// All operations take `&self` and may be called concurrently from any number of workers.
/// Nothing is ever removed: sets only grow and call edges only accumulate. The mutating
/// operations return a [`GraphDelta`] holding exactly the edges they added.
#[derive(Debug)]
pub struct PointsToGraph {
    hierarchy: Arc<ClassHierarchy>,
    set_kind: IntSetKind,
    nodes: Interner<GraphNode, Arc<NodeData>>,
    objects: Interner<InstanceKey, TypeId>,
    calls: Interner<CallEdge>,
    class_inits: ConcurrentBitVectorIntSet,
}

impl PointsToGraph {
    pub fn new(hierarchy: Arc<ClassHierarchy>, set_kind: IntSetKind) -> Self {
        Self {
            hierarchy,
            set_kind,
            nodes: Interner::new(),
            objects: Interner::new(),
            calls: Interner::new(),
            class_inits: ConcurrentBitVectorIntSet::new(),
        }
    }

    pub fn hierarchy(&self) -> &ClassHierarchy {
        &self.hierarchy
    }

    /// The id of `node`, interning it with an empty points-to set if it is new.
    pub fn node(&self, node: GraphNode) -> NodeId {
        let kind = self.set_kind;
        let (id, _) = self.nodes.intern_with(node, || {
            Arc::new(NodeData {
                points_to: SharedIntSet::new(kind),
                subscribers: ConcurrentMonotonicIntSet::new(),
            })
        });
        NodeId(id)
    }

    pub fn lookup_node(&self, node: &GraphNode) -> Option<NodeId> {
        self.nodes.lookup(node).map(NodeId)
    }

    pub fn graph_node(&self, id: NodeId) -> GraphNode {
        self.nodes.key(id.0)
    }

    fn data(&self, id: NodeId) -> Arc<NodeData> {
        self.nodes.payload(id.0)
    }

    pub fn object(&self, key: InstanceKey) -> ObjectId {
        let ty = key.ty();
        ObjectId(self.objects.intern_with(key, || ty).0)
    }

    pub fn lookup_object(&self, key: &InstanceKey) -> Option<ObjectId> {
        self.objects.lookup(key).map(ObjectId)
    }

    pub fn instance_key(&self, id: ObjectId) -> InstanceKey {
        self.objects.key(id.0)
    }

    pub fn object_type(&self, id: ObjectId) -> TypeId {
        self.objects.payload(id.0)
    }

    /// The current contents of `node`. Other workers may keep adding to it.
    pub fn points_to_set(&self, node: NodeId) -> SortedIntSet {
        self.data(node).points_to.snapshot()
    }

    /// The objects of `node` that `filter` accepts.
    pub fn points_to_set_filtered(&self, node: NodeId, filter: &TypeFilter) -> SortedIntSet {
        self.filter(&self.points_to_set(node), filter)
    }

    pub fn filter(&self, objects: &SortedIntSet, filter: &TypeFilter) -> SortedIntSet {
        objects.filter(|o| filter.accepts(&self.hierarchy, self.object_type(ObjectId(o))))
    }

    /// Register `originator` as depending on `node`.
    pub fn subscribe(&self, node: NodeId, originator: SubscriberId) {
        self.data(node).subscribers.add(originator.0);
    }

    /// Subscribe `originator` to `node`, then read it. Subscribing first means an addition
    /// racing with this read is either in the snapshot or notifies `originator` afterwards.
    pub fn read(&self, node: NodeId, originator: SubscriberId) -> SortedIntSet {
        let data = self.data(node);
        data.subscribers.add(originator.0);
        // pairs with the fence in `subscribers_of`: the subscription and an addition to
        // `points_to` cannot both be missed by the other side
        fence(Ordering::SeqCst);
        data.points_to.snapshot()
    }

    /// Who to notify about edges just added to `node`. Must be called after the addition.
    pub fn subscribers_of(&self, node: NodeId) -> SortedIntSet {
        fence(Ordering::SeqCst);
        self.data(node).subscribers.snapshot()
    }

    pub fn add_edge(&self, node: NodeId, object: ObjectId) -> GraphDelta {
        let mut delta = GraphDelta::new();
        if self.data(node).points_to.add(object.0) {
            delta.record_edges(node, SortedIntSet::singleton(object.0));
        }
        delta
    }

    pub fn add_edges(&self, node: NodeId, objects: &SortedIntSet) -> GraphDelta {
        let mut delta = GraphDelta::new();
        if objects.is_empty() {
            return delta;
        }
        let added = self.data(node).points_to.add_all(objects);
        delta.record_edges(node, added);
        delta
    }

    pub fn add_edges_filtered(
        &self,
        node: NodeId,
        objects: &SortedIntSet,
        filter: &TypeFilter,
    ) -> GraphDelta {
        self.add_edges(node, &self.filter(objects, filter))
    }

    /// Make `dst` point to everything `src` points to, subscribing `originator` to `src`.
    pub fn copy_edges(&self, src: NodeId, dst: NodeId, originator: SubscriberId) -> GraphDelta {
        self.add_edges(dst, &self.read(src, originator))
    }

    pub fn copy_edges_filtered(
        &self,
        src: NodeId,
        dst: NodeId,
        filter: &TypeFilter,
        originator: SubscriberId,
    ) -> GraphDelta {
        self.add_edges_filtered(dst, &self.read(src, originator), filter)
    }

    /// Register a call-graph edge. The delta names the edge only the first time.
    pub fn add_call(&self, edge: CallEdge) -> GraphDelta {
        let mut delta = GraphDelta::new();
        let (id, new) = self.calls.intern(edge);
        if new {
            delta.record_call(id);
        }
        delta
    }

    pub fn call_edge(&self, id: u32) -> CallEdge {
        self.calls.key(id)
    }

    pub fn call_edges(&self) -> Vec<CallEdge> {
        self.calls.entries().into_iter().map(|(e, _)| e).collect()
    }

    /// Mark `initializers` as triggered. The delta lists the ones that had not run yet; an
    /// empty delta means nothing needs scheduling.
    pub fn add_class_initializers(&self, initializers: &[MethodId]) -> GraphDelta {
        let mut delta = GraphDelta::new();
        for init in initializers {
            if self.class_inits.add(init.0) {
                delta.record_class_init(init.0);
            }
        }
        delta
    }

    pub fn class_initialized(&self, init: MethodId) -> bool {
        self.class_inits.contains(init.0)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn call_count(&self) -> usize {
        self.calls.len()
    }

    /// Total number of node-to-object edges.
    pub fn edge_count(&self) -> usize {
        self.nodes
            .entries()
            .iter()
            .map(|(_, data)| data.points_to.len())
            .sum()
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, GraphNode)> {
        self.nodes
            .entries()
            .into_iter()
            .enumerate()
            .map(|(i, (node, _))| (NodeId(i as u32), node))
    }

    pub fn objects(&self) -> impl Iterator<Item = (ObjectId, InstanceKey)> {
        self.objects
            .entries()
            .into_iter()
            .enumerate()
            .map(|(i, (key, _))| (ObjectId(i as u32), key))
    }
}
