use crate::graph::{GraphDelta, NodeId, PointsToGraph, SubscriberId};
use crate::intset::SortedIntSet;

/// What a statement evaluation is allowed to see of the points-to graph.
///
/// Statements are written once against this trait. On a first evaluation they get the
/// [`FullView`]; when re-triggered by growth they get a [`DeltaView`] of just that growth.
pub trait PointsToIterable {
    /// The objects of `node` this view exposes. The full view also subscribes `originator`
    /// to `node` before reading it, so later growth is never missed.
    fn points_to(&self, graph: &PointsToGraph, node: NodeId, originator: SubscriberId)
    -> SortedIntSet;

    /// `true` when only growth is exposed. Statements that join two inputs use this to also
    /// pair the old part of one input with the growth of the other.
    fn is_delta(&self) -> bool;
}

#[derive(Debug, Default, Copy, Clone)]
pub struct FullView;

impl PointsToIterable for FullView {
    fn points_to(
        &self,
        graph: &PointsToGraph,
        node: NodeId,
        originator: SubscriberId,
    ) -> SortedIntSet {
        graph.read(node, originator)
    }

    fn is_delta(&self) -> bool {
        false
    }
}

#[derive(Debug, Copy, Clone)]
pub struct DeltaView<'a>(&'a GraphDelta);

impl<'a> DeltaView<'a> {
    pub fn new(delta: &'a GraphDelta) -> Self {
        Self(delta)
    }
}

impl PointsToIterable for DeltaView<'_> {
    fn points_to(&self, _: &PointsToGraph, node: NodeId, _: SubscriberId) -> SortedIntSet {
        self.0.get(node)
    }

    fn is_delta(&self) -> bool {
        true
    }
}
