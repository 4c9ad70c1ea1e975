use super::*;
use crate::context::{CallSiteLabel, Context};
use crate::heap::{AllocationKind, AllocationSite};
use crate::variable::{ReferenceVariableReplica, VariableId};
use pointsto_ir::ClassHierarchyBuilder;
use rayon::prelude::*;

struct Fixture {
    graph: PointsToGraph,
    a: TypeId,
    b: TypeId,
}

fn fixture() -> Fixture {
    let mut builder = ClassHierarchyBuilder::new();
    let a = builder.declare_class("A", false).unwrap();
    let b = builder.declare_class("B", false).unwrap();
    builder.set_superclass(b, a).unwrap();
    let graph = PointsToGraph::new(Arc::new(builder.build()), IntSetKind::Hashed);
    Fixture { graph, a, b }
}

fn local(graph: &PointsToGraph, var: u32) -> NodeId {
    graph.node(GraphNode::Local(ReferenceVariableReplica {
        var: VariableId(var),
        context: Context::empty(),
    }))
}

fn object(graph: &PointsToGraph, site: u32, ty: TypeId) -> ObjectId {
    graph.object(InstanceKey::new(
        AllocationSite {
            method: MethodId(0),
            site,
            ty,
            kind: AllocationKind::New,
        },
        Context::empty(),
    ))
}

fn set(items: &[u32]) -> SortedIntSet {
    items.iter().copied().collect()
}

#[test]
fn test_nodes_and_objects_are_interned() {
    let f = fixture();
    let x = local(&f.graph, 0);
    assert_eq!(local(&f.graph, 0), x);
    assert_ne!(local(&f.graph, 1), x);
    let o = object(&f.graph, 0, f.a);
    assert_eq!(object(&f.graph, 0, f.a), o);
    assert_eq!(f.graph.object_type(o), f.a);
    assert_eq!(f.graph.object_count(), 1);
}

#[test]
fn test_deltas_hold_only_new_edges() {
    let f = fixture();
    let x = local(&f.graph, 0);
    let o1 = object(&f.graph, 0, f.a);
    let o2 = object(&f.graph, 1, f.b);

    let d = f.graph.add_edge(x, o1);
    assert_eq!(d.get(x), set(&[o1.0]));
    assert!(f.graph.add_edge(x, o1).is_empty());

    let d = f.graph.add_edges(x, &set(&[o1.0, o2.0]));
    assert_eq!(d.get(x), set(&[o2.0]));
    assert_eq!(f.graph.points_to_set(x), set(&[o1.0, o2.0]));
    assert_eq!(f.graph.edge_count(), 2);
}

#[test]
fn test_copy_subscribes_to_source() {
    let f = fixture();
    let x = local(&f.graph, 0);
    let y = local(&f.graph, 1);
    let o = object(&f.graph, 0, f.a);
    f.graph.add_edge(x, o);

    let d = f.graph.copy_edges(x, y, SubscriberId(7));
    assert_eq!(d.get(y), set(&[o.0]));
    assert_eq!(f.graph.subscribers_of(x), set(&[7]));
    assert!(f.graph.subscribers_of(y).is_empty());
    assert!(f.graph.copy_edges(x, y, SubscriberId(7)).is_empty());
}

#[test]
fn test_filtered_views() {
    let f = fixture();
    let x = local(&f.graph, 0);
    let oa = object(&f.graph, 0, f.a);
    let ob = object(&f.graph, 1, f.b);
    f.graph.add_edges(x, &set(&[oa.0, ob.0]));

    let only_b = TypeFilter::new(f.b);
    assert_eq!(f.graph.points_to_set_filtered(x, &only_b), set(&[ob.0]));
    let a_but_not_b = TypeFilter::excluding(f.a, vec![f.b]);
    assert_eq!(f.graph.points_to_set_filtered(x, &a_but_not_b), set(&[oa.0]));
    let object = TypeFilter::new(f.graph.hierarchy().object());
    assert_eq!(f.graph.points_to_set_filtered(x, &object).len(), 2);
}

#[test]
fn test_calls_and_class_inits_are_idempotent() {
    let f = fixture();
    let edge = CallEdge {
        site: CallSiteLabel {
            caller: MethodId(0),
            site: 3,
        },
        caller_context: Context::empty(),
        callee: MethodId(1),
        callee_context: Context::empty(),
    };
    let d = f.graph.add_call(edge.clone());
    assert_eq!(d.calls().len(), 1);
    assert!(f.graph.add_call(edge).is_empty());
    assert_eq!(f.graph.call_count(), 1);

    let d = f.graph.add_class_initializers(&[MethodId(2), MethodId(3)]);
    assert_eq!(d.class_inits(), &set(&[2, 3]));
    let d = f.graph.add_class_initializers(&[MethodId(3), MethodId(4)]);
    assert_eq!(d.class_inits(), &set(&[4]));
    assert!(f.graph.add_class_initializers(&[MethodId(2)]).is_empty());
    assert!(f.graph.class_initialized(MethodId(4)));
}

#[test]
fn test_concurrent_growth_is_monotonic() {
    let f = fixture();
    let x = local(&f.graph, 0);
    let objects: Vec<ObjectId> = (0..64).map(|s| object(&f.graph, s, f.a)).collect();
    let deltas: Vec<GraphDelta> = objects
        .par_iter()
        .map(|o| {
            let before = f.graph.points_to_set(x);
            let d = f.graph.add_edge(x, *o);
            let after = f.graph.points_to_set(x);
            assert!(before.is_subset(&after));
            d
        })
        .collect();
    let all = deltas
        .iter()
        .fold(GraphDelta::new(), |acc, d| acc.combined(d));
    assert_eq!(all.get(x).len(), 64);
    assert_eq!(all.get(x), f.graph.points_to_set(x));
}

#[test]
fn test_racing_reader_and_writer_never_both_miss() {
    let f = fixture();
    let o = object(&f.graph, 0, f.a);
    for round in 0..500 {
        let x = local(&f.graph, round);
        let reader = SubscriberId(round);
        let (seen, notified) = std::thread::scope(|s| {
            let read = s.spawn(|| f.graph.read(x, reader));
            let write = s.spawn(|| {
                f.graph.add_edge(x, o);
                f.graph.subscribers_of(x)
            });
            (read.join().unwrap(), write.join().unwrap())
        });
        assert!(seen.contains(o.0) || notified.contains(reader.0));
    }
}

#[test]
fn test_delta_combine_laws() {
    let f = fixture();
    let x = local(&f.graph, 0);
    let y = local(&f.graph, 1);
    let [o1, o2, o3] = [0, 1, 2].map(|s| object(&f.graph, s, f.a));

    let mut d1 = f.graph.add_edges(x, &set(&[o1.0, o2.0]));
    d1.combine(&f.graph.add_class_initializers(&[MethodId(5)]));
    let d2 = f.graph.add_edges(x, &set(&[o3.0])).combined(&f.graph.add_edge(y, o1));
    let d3 = f.graph.add_edge(y, o2);
    let empty = GraphDelta::new();

    assert_eq!(d1.clone().combined(&d2), d2.clone().combined(&d1));
    assert_eq!(
        d1.clone().combined(&d2).combined(&d3),
        d1.clone().combined(&d2.clone().combined(&d3))
    );
    assert_eq!(d1.clone().combined(&d1), d1);
    assert_eq!(d1.clone().combined(&empty), d1);
    assert!(empty.is_empty());

    let both = d1.clone().combined(&d2);
    assert!(d1 < both);
    assert!(empty <= d1);
    assert_eq!(d1.partial_cmp(&d3), None);
    let mut joined = d3.clone();
    crate::lattice::JoinSemiLattice::join(&mut joined, &d1);
    assert!(joined >= d3 && joined >= d1);
}
