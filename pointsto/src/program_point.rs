//! The intraprocedural control-flow skeleton flow-sensitive statements are ordered by.
//!
//! Points and edges are only added while statements are being registered. Sealing the
//! builder fixes the graph, and records which flow-sensitive variable each point writes.

use crate::variable::VariableId;
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use pointsto_ir::MethodId;
use std::collections::{HashMap, HashSet};
use std::fmt::{Display, Formatter};
use std::sync::{Arc, RwLock};

#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct ProgramPoint(pub u32);

impl ProgramPoint {
    fn index(&self) -> NodeIndex {
        NodeIndex::new(self.0 as usize)
    }
}

impl Display for ProgramPoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "pp{}", self.0)
    }
}

/// The moment just before or just after a program point executes.
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq)]
pub enum InterProgramPoint {
    Pre(ProgramPoint),
    Post(ProgramPoint),
}

/// A write of a flow-sensitive variable, as seen from a later moment it reaches.
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq)]
pub struct ObservedWrite {
    pub var: VariableId,
    /// The point that wrote `var`
    pub kill: ProgramPoint,
    pub at: InterProgramPoint,
}

/// Whether a value written at an [`ObservedWrite`]'s kill may have seen another execution of
/// an allocation point before it is observed.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Ageing {
    /// Every path from the write to the observation avoids the allocation
    Fresh,
    /// Every path passes through the allocation
    Aged,
    Either,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PointKind {
    Entry,
    Exit,
    /// The statement registered at this site index
    Statement(u32),
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PointData {
    pub method: MethodId,
    pub kind: PointKind,
}

#[derive(Debug, Default)]
pub struct ProgramPointGraphBuilder {
    graph: DiGraph<PointData, ()>,
    entries: HashMap<MethodId, ProgramPoint>,
    exits: HashMap<MethodId, ProgramPoint>,
}

impl ProgramPointGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, data: PointData) -> ProgramPoint {
        ProgramPoint(self.graph.add_node(data).index() as u32)
    }

    /// Entry and exit points of `method`, created on first request.
    pub fn method_points(&mut self, method: MethodId) -> (ProgramPoint, ProgramPoint) {
        if let (Some(entry), Some(exit)) = (self.entries.get(&method), self.exits.get(&method)) {
            return (*entry, *exit);
        }
        let entry = self.push(PointData {
            method,
            kind: PointKind::Entry,
        });
        let exit = self.push(PointData {
            method,
            kind: PointKind::Exit,
        });
        self.entries.insert(method, entry);
        self.exits.insert(method, exit);
        (entry, exit)
    }

    pub fn add_point(&mut self, method: MethodId, site: u32) -> ProgramPoint {
        self.push(PointData {
            method,
            kind: PointKind::Statement(site),
        })
    }

    pub fn add_successor(&mut self, from: ProgramPoint, to: ProgramPoint) {
        self.graph.update_edge(from.index(), to.index(), ());
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Freeze the graph. `kills` maps every point that writes a flow-sensitive variable to
    /// that variable.
    pub fn seal(self, kills: HashMap<ProgramPoint, VariableId>) -> ProgramPointGraph {
        tracing::debug!(
            points = self.graph.node_count(),
            edges = self.graph.edge_count(),
            kills = kills.len(),
            "sealed program point graph"
        );
        let sites = self
            .graph
            .node_indices()
            .filter_map(|n| match self.graph[n].kind {
                PointKind::Statement(site) => {
                    Some(((self.graph[n].method, site), ProgramPoint(n.index() as u32)))
                }
                _ => None,
            })
            .collect();
        ProgramPointGraph {
            graph: self.graph,
            entries: self.entries,
            exits: self.exits,
            sites,
            kills,
            reaching: RwLock::new(HashMap::new()),
            ageing: RwLock::new(HashMap::new()),
        }
    }
}

/// The sealed control-flow skeleton.
#[derive(Debug)]
pub struct ProgramPointGraph {
    graph: DiGraph<PointData, ()>,
    entries: HashMap<MethodId, ProgramPoint>,
    exits: HashMap<MethodId, ProgramPoint>,
    sites: HashMap<(MethodId, u32), ProgramPoint>,
    kills: HashMap<ProgramPoint, VariableId>,
    reaching: RwLock<HashMap<(VariableId, InterProgramPoint), Arc<[ProgramPoint]>>>,
    ageing: RwLock<HashMap<(ObservedWrite, ProgramPoint), Ageing>>,
}

impl ProgramPointGraph {
    pub fn data(&self, point: ProgramPoint) -> PointData {
        self.graph[point.index()]
    }

    pub fn entry(&self, method: MethodId) -> Option<ProgramPoint> {
        self.entries.get(&method).copied()
    }

    pub fn exit(&self, method: MethodId) -> Option<ProgramPoint> {
        self.exits.get(&method).copied()
    }

    pub fn successors(&self, point: ProgramPoint) -> impl Iterator<Item = ProgramPoint> + '_ {
        self.graph
            .neighbors_directed(point.index(), Direction::Outgoing)
            .map(|n| ProgramPoint(n.index() as u32))
    }

    pub fn predecessors(&self, point: ProgramPoint) -> impl Iterator<Item = ProgramPoint> + '_ {
        self.graph
            .neighbors_directed(point.index(), Direction::Incoming)
            .map(|n| ProgramPoint(n.index() as u32))
    }

    /// The point of the statement registered at `site` of `method`.
    pub fn point_of(&self, method: MethodId, site: u32) -> Option<ProgramPoint> {
        self.sites.get(&(method, site)).copied()
    }

    /// The flow-sensitive variable written at `point`, if any.
    pub fn kill_of(&self, point: ProgramPoint) -> Option<VariableId> {
        self.kills.get(&point).copied()
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// The points writing `var` whose value can still be observed at `at`: those reached
    /// backwards from `at` without passing through another write of `var`. Ascending.
    pub fn reaching_kills(&self, var: VariableId, at: InterProgramPoint) -> Arc<[ProgramPoint]> {
        let key = (var, at);
        if let Some(found) = self
            .reaching
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&key)
        {
            return found.clone();
        }
        let computed: Arc<[ProgramPoint]> = self.search_kills(var, at).into();
        self.reaching
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(key)
            .or_insert(computed)
            .clone()
    }

    fn search_kills(&self, var: VariableId, at: InterProgramPoint) -> Vec<ProgramPoint> {
        let start = match at {
            InterProgramPoint::Post(p) if self.kill_of(p) == Some(var) => return vec![p],
            InterProgramPoint::Post(p) | InterProgramPoint::Pre(p) => p,
        };
        let mut found = Vec::new();
        let mut seen = HashSet::new();
        let mut stack: Vec<ProgramPoint> = self.predecessors(start).collect();
        while let Some(p) = stack.pop() {
            if !seen.insert(p) {
                continue;
            }
            if self.kill_of(p) == Some(var) {
                found.push(p);
            } else {
                stack.extend(self.predecessors(p));
            }
        }
        found.sort_unstable();
        found
    }

    /// Whether the value `write` stored can pass through `allocation` on its way to `write.at`.
    /// Only paths that do not overwrite the variable count. Memoised.
    pub fn ageing(&self, write: ObservedWrite, allocation: ProgramPoint) -> Ageing {
        let key = (write, allocation);
        if let Some(found) = self
            .ageing
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&key)
        {
            return *found;
        }
        let computed = self.search_ageing(write, allocation);
        *self
            .ageing
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(key)
            .or_insert(computed)
    }

    fn search_ageing(&self, write: ObservedWrite, allocation: ProgramPoint) -> Ageing {
        let ObservedWrite { var, kill, at } = write;
        if at == InterProgramPoint::Post(kill) {
            return Ageing::Fresh;
        }
        let kills = |p: ProgramPoint| self.kill_of(p) == Some(var);
        // passing the allocation must not overwrite the value, and re-running the write does
        let crosses = allocation != kill
            && !kills(allocation)
            && match at {
                InterProgramPoint::Pre(q) if q == allocation => false,
                InterProgramPoint::Post(q) if q == allocation => self.flows(kill, at, kills),
                _ => {
                    self.flows(kill, InterProgramPoint::Pre(allocation), kills)
                        && self.flows(allocation, at, kills)
                }
            };
        let avoids = self.flows(kill, at, |p| kills(p) || p == allocation);
        match (crosses, avoids) {
            (true, false) => Ageing::Aged,
            (true, true) => Ageing::Either,
            (false, _) => Ageing::Fresh,
        }
    }

    /// Whether control leaving `from` can reach `at` without executing a point `blocked`
    /// rejects.
    fn flows<F: Fn(ProgramPoint) -> bool>(
        &self,
        from: ProgramPoint,
        at: InterProgramPoint,
        blocked: F,
    ) -> bool {
        let (target, executes) = match at {
            InterProgramPoint::Pre(p) => (p, false),
            InterProgramPoint::Post(p) => (p, true),
        };
        let mut seen = HashSet::new();
        let mut stack: Vec<ProgramPoint> = self.successors(from).collect();
        while let Some(p) = stack.pop() {
            if !seen.insert(p) {
                continue;
            }
            let passable = !blocked(p);
            if p == target && (passable || !executes) {
                return true;
            }
            if passable {
                stack.extend(self.successors(p));
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reaching_kills_on_a_diamond_with_a_loop() {
        // entry -> a(x=..) -> b -> c(x=..) -> d -> exit
        //                      \---------------^
        //                 d -> b (loop)
        let m = MethodId(0);
        let x = VariableId(7);
        let mut builder = ProgramPointGraphBuilder::new();
        let (entry, exit) = builder.method_points(m);
        let [a, b, c, d] = [0, 1, 2, 3].map(|s| builder.add_point(m, s));
        builder.add_successor(entry, a);
        builder.add_successor(a, b);
        builder.add_successor(b, c);
        builder.add_successor(c, d);
        builder.add_successor(b, d);
        builder.add_successor(d, exit);
        builder.add_successor(d, b);
        let graph = builder.seal(HashMap::from([(a, x), (c, x)]));

        assert!(graph.reaching_kills(x, InterProgramPoint::Pre(a)).is_empty());
        assert_eq!(&*graph.reaching_kills(x, InterProgramPoint::Post(a)), &[a]);
        assert_eq!(&*graph.reaching_kills(x, InterProgramPoint::Pre(b)), &[a, c]);
        assert_eq!(&*graph.reaching_kills(x, InterProgramPoint::Post(c)), &[c]);
        assert_eq!(&*graph.reaching_kills(x, InterProgramPoint::Pre(exit)), &[a, c]);
        // memoised
        assert!(Arc::ptr_eq(
            &graph.reaching_kills(x, InterProgramPoint::Pre(b)),
            &graph.reaching_kills(x, InterProgramPoint::Pre(b))
        ));
        assert!(
            graph
                .reaching_kills(VariableId(1), InterProgramPoint::Pre(exit))
                .is_empty()
        );
        assert_eq!(graph.entry(m), Some(entry));
        assert_eq!(graph.successors(c).collect::<Vec<_>>(), vec![d]);
    }

    #[test]
    fn test_ageing_across_a_loop_allocation() {
        // entry -> s0(prev = x) -> s1(x = new) -> s2 -> exit, with s1 -> s0 looping back
        let m = MethodId(0);
        let (prev, x) = (VariableId(1), VariableId(2));
        let build = |bypass: bool| {
            let mut builder = ProgramPointGraphBuilder::new();
            let (entry, exit) = builder.method_points(m);
            let [s0, s1, s2] = [0, 1, 2].map(|s| builder.add_point(m, s));
            builder.add_successor(entry, s0);
            builder.add_successor(s0, s1);
            builder.add_successor(s1, s0);
            builder.add_successor(s1, s2);
            builder.add_successor(s2, exit);
            if bypass {
                builder.add_successor(s0, s2);
            }
            let graph = builder.seal(HashMap::from([(s0, prev), (s1, x)]));
            (graph, [s0, s1, s2])
        };

        let (graph, [s0, s1, s2]) = build(false);
        assert_eq!(graph.point_of(m, 1), Some(s1));
        assert_eq!(graph.point_of(m, 7), None);
        let observed = |var, kill, at| ObservedWrite { var, kill, at };
        assert_eq!(
            graph.ageing(observed(prev, s0, InterProgramPoint::Pre(s2)), s1),
            Ageing::Aged
        );
        assert_eq!(
            graph.ageing(observed(prev, s0, InterProgramPoint::Pre(s1)), s1),
            Ageing::Fresh
        );
        assert_eq!(
            graph.ageing(observed(prev, s0, InterProgramPoint::Post(s1)), s1),
            Ageing::Aged
        );
        // the allocation's own target only ever holds its newest object
        assert_eq!(
            graph.ageing(observed(x, s1, InterProgramPoint::Pre(s2)), s1),
            Ageing::Fresh
        );
        assert_eq!(
            graph.ageing(observed(x, s1, InterProgramPoint::Pre(s0)), s1),
            Ageing::Fresh
        );

        let (graph, [s0, s1, s2]) = build(true);
        assert_eq!(
            graph.ageing(observed(prev, s0, InterProgramPoint::Pre(s2)), s1),
            Ageing::Either
        );
    }
}
