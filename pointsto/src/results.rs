use crate::arena::Interner;
use crate::context::Context;
use crate::error::AnalysisError;
use crate::graph::{
    CallEdge, CallGraph, CallGraphNode, FieldKey, FullView, GraphNode, NodeId, PointsToGraph,
    SubscriberId, build_call_graph,
};
use crate::haf::HeapAbstraction;
use crate::heap::{AllocationKind, InstanceKey, ObjectId, Recency};
use crate::intset::{IntSet, SortedIntSet};
use crate::program_point::{InterProgramPoint, ObservedWrite, ProgramPoint};
use crate::registrar::Program;
use crate::solver::SolverStats;
use crate::statement::{ProcessContext, StatementId, age_objects};
use crate::variable::ReferenceVariable;
use pointsto_ir::MethodId;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// The final points-to graph of a run, with the program it was computed for.
#[derive(Debug)]
pub struct AnalysisResults {
    program: Arc<Program>,
    haf: HeapAbstraction,
    graph: PointsToGraph,
    subscribers: Interner<(StatementId, Context)>,
    reachable: Vec<(MethodId, Context)>,
    stats: SolverStats,
    timed_out: bool,
}

impl AnalysisResults {
    pub(crate) fn new(
        program: Arc<Program>,
        haf: HeapAbstraction,
        graph: PointsToGraph,
        subscribers: Interner<(StatementId, Context)>,
        reachable: Vec<(MethodId, Context)>,
        stats: SolverStats,
        timed_out: bool,
    ) -> Self {
        Self {
            program,
            haf,
            graph,
            subscribers,
            reachable,
            stats,
            timed_out,
        }
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn graph(&self) -> &PointsToGraph {
        &self.graph
    }

    pub fn stats(&self) -> &SolverStats {
        &self.stats
    }

    /// Whether the run stopped at its deadline. If so, every answer here may be missing
    /// objects.
    pub fn timed_out(&self) -> bool {
        self.timed_out
    }

    fn lookup_union<I: IntoIterator<Item = GraphNode>>(&self, nodes: I) -> SortedIntSet {
        nodes
            .into_iter()
            .filter_map(|n| self.graph.lookup_node(&n))
            .fold(SortedIntSet::new(), |acc, n| {
                acc.union(&self.graph.points_to_set(n))
            })
    }

    /// Every object `var` may hold in `context`. For a flow-sensitive variable this is the
    /// union over all the places it is written.
    pub fn points_to(&self, var: ReferenceVariable, context: &Context) -> SortedIntSet {
        let replica = var.replica(context, &self.haf.initial_context());
        if !var.flow_sensitive {
            return self.lookup_union([GraphNode::Local(replica)]);
        }
        let points = self.program.points();
        let kills = (0..points.len() as u32)
            .map(ProgramPoint)
            .filter(|p| points.kill_of(*p) == Some(var.id));
        self.lookup_union(kills.map(|p| GraphNode::LocalAt(replica.clone(), p)))
    }

    /// The objects `var` may hold at `at` in `context`. Under the recency refinement, objects
    /// whose site may have run again since `var` was written show up as their summary.
    pub fn points_to_at(
        &self,
        var: ReferenceVariable,
        context: &Context,
        at: InterProgramPoint,
    ) -> SortedIntSet {
        if !var.flow_sensitive {
            return self.points_to(var, context);
        }
        let replica = var.replica(context, &self.haf.initial_context());
        let mut out = SortedIntSet::new();
        for kill in self.program.points().reaching_kills(var.id, at).iter() {
            let written = self.lookup_union([GraphNode::LocalAt(replica.clone(), *kill)]);
            let write = ObservedWrite {
                var: var.id,
                kill: *kill,
                at,
            };
            let aged = age_objects(&self.program, &self.graph, &self.haf, context, write, &written);
            out = out.union(&aged);
        }
        out
    }

    /// The objects stored in `field` of `object`.
    pub fn field_points_to(&self, object: ObjectId, field: FieldKey) -> SortedIntSet {
        let nodes = self.graph.nodes().filter_map(|(_, node)| match node {
            GraphNode::Field(f) if f.object == object && f.field == field => Some(node),
            _ => None,
        });
        self.lookup_union(nodes.collect::<Vec<_>>())
    }

    pub fn instance_key(&self, object: ObjectId) -> InstanceKey {
        self.graph.instance_key(object)
    }

    pub fn objects(&self) -> Vec<(ObjectId, InstanceKey)> {
        self.graph.objects().collect()
    }

    pub fn call_edges(&self) -> Vec<CallEdge> {
        self.graph.call_edges()
    }

    /// The context-sensitive call graph rooted at every reachable (method, context) pair.
    pub fn call_graph(&self) -> CallGraph {
        let roots = self.reachable.iter().map(|(method, context)| CallGraphNode {
            method: *method,
            context: context.clone(),
        });
        build_call_graph(roots, &self.graph.call_edges())
    }

    pub fn statements_for_method(&self, method: MethodId) -> &[StatementId] {
        self.program.statements_for_method(method)
    }

    /// The contexts `method` was analyzed in.
    pub fn reachable_contexts(&self, method: MethodId) -> Vec<Context> {
        self.reachable
            .iter()
            .filter(|(m, _)| *m == method)
            .map(|(_, c)| c.clone())
            .collect()
    }

    pub fn is_reachable(&self, method: MethodId) -> bool {
        self.reachable.iter().any(|(m, _)| *m == method)
    }

    pub fn describe_object(&self, object: ObjectId) -> String {
        let key = self.graph.instance_key(object);
        let ty = self.program.hierarchy().type_name(key.site.ty);
        let kind = match key.site.kind {
            AllocationKind::New => format!("new {ty}"),
            AllocationKind::Dimension(d) => format!("new {ty} (dim {d})"),
            AllocationKind::Clone => format!("clone {ty}"),
        };
        let recency = match key.recency {
            Recency::Plain => "",
            Recency::MostRecent => " (recent)",
            Recency::Summary => " (summary)",
        };
        format!(
            "{}#{}: {} in {}{}",
            self.program.describe_method(key.site.method),
            key.site.site,
            kind,
            key.context,
            recency
        )
    }

    pub fn describe_node(&self, node: NodeId) -> String {
        match self.graph.graph_node(node) {
            GraphNode::Local(r) => {
                format!("{} {}", self.program.describe_variable(r.var), r.context)
            }
            GraphNode::LocalAt(r, p) => format!(
                "{} {} at {}",
                self.program.describe_variable(r.var),
                r.context,
                p
            ),
            GraphNode::Field(f) => {
                let hierarchy = self.program.hierarchy();
                let field = match f.field {
                    FieldKey::Named(id) => hierarchy.field(id).name.clone(),
                    FieldKey::ArrayContents => "[]".to_string(),
                };
                format!("({}).{}", self.describe_object(f.object), field)
            }
        }
    }

    /// Every non-empty node with its objects, all by name. Two runs over the same program
    /// reached the same fixpoint iff their dumps are equal, whatever ids they handed out.
    pub fn canonical(&self) -> BTreeMap<String, BTreeSet<String>> {
        self.graph
            .nodes()
            .filter_map(|(id, _)| {
                let objects = self.graph.points_to_set(id);
                if objects.is_empty() {
                    return None;
                }
                let names = objects
                    .iter()
                    .map(|o| self.describe_object(ObjectId(o)))
                    .collect();
                Some((self.describe_node(id), names))
            })
            .collect()
    }

    /// Re-evaluate every (statement, context) pair against the full graph. At a fixpoint
    /// nothing is added; returns the pairs that did add something.
    pub fn check_fixpoint(&self) -> Result<Vec<String>, AnalysisError> {
        let mut growing = Vec::new();
        let pairs = self.subscribers.entries().into_iter().map(|(k, _)| k);
        for (id, (statement, context)) in pairs.enumerate() {
            let cx = ProcessContext {
                program: &self.program,
                graph: &self.graph,
                haf: &self.haf,
                context: &context,
                statement,
                originator: SubscriberId(id as u32),
            };
            let delta = self.program.statement(statement).process(&cx, &FullView)?;
            if !delta.is_empty() {
                growing.push(format!("{} in {}", cx.describe(), context));
            }
        }
        Ok(growing)
    }
}
