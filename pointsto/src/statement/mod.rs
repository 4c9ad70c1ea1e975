//! Constraint statements: the transfer functions the solver iterates to a fixpoint.
//!
//! Every statement is built once, with its operands fixed, by the front end. Processing a
//! statement in a context reads the graph through a [`PointsToIterable`] view and returns only
//! the edges it added. Re-processing with nothing new to see must add nothing.

mod call;
mod class_init;
mod copy;
mod exception;
mod field;
mod new;

pub use call::{CallKind, CallStatement};
pub use class_init::ClassInitStatement;
pub use copy::{CopyStatement, PhiStatement, ReturnStatement};
pub use exception::{ExceptionFlowStatement, Handler};
pub use field::{LoadStatement, StaticAccess, StaticFieldStatement, StoreStatement};
pub use new::{NewArrayStatement, NewStatement};

use crate::context::Context;
use crate::error::AnalysisError;
use crate::graph::{
    FieldKey, FullView, GraphDelta, GraphNode, NodeId, ObjectField, PointsToGraph,
    PointsToIterable, SubscriberId,
};
use crate::haf::HeapAbstraction;
use crate::heap::{AllocationSite, ObjectId};
use crate::intset::{IntSet, SortedIntSet};
use crate::program_point::{Ageing, InterProgramPoint, ObservedWrite, ProgramPoint};
use crate::registrar::Program;
use crate::variable::{ReferenceVariable, ReferenceVariableReplica};
use pointsto_ir::{ClassHierarchy, MethodId};
use std::fmt::{Debug, Display};

/// Dense id of a registered statement.
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct StatementId(pub u32);

/// The contract every statement kind implements.
pub trait ConstraintStatement: Debug + Display + Send + Sync {
    fn method(&self) -> MethodId;

    /// Index of this statement within its method. Unique per method.
    fn site(&self) -> u32;

    /// Where this statement sits in the method's control flow. Only statements that read or
    /// write flow-sensitive variables need one.
    fn point(&self) -> Option<ProgramPoint> {
        None
    }

    /// The variable this statement assigns, if it assigns exactly one.
    fn defined_variable(&self) -> Option<ReferenceVariable> {
        None
    }

    fn used_variables(&self) -> Vec<ReferenceVariable>;

    /// Substitute `new` for every use of `old`. Only for IR simplification before solving
    /// starts. Returns whether anything was replaced.
    fn replace_use(&mut self, old: ReferenceVariable, new: ReferenceVariable) -> bool;

    /// Evaluate this statement in `cx.context`, seeing the graph through `view`.
    fn process(
        &self,
        cx: &ProcessContext<'_>,
        view: &dyn PointsToIterable,
    ) -> Result<GraphDelta, AnalysisError>;

    /// The flow-sensitive node whose previous value this statement overwrites along the
    /// paths through its program point.
    fn kills_node(&self, cx: &ProcessContext<'_>) -> Option<NodeId> {
        let var = self.defined_variable().filter(|v| v.flow_sensitive)?;
        let point = self.point()?;
        Some(cx.graph.node(GraphNode::LocalAt(cx.replica(var), point)))
    }
}

/// Rewrite the most recent objects in `objects` that `write` may carry past another run of
/// their allocation into their summaries. Objects allocated elsewhere, or in another context,
/// are left alone.
pub(crate) fn age_objects(
    program: &Program,
    graph: &PointsToGraph,
    haf: &HeapAbstraction,
    context: &Context,
    write: ObservedWrite,
    objects: &SortedIntSet,
) -> SortedIntSet {
    let points = program.points();
    let method = points.data(write.kill).method;
    let mut aged = Vec::with_capacity(objects.len());
    for o in objects.iter() {
        let key = graph.instance_key(ObjectId(o));
        let ageing = match haf.summary_of(&key) {
            Some(summary) if key.site.method == method && haf.is_recent_in(&key, context) => {
                points
                    .point_of(method, key.site.site)
                    .map(|allocation| (points.ageing(write, allocation), summary))
            }
            _ => None,
        };
        match ageing {
            None | Some((Ageing::Fresh, _)) => aged.push(o),
            Some((Ageing::Aged, summary)) => aged.push(graph.object(summary).0),
            Some((Ageing::Either, summary)) => {
                aged.push(o);
                aged.push(graph.object(summary).0);
            }
        }
    }
    SortedIntSet::from_unsorted(aged)
}

pub(crate) fn replace_var(
    slot: &mut ReferenceVariable,
    old: ReferenceVariable,
    new: ReferenceVariable,
) -> bool {
    if *slot == old {
        *slot = new;
        true
    } else {
        false
    }
}

/// Everything a statement evaluation may touch.
pub struct ProcessContext<'a> {
    pub program: &'a Program,
    pub graph: &'a PointsToGraph,
    pub haf: &'a HeapAbstraction,
    pub context: &'a Context,
    pub statement: StatementId,
    /// Who to notify when a node read during this evaluation grows
    pub originator: SubscriberId,
}

impl ProcessContext<'_> {
    pub fn hierarchy(&self) -> &ClassHierarchy {
        self.program.hierarchy()
    }

    pub fn initial_context(&self) -> Context {
        self.haf.initial_context()
    }

    /// The statement being evaluated and its context, for diagnostics.
    pub fn describe(&self) -> String {
        self.program.describe_statement(self.statement)
    }

    pub fn replica(&self, var: ReferenceVariable) -> ReferenceVariableReplica {
        var.replica(self.context, &self.haf.initial_context())
    }

    fn missing_point(&self, var: ReferenceVariable) -> AnalysisError {
        AnalysisError::MissingProgramPoint {
            variable: self.program.describe_variable(var.id),
            statement: self.describe(),
            context: self.context.to_string(),
        }
    }

    /// The node a write of `var` at `point` goes to.
    pub fn def_node(
        &self,
        var: ReferenceVariable,
        point: Option<ProgramPoint>,
    ) -> Result<NodeId, AnalysisError> {
        let replica = self.replica(var);
        if !var.flow_sensitive {
            return Ok(self.graph.node(GraphNode::Local(replica)));
        }
        match point {
            Some(p) if self.program.points().kill_of(p) == Some(var.id) => {
                Ok(self.graph.node(GraphNode::LocalAt(replica, p)))
            }
            _ => Err(self.missing_point(var)),
        }
    }

    /// What `view` shows of `var` just before `point`. A flow-sensitive read unions the writes
    /// reaching `point`, with objects reallocated on the way aged into their summaries.
    pub fn read(
        &self,
        view: &dyn PointsToIterable,
        var: ReferenceVariable,
        point: Option<ProgramPoint>,
    ) -> Result<SortedIntSet, AnalysisError> {
        let replica = self.replica(var);
        if !var.flow_sensitive {
            let node = self.graph.node(GraphNode::Local(replica));
            return Ok(view.points_to(self.graph, node, self.originator));
        }
        let at = InterProgramPoint::Pre(point.ok_or_else(|| self.missing_point(var))?);
        let mut out = SortedIntSet::new();
        for kill in self.program.points().reaching_kills(var.id, at).iter() {
            let node = self.graph.node(GraphNode::LocalAt(replica.clone(), *kill));
            let objects = view.points_to(self.graph, node, self.originator);
            let write = ObservedWrite {
                var: var.id,
                kill: *kill,
                at,
            };
            let aged =
                age_objects(self.program, self.graph, self.haf, self.context, write, &objects);
            out = out.union(&aged);
        }
        Ok(out)
    }

    /// Everything `var` may hold just before `point`, subscribing to it.
    pub fn read_full(
        &self,
        var: ReferenceVariable,
        point: Option<ProgramPoint>,
    ) -> Result<SortedIntSet, AnalysisError> {
        self.read(&FullView, var, point)
    }

    pub fn field_node(&self, object: ObjectId, field: FieldKey) -> NodeId {
        let hierarchy = self.hierarchy();
        let ty = match field {
            FieldKey::Named(f) => hierarchy.field(f).ty,
            FieldKey::ArrayContents => hierarchy
                .element_type(self.graph.object_type(object))
                .unwrap_or_else(|| hierarchy.object()),
        };
        self.graph.node(GraphNode::Field(ObjectField { object, field, ty }))
    }

    /// Ask the heap abstraction for the object allocated at `site` in this context.
    pub fn record(&self, site: AllocationSite) -> Result<ObjectId, AnalysisError> {
        let origin = self.describe();
        let key = self.haf.record(site, self.context, &origin)?;
        Ok(self.graph.object(key))
    }

    /// The fields an object of `object`'s type carries that can hold references.
    pub fn reference_fields(&self, object: ObjectId) -> Vec<FieldKey> {
        let hierarchy = self.hierarchy();
        let ty = self.graph.object_type(object);
        if hierarchy.is_array(ty) {
            return match hierarchy.element_type(ty) {
                Some(e) if hierarchy.is_reference(e) => vec![FieldKey::ArrayContents],
                _ => Vec::new(),
            };
        }
        hierarchy
            .instance_fields(ty)
            .into_iter()
            .filter(|f| hierarchy.is_reference(hierarchy.field(*f).ty))
            .map(FieldKey::Named)
            .collect()
    }
}
