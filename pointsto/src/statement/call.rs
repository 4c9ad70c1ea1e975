use crate::context::CallSiteLabel;
use crate::error::AnalysisError;
use crate::graph::{CallEdge, FullView, GraphDelta, GraphNode, PointsToIterable, TypeFilter};
use crate::heap::{AllocationKind, AllocationSite, ObjectId};
use crate::intset::{IntSet, SortedIntSet};
use crate::program_point::ProgramPoint;
use crate::statement::{ConstraintStatement, ProcessContext, replace_var};
use crate::variable::ReferenceVariable;
use itertools::Itertools;
use pointsto_ir::MethodId;
use std::fmt::{Display, Formatter};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CallKind {
    /// Dispatch on the runtime type of the receiver
    Virtual,
    /// Call `callee` itself on the receiver (constructors, super calls)
    Special,
    Static,
}

/// `result = receiver.callee(args...)`, plus the exceptions the callee throws back.
#[derive(Debug, Clone)]
pub struct CallStatement {
    pub method: MethodId,
    pub site: u32,
    pub point: Option<ProgramPoint>,
    pub kind: CallKind,
    /// The statically named target
    pub callee: MethodId,
    pub receiver: Option<ReferenceVariable>,
    /// One per declared parameter; `None` where nothing reference-typed is passed
    pub args: Vec<Option<ReferenceVariable>>,
    pub result: Option<ReferenceVariable>,
    /// Receives the callee's exceptional results
    pub exception: ReferenceVariable,
}

/// A resolved destination of the call.
#[derive(Debug, Copy, Clone)]
enum Target {
    Method {
        callee: MethodId,
        receiver: Option<ObjectId>,
    },
    /// The native `Object.clone()`, which has no body to analyze
    Clone(ObjectId),
}

impl CallStatement {
    fn label(&self) -> CallSiteLabel {
        CallSiteLabel {
            caller: self.method,
            site: self.site,
        }
    }

    fn resolve(
        &self,
        cx: &ProcessContext<'_>,
        receivers: &SortedIntSet,
    ) -> Result<Vec<Target>, AnalysisError> {
        let hierarchy = cx.hierarchy();
        let declared = hierarchy.method(self.callee);
        let receivers = cx
            .graph
            .filter(receivers, &TypeFilter::new(declared.declaring));
        let mut targets = Vec::with_capacity(receivers.len());
        for o in receivers.iter().map(ObjectId) {
            let callee = match self.kind {
                CallKind::Static => self.callee,
                CallKind::Special => self.callee,
                CallKind::Virtual => {
                    let ty = cx.graph.object_type(o);
                    let selector = declared.selector();
                    hierarchy.resolve_method(ty, &selector).ok_or_else(|| {
                        AnalysisError::UnresolvedTarget {
                            selector: selector.to_string(),
                            receiver: hierarchy.type_name(ty).to_string(),
                            statement: cx.describe(),
                            context: cx.context.to_string(),
                        }
                    })?
                }
            };
            targets.push(if hierarchy.is_native_clone(callee) {
                Target::Clone(o)
            } else {
                Target::Method {
                    callee,
                    receiver: Some(o),
                }
            });
        }
        Ok(targets)
    }

    /// Connect this site to `target`, moving whatever `view` shows of the arguments and of
    /// the callee's results.
    fn link(
        &self,
        cx: &ProcessContext<'_>,
        target: Target,
        view: &dyn PointsToIterable,
    ) -> Result<GraphDelta, AnalysisError> {
        match target {
            Target::Method { callee, receiver } => self.link_method(cx, callee, receiver, view),
            Target::Clone(original) => self.link_clone(cx, original, view),
        }
    }

    fn link_method(
        &self,
        cx: &ProcessContext<'_>,
        callee: MethodId,
        receiver: Option<ObjectId>,
        view: &dyn PointsToIterable,
    ) -> Result<GraphDelta, AnalysisError> {
        let receiver_key = receiver.map(|o| cx.graph.instance_key(o));
        let origin = cx.describe();
        let callee_context =
            cx.haf
                .merge(self.label(), receiver_key.as_ref(), cx.context, &origin)?;
        let mut delta = cx.graph.add_call(CallEdge {
            site: self.label(),
            caller_context: cx.context.clone(),
            callee,
            callee_context: callee_context.clone(),
        });
        let Some(summary) = cx.program.summary(callee) else {
            return Ok(delta);
        };
        let initial = cx.initial_context();
        let callee_node = |var: ReferenceVariable| {
            cx.graph
                .node(GraphNode::Local(var.replica(&callee_context, &initial)))
        };

        let mut formals = summary.formals.iter();
        if !cx.hierarchy().method(callee).is_static {
            if let (Some(Some(this)), Some(o)) = (formals.next(), receiver) {
                delta.combine(&cx.graph.add_edge(callee_node(*this), o));
            }
        }
        for (arg, formal) in self.args.iter().zip(formals) {
            if let (Some(arg), Some(formal)) = (arg, formal) {
                let objects = cx.read(view, *arg, self.point)?;
                delta.combine(&cx.graph.add_edges(callee_node(*formal), &objects));
            }
        }
        if let (Some(result), Some(ret)) = (self.result, summary.ret) {
            let returned = view.points_to(cx.graph, callee_node(ret), cx.originator);
            let target = cx.def_node(result, self.point)?;
            delta.combine(&cx.graph.add_edges(target, &returned));
        }
        let thrown = view.points_to(cx.graph, callee_node(summary.exception), cx.originator);
        let exception = cx.def_node(self.exception, None)?;
        delta.combine(&cx.graph.add_edges(exception, &thrown));
        Ok(delta)
    }

    /// A fresh object of the receiver's type whose fields hold whatever the receiver's do.
    fn link_clone(
        &self,
        cx: &ProcessContext<'_>,
        original: ObjectId,
        view: &dyn PointsToIterable,
    ) -> Result<GraphDelta, AnalysisError> {
        let copy = cx.record(AllocationSite {
            method: self.method,
            site: self.site,
            ty: cx.graph.object_type(original),
            kind: AllocationKind::Clone,
        })?;
        let mut delta = GraphDelta::new();
        if let Some(result) = self.result {
            let target = cx.def_node(result, self.point)?;
            delta.combine(&cx.graph.add_edge(target, copy));
        }
        for field in cx.reference_fields(original) {
            let from = cx.field_node(original, field);
            let to = cx.field_node(copy, field);
            let objects = view.points_to(cx.graph, from, cx.originator);
            delta.combine(&cx.graph.add_edges(to, &objects));
        }
        Ok(delta)
    }
}

impl ConstraintStatement for CallStatement {
    fn method(&self) -> MethodId {
        self.method
    }

    fn site(&self) -> u32 {
        self.site
    }

    fn point(&self) -> Option<ProgramPoint> {
        self.point
    }

    fn defined_variable(&self) -> Option<ReferenceVariable> {
        self.result
    }

    fn used_variables(&self) -> Vec<ReferenceVariable> {
        self.receiver
            .iter()
            .chain(self.args.iter().flatten())
            .copied()
            .collect()
    }

    fn replace_use(&mut self, old: ReferenceVariable, new: ReferenceVariable) -> bool {
        let mut changed = false;
        if let Some(r) = &mut self.receiver {
            changed |= replace_var(r, old, new);
        }
        for arg in self.args.iter_mut().flatten() {
            changed |= replace_var(arg, old, new);
        }
        changed
    }

    fn process(
        &self,
        cx: &ProcessContext<'_>,
        view: &dyn PointsToIterable,
    ) -> Result<GraphDelta, AnalysisError> {
        let Some(receiver) = self.receiver else {
            let target = Target::Method {
                callee: self.callee,
                receiver: None,
            };
            return self.link(cx, target, view);
        };
        let mut delta = GraphDelta::new();
        // targets reached through new receivers see everything
        let new_receivers = cx.read(view, receiver, self.point)?;
        for target in self.resolve(cx, &new_receivers)? {
            delta.combine(&self.link(cx, target, &FullView)?);
        }
        if view.is_delta() {
            // known targets only see what grew
            let known = cx
                .read_full(receiver, self.point)?
                .filter(|o| !new_receivers.contains(o));
            for target in self.resolve(cx, &known)? {
                delta.combine(&self.link(cx, target, view)?);
            }
        }
        if new_receivers.is_empty() && !view.is_delta() {
            tracing::trace!(statement = %cx.describe(), context = %cx.context, "no receivers yet");
        }
        Ok(delta)
    }
}

impl Display for CallStatement {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if let Some(result) = self.result {
            write!(f, "v{} = ", result.id.0)?;
        }
        match (self.kind, self.receiver) {
            (CallKind::Static, _) | (_, None) => write!(f, "static m{}(", self.callee.0)?,
            (CallKind::Special, Some(r)) => write!(f, "v{}.special m{}(", r.id.0, self.callee.0)?,
            (CallKind::Virtual, Some(r)) => write!(f, "v{}.m{}(", r.id.0, self.callee.0)?,
        }
        let args = self
            .args
            .iter()
            .map(|arg| match arg {
                Some(a) => format!("v{}", a.id.0),
                None => "_".to_string(),
            })
            .join(", ");
        write!(f, "{args})")
    }
}
