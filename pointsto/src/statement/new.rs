use crate::error::AnalysisError;
use crate::graph::{FieldKey, GraphDelta, PointsToIterable};
use crate::heap::{AllocationKind, AllocationSite, ObjectId};
use crate::program_point::ProgramPoint;
use crate::statement::{ConstraintStatement, ProcessContext};
use crate::variable::ReferenceVariable;
use pointsto_ir::{MethodId, TypeId};
use std::fmt::{Display, Formatter};

/// `target = new ty`
#[derive(Debug, Clone)]
pub struct NewStatement {
    pub method: MethodId,
    pub site: u32,
    pub point: Option<ProgramPoint>,
    pub target: ReferenceVariable,
    pub ty: TypeId,
}

impl ConstraintStatement for NewStatement {
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
        Some(self.target)
    }

    fn used_variables(&self) -> Vec<ReferenceVariable> {
        Vec::new()
    }

    fn replace_use(&mut self, _: ReferenceVariable, _: ReferenceVariable) -> bool {
        false
    }

    fn process(
        &self,
        cx: &ProcessContext<'_>,
        view: &dyn PointsToIterable,
    ) -> Result<GraphDelta, AnalysisError> {
        let object = cx.record(AllocationSite {
            method: self.method,
            site: self.site,
            ty: self.ty,
            kind: AllocationKind::New,
        })?;
        let target = cx.def_node(self.target, self.point)?;
        let mut delta = cx.graph.add_edge(target, object);
        let initializers = cx.hierarchy().class_initializers_for(self.ty);
        delta.combine(&cx.graph.add_class_initializers(&initializers));
        delta.combine(&fold_into_summary(cx, view, object));
        Ok(delta)
    }
}

impl Display for NewStatement {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{} = new t{}", self.target.id.0, self.ty.0)
    }
}

/// `target = new ty` for an array type, allocating `dims` nested levels at once. Each inner
/// array is stored in the contents of the one enclosing it.
#[derive(Debug, Clone)]
pub struct NewArrayStatement {
    pub method: MethodId,
    pub site: u32,
    pub point: Option<ProgramPoint>,
    pub target: ReferenceVariable,
    /// Type of the outermost array
    pub ty: TypeId,
    pub dims: u8,
}

impl ConstraintStatement for NewArrayStatement {
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
        Some(self.target)
    }

    fn used_variables(&self) -> Vec<ReferenceVariable> {
        Vec::new()
    }

    fn replace_use(&mut self, _: ReferenceVariable, _: ReferenceVariable) -> bool {
        false
    }

    fn process(
        &self,
        cx: &ProcessContext<'_>,
        view: &dyn PointsToIterable,
    ) -> Result<GraphDelta, AnalysisError> {
        let mut ty = self.ty;
        let mut outer = cx.record(AllocationSite {
            method: self.method,
            site: self.site,
            ty,
            kind: AllocationKind::New,
        })?;
        let target = cx.def_node(self.target, self.point)?;
        let mut delta = cx.graph.add_edge(target, outer);
        delta.combine(&fold_into_summary(cx, view, outer));
        for dim in 1..self.dims {
            let Some(inner_ty) = cx
                .hierarchy()
                .element_type(ty)
                .filter(|e| cx.hierarchy().is_array(*e))
            else {
                break;
            };
            let inner = cx.record(AllocationSite {
                method: self.method,
                site: self.site,
                ty: inner_ty,
                kind: AllocationKind::Dimension(dim),
            })?;
            let contents = cx.field_node(outer, FieldKey::ArrayContents);
            delta.combine(&cx.graph.add_edge(contents, inner));
            delta.combine(&fold_into_summary(cx, view, inner));
            outer = inner;
            ty = inner_ty;
        }
        Ok(delta)
    }
}

impl Display for NewArrayStatement {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{} = newarray t{} x{}", self.target.id.0, self.ty.0, self.dims)
    }
}

/// Under the recency refinement, keep the summary object of `recent` holding everything its
/// fields ever held.
fn fold_into_summary(
    cx: &ProcessContext<'_>,
    view: &dyn PointsToIterable,
    recent: ObjectId,
) -> GraphDelta {
    let mut delta = GraphDelta::new();
    let Some(summary) = cx.haf.summary_of(&cx.graph.instance_key(recent)) else {
        return delta;
    };
    let summary = cx.graph.object(summary);
    for field in cx.reference_fields(recent) {
        let from = cx.field_node(recent, field);
        let to = cx.field_node(summary, field);
        delta.combine(&cx.graph.add_edges(to, &view.points_to(cx.graph, from, cx.originator)));
    }
    delta
}

