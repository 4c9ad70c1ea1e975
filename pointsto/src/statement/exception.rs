use crate::error::AnalysisError;
use crate::graph::{GraphDelta, PointsToIterable, TypeFilter};
use crate::intset::IntSet;
use crate::program_point::ProgramPoint;
use crate::statement::{ConstraintStatement, ProcessContext, replace_var};
use crate::variable::ReferenceVariable;
use pointsto_ir::{MethodId, TypeId};
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// `catch (ty var)`
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Handler {
    pub ty: TypeId,
    pub var: ReferenceVariable,
}

/// Routes exceptions raised in a method: by a `throw`, or by a callee through a call's
/// exception temporary.
///
/// Handlers are tried in order. Each one receives the exceptions of its type that no earlier
/// handler caught; whatever no handler catches escapes to the method's exception summary.
#[derive(Debug, Clone)]
pub struct ExceptionFlowStatement {
    pub method: MethodId,
    pub site: u32,
    pub point: Option<ProgramPoint>,
    pub source: ReferenceVariable,
    pub handlers: Arc<[Handler]>,
    pub summary: ReferenceVariable,
}

impl ConstraintStatement for ExceptionFlowStatement {
    fn method(&self) -> MethodId {
        self.method
    }

    fn site(&self) -> u32 {
        self.site
    }

    fn point(&self) -> Option<ProgramPoint> {
        self.point
    }

    fn used_variables(&self) -> Vec<ReferenceVariable> {
        vec![self.source]
    }

    fn replace_use(&mut self, old: ReferenceVariable, new: ReferenceVariable) -> bool {
        replace_var(&mut self.source, old, new)
    }

    fn process(
        &self,
        cx: &ProcessContext<'_>,
        view: &dyn PointsToIterable,
    ) -> Result<GraphDelta, AnalysisError> {
        let raised = cx.read(view, self.source, self.point)?;
        let mut delta = GraphDelta::new();
        if raised.is_empty() {
            return Ok(delta);
        }
        let mut caught = Vec::with_capacity(self.handlers.len());
        for handler in self.handlers.iter() {
            let filter = TypeFilter::excluding(handler.ty, caught.clone());
            // handler variables are written outside any single program point
            let node = cx.def_node(handler.var, None)?;
            delta.combine(&cx.graph.add_edges_filtered(node, &raised, &filter));
            caught.push(handler.ty);
        }
        let escaping = TypeFilter::excluding(cx.hierarchy().throwable(), caught);
        let summary = cx.def_node(self.summary, None)?;
        delta.combine(&cx.graph.add_edges_filtered(summary, &raised, &escaping));
        Ok(delta)
    }
}

impl Display for ExceptionFlowStatement {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "raise v{}", self.source.id.0)?;
        for h in self.handlers.iter() {
            write!(f, " catch(t{} v{})", h.ty.0, h.var.id.0)?;
        }
        Ok(())
    }
}
