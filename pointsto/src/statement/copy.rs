use crate::error::AnalysisError;
use crate::graph::{GraphDelta, PointsToIterable, TypeFilter};
use crate::program_point::ProgramPoint;
use crate::statement::{ConstraintStatement, ProcessContext, replace_var};
use crate::variable::ReferenceVariable;
use pointsto_ir::{MethodId, TypeId};
use std::fmt::{Display, Formatter};

/// `target = source`, or `target = (cast) source` which keeps only objects of the cast type.
#[derive(Debug, Clone)]
pub struct CopyStatement {
    pub method: MethodId,
    pub site: u32,
    pub point: Option<ProgramPoint>,
    pub target: ReferenceVariable,
    pub source: ReferenceVariable,
    pub cast: Option<TypeId>,
}

impl ConstraintStatement for CopyStatement {
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
        let objects = cx.read(view, self.source, self.point)?;
        let target = cx.def_node(self.target, self.point)?;
        Ok(match self.cast {
            Some(ty) => cx
                .graph
                .add_edges_filtered(target, &objects, &TypeFilter::new(ty)),
            None => cx.graph.add_edges(target, &objects),
        })
    }
}

impl Display for CopyStatement {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.cast {
            Some(ty) => write!(f, "v{} = (t{}) v{}", self.target.id.0, ty.0, self.source.id.0),
            None => write!(f, "v{} = v{}", self.target.id.0, self.source.id.0),
        }
    }
}

/// `target = phi(sources...)`
#[derive(Debug, Clone)]
pub struct PhiStatement {
    pub method: MethodId,
    pub site: u32,
    pub point: Option<ProgramPoint>,
    pub target: ReferenceVariable,
    pub sources: Vec<ReferenceVariable>,
}

impl ConstraintStatement for PhiStatement {
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
        self.sources.clone()
    }

    fn replace_use(&mut self, old: ReferenceVariable, new: ReferenceVariable) -> bool {
        self.sources
            .iter_mut()
            .fold(false, |changed, s| replace_var(s, old, new) || changed)
    }

    fn process(
        &self,
        cx: &ProcessContext<'_>,
        view: &dyn PointsToIterable,
    ) -> Result<GraphDelta, AnalysisError> {
        let target = cx.def_node(self.target, self.point)?;
        let mut delta = GraphDelta::new();
        for source in &self.sources {
            let objects = cx.read(view, *source, self.point)?;
            delta.combine(&cx.graph.add_edges(target, &objects));
        }
        Ok(delta)
    }
}

impl Display for PhiStatement {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{} = phi(", self.target.id.0)?;
        for (i, s) in self.sources.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "v{}", s.id.0)?;
        }
        write!(f, ")")
    }
}

/// `return source`: flows into the method's return summary node.
#[derive(Debug, Clone)]
pub struct ReturnStatement {
    pub method: MethodId,
    pub site: u32,
    pub point: Option<ProgramPoint>,
    pub source: ReferenceVariable,
    pub summary: ReferenceVariable,
}

impl ConstraintStatement for ReturnStatement {
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
        let objects = cx.read(view, self.source, self.point)?;
        let summary = cx.def_node(self.summary, None)?;
        Ok(cx.graph.add_edges(summary, &objects))
    }
}

impl Display for ReturnStatement {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "return v{}", self.source.id.0)
    }
}
