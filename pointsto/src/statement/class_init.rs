use crate::error::AnalysisError;
use crate::graph::{GraphDelta, PointsToIterable};
use crate::program_point::ProgramPoint;
use crate::statement::{ConstraintStatement, ProcessContext};
use crate::variable::ReferenceVariable;
use pointsto_ir::MethodId;
use std::fmt::{Display, Formatter};

/// Marks class initializers as triggered. The solver schedules the bodies of the ones that
/// had not run yet in the initial context.
#[derive(Debug, Clone)]
pub struct ClassInitStatement {
    pub method: MethodId,
    pub site: u32,
    pub point: Option<ProgramPoint>,
    /// Outermost superclass first
    pub initializers: Vec<MethodId>,
}

impl ConstraintStatement for ClassInitStatement {
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
        Vec::new()
    }

    fn replace_use(&mut self, _: ReferenceVariable, _: ReferenceVariable) -> bool {
        false
    }

    fn process(
        &self,
        cx: &ProcessContext<'_>,
        _: &dyn PointsToIterable,
    ) -> Result<GraphDelta, AnalysisError> {
        Ok(cx.graph.add_class_initializers(&self.initializers))
    }
}

impl Display for ClassInitStatement {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "clinit")?;
        for m in &self.initializers {
            write!(f, " m{}", m.0)?;
        }
        Ok(())
    }
}
