use crate::error::AnalysisError;
use crate::graph::{FieldKey, GraphDelta, NodeId, PointsToIterable, TypeFilter};
use crate::heap::ObjectId;
use crate::intset::{IntSet, SortedIntSet};
use crate::program_point::ProgramPoint;
use crate::statement::{ConstraintStatement, ProcessContext, replace_var};
use crate::variable::ReferenceVariable;
use pointsto_ir::MethodId;
use std::fmt::{Display, Formatter};

/// Can objects of `object`'s type carry `field`? Array contents only exist on arrays and a
/// named field only on subtypes of the class declaring it.
fn holds_field(cx: &ProcessContext<'_>, object: ObjectId, field: FieldKey) -> bool {
    let hierarchy = cx.hierarchy();
    let ty = cx.graph.object_type(object);
    match field {
        FieldKey::ArrayContents => hierarchy.is_array(ty),
        FieldKey::Named(f) => hierarchy.is_subtype(ty, hierarchy.field(f).declaring),
    }
}

/// The values a store into `field` of `object` may write.
fn store_filter(cx: &ProcessContext<'_>, object: ObjectId, field: FieldKey) -> TypeFilter {
    let hierarchy = cx.hierarchy();
    match field {
        FieldKey::Named(f) => TypeFilter::new(hierarchy.field(f).ty),
        FieldKey::ArrayContents => TypeFilter::new(
            hierarchy
                .element_type(cx.graph.object_type(object))
                .unwrap_or_else(|| hierarchy.object()),
        ),
    }
}

fn describe_field(field: FieldKey) -> String {
    match field {
        FieldKey::Named(f) => format!(".f{}", f.0),
        FieldKey::ArrayContents => "[]".to_string(),
    }
}

/// `target = base.field`, or `target = base[_]` for array contents.
#[derive(Debug, Clone)]
pub struct LoadStatement {
    pub method: MethodId,
    pub site: u32,
    pub point: Option<ProgramPoint>,
    pub target: ReferenceVariable,
    pub base: ReferenceVariable,
    pub field: FieldKey,
}

impl ConstraintStatement for LoadStatement {
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
        vec![self.base]
    }

    fn replace_use(&mut self, old: ReferenceVariable, new: ReferenceVariable) -> bool {
        replace_var(&mut self.base, old, new)
    }

    fn process(
        &self,
        cx: &ProcessContext<'_>,
        view: &dyn PointsToIterable,
    ) -> Result<GraphDelta, AnalysisError> {
        let target = cx.def_node(self.target, self.point)?;
        let mut delta = GraphDelta::new();
        let new_bases = cx.read(view, self.base, self.point)?;
        for o in new_bases.iter().map(ObjectId) {
            if holds_field(cx, o, self.field) {
                let source = cx.field_node(o, self.field);
                delta.combine(&cx.graph.copy_edges(source, target, cx.originator));
            }
        }
        if view.is_delta() {
            // fields of objects seen before that grew since
            for o in cx.read_full(self.base, self.point)?.iter().map(ObjectId) {
                if new_bases.contains(o.0) || !holds_field(cx, o, self.field) {
                    continue;
                }
                let source = cx.field_node(o, self.field);
                let grown = view.points_to(cx.graph, source, cx.originator);
                delta.combine(&cx.graph.add_edges(target, &grown));
            }
        }
        Ok(delta)
    }
}

impl Display for LoadStatement {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "v{} = v{}{}",
            self.target.id.0,
            self.base.id.0,
            describe_field(self.field)
        )
    }
}

/// `base.field = source`, or `base[_] = source` for array contents.
#[derive(Debug, Clone)]
pub struct StoreStatement {
    pub method: MethodId,
    pub site: u32,
    pub point: Option<ProgramPoint>,
    pub base: ReferenceVariable,
    pub field: FieldKey,
    pub source: ReferenceVariable,
}

impl StoreStatement {
    fn store(
        &self,
        cx: &ProcessContext<'_>,
        bases: &SortedIntSet,
        values: &SortedIntSet,
    ) -> GraphDelta {
        let mut delta = GraphDelta::new();
        if values.is_empty() {
            return delta;
        }
        for o in bases.iter().map(ObjectId) {
            if holds_field(cx, o, self.field) {
                let node: NodeId = cx.field_node(o, self.field);
                let filter = store_filter(cx, o, self.field);
                delta.combine(&cx.graph.add_edges_filtered(node, values, &filter));
            }
        }
        delta
    }
}

impl ConstraintStatement for StoreStatement {
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
        vec![self.base, self.source]
    }

    fn replace_use(&mut self, old: ReferenceVariable, new: ReferenceVariable) -> bool {
        let base = replace_var(&mut self.base, old, new);
        replace_var(&mut self.source, old, new) || base
    }

    fn process(
        &self,
        cx: &ProcessContext<'_>,
        view: &dyn PointsToIterable,
    ) -> Result<GraphDelta, AnalysisError> {
        let bases = cx.read(view, self.base, self.point)?;
        let values = cx.read(view, self.source, self.point)?;
        if !view.is_delta() {
            return Ok(self.store(cx, &bases, &values));
        }
        let all_bases = cx.read_full(self.base, self.point)?;
        let all_values = cx.read_full(self.source, self.point)?;
        Ok(self
            .store(cx, &bases, &all_values)
            .combined(&self.store(cx, &all_bases, &values)))
    }
}

impl Display for StoreStatement {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "v{}{} = v{}",
            self.base.id.0,
            describe_field(self.field),
            self.source.id.0
        )
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum StaticAccess {
    Get,
    Put,
}

/// `local = Class.field` or `Class.field = local`. Touching a static field triggers the
/// initializers of its class.
#[derive(Debug, Clone)]
pub struct StaticFieldStatement {
    pub method: MethodId,
    pub site: u32,
    pub point: Option<ProgramPoint>,
    pub access: StaticAccess,
    pub local: ReferenceVariable,
    /// The singleton variable standing for the field
    pub field: ReferenceVariable,
    pub initializers: Vec<MethodId>,
}

impl ConstraintStatement for StaticFieldStatement {
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
        match self.access {
            StaticAccess::Get => Some(self.local),
            StaticAccess::Put => Some(self.field),
        }
    }

    fn used_variables(&self) -> Vec<ReferenceVariable> {
        match self.access {
            StaticAccess::Get => vec![self.field],
            StaticAccess::Put => vec![self.local],
        }
    }

    fn replace_use(&mut self, old: ReferenceVariable, new: ReferenceVariable) -> bool {
        match self.access {
            StaticAccess::Get => replace_var(&mut self.field, old, new),
            StaticAccess::Put => replace_var(&mut self.local, old, new),
        }
    }

    fn process(
        &self,
        cx: &ProcessContext<'_>,
        view: &dyn PointsToIterable,
    ) -> Result<GraphDelta, AnalysisError> {
        let mut delta = cx.graph.add_class_initializers(&self.initializers);
        let (from, to) = match self.access {
            StaticAccess::Get => (self.field, self.local),
            StaticAccess::Put => (self.local, self.field),
        };
        let objects = cx.read(view, from, self.point)?;
        let target = cx.def_node(to, self.point)?;
        delta.combine(&cx.graph.add_edges(target, &objects));
        Ok(delta)
    }
}

impl Display for StaticFieldStatement {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.access {
            StaticAccess::Get => write!(f, "v{} = static v{}", self.local.id.0, self.field.id.0),
            StaticAccess::Put => write!(f, "static v{} = v{}", self.field.id.0, self.local.id.0),
        }
    }
}
