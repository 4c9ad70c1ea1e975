use crate::context::Context;
use pointsto_ir::{ClassHierarchy, FieldId, MethodId, TypeId};
use std::collections::HashMap;
use std::fmt::{Display, Formatter};

/// Dense id of a [`ReferenceVariable`] within one program.
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct VariableId(pub u32);

/// Compiler-generated values a call site needs.
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq)]
pub enum Temporary {
    /// Exceptions a callee may throw back into the caller
    CallException,
}

/// Where a variable was declared. Doubles as the deduplication key of
/// [`ReferenceVariableFactory`].
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub enum VariableKind {
    Local { method: MethodId, name: String },
    StaticField(FieldId),
    /// Formal `index` of `method`; index 0 is the receiver of instance methods
    Formal { method: MethodId, index: usize },
    Return(MethodId),
    Exception(MethodId),
    Temporary {
        method: MethodId,
        site: u32,
        role: Temporary,
    },
}

/// An abstract program variable.
///
/// Small and `Copy`; the declaration it came from lives in the factory and is only needed for
/// diagnostics.
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq)]
pub struct ReferenceVariable {
    pub id: VariableId,
    pub ty: TypeId,
    /// Has exactly one replica, in the initial context
    pub singleton: bool,
    /// Reads and writes are ordered by program point instead of accumulated
    pub flow_sensitive: bool,
}

impl ReferenceVariable {
    /// The replica standing for this variable in `context`. Singletons ignore the context.
    pub fn replica(&self, context: &Context, initial: &Context) -> ReferenceVariableReplica {
        ReferenceVariableReplica {
            var: self.id,
            context: if self.singleton {
                initial.clone()
            } else {
                context.clone()
            },
        }
    }
}

/// A variable in a context: the graph node for local and static data.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct ReferenceVariableReplica {
    pub var: VariableId,
    pub context: Context,
}

impl Display for ReferenceVariableReplica {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{} in {}", self.var.0, self.context)
    }
}

/// The variables that connect a method to its callers.
#[derive(Debug, Clone)]
pub struct MethodSummaryNodes {
    pub method: MethodId,
    /// Receiver first for instance methods, then one per reference-typed parameter. Primitive
    /// parameters get no variable.
    pub formals: Vec<Option<ReferenceVariable>>,
    pub ret: Option<ReferenceVariable>,
    pub exception: ReferenceVariable,
}

/// Creates each variable once per declaration site.
#[derive(Debug, Default)]
pub struct ReferenceVariableFactory {
    ids: HashMap<VariableKind, VariableId>,
    variables: Vec<(ReferenceVariable, VariableKind)>,
}

impl ReferenceVariableFactory {
    pub fn new() -> Self {
        Self::default()
    }

    fn make(
        &mut self,
        kind: VariableKind,
        ty: TypeId,
        singleton: bool,
        flow_sensitive: bool,
    ) -> ReferenceVariable {
        if let Some(id) = self.ids.get(&kind) {
            return self.variables[id.0 as usize].0;
        }
        let var = ReferenceVariable {
            id: VariableId(self.variables.len() as u32),
            ty,
            singleton,
            flow_sensitive,
        };
        self.ids.insert(kind.clone(), var.id);
        self.variables.push((var, kind));
        var
    }

    pub fn local(
        &mut self,
        method: MethodId,
        name: &str,
        ty: TypeId,
        flow_sensitive: bool,
    ) -> ReferenceVariable {
        let kind = VariableKind::Local {
            method,
            name: name.to_string(),
        };
        self.make(kind, ty, false, flow_sensitive)
    }

    pub fn static_field(&mut self, field: FieldId, ty: TypeId) -> ReferenceVariable {
        self.make(VariableKind::StaticField(field), ty, true, false)
    }

    pub fn formal(&mut self, method: MethodId, index: usize, ty: TypeId) -> ReferenceVariable {
        self.make(VariableKind::Formal { method, index }, ty, false, false)
    }

    pub fn ret(&mut self, method: MethodId, ty: TypeId) -> ReferenceVariable {
        self.make(VariableKind::Return(method), ty, false, false)
    }

    pub fn exception(&mut self, method: MethodId, ty: TypeId) -> ReferenceVariable {
        self.make(VariableKind::Exception(method), ty, false, false)
    }

    pub fn temporary(
        &mut self,
        method: MethodId,
        site: u32,
        role: Temporary,
        ty: TypeId,
    ) -> ReferenceVariable {
        self.make(VariableKind::Temporary { method, site, role }, ty, false, false)
    }

    pub fn lookup(&self, kind: &VariableKind) -> Option<ReferenceVariable> {
        self.ids.get(kind).map(|id| self.variables[id.0 as usize].0)
    }

    pub fn get(&self, id: VariableId) -> ReferenceVariable {
        self.variables[id.0 as usize].0
    }

    pub fn kind(&self, id: VariableId) -> &VariableKind {
        &self.variables[id.0 as usize].1
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// The summary nodes of `method`, created on first request.
    pub fn summary_nodes(
        &mut self,
        hierarchy: &ClassHierarchy,
        method: MethodId,
    ) -> MethodSummaryNodes {
        let m = hierarchy.method(method);
        let mut formals = Vec::with_capacity(m.params.len() + 1);
        if !m.is_static {
            formals.push(Some(self.formal(method, 0, m.declaring)));
        }
        let offset = formals.len();
        for (i, ty) in m.params.iter().enumerate() {
            formals.push(
                hierarchy
                    .is_reference(*ty)
                    .then(|| self.formal(method, offset + i, *ty)),
            );
        }
        let ret = m
            .returns
            .filter(|ty| hierarchy.is_reference(*ty))
            .map(|ty| self.ret(method, ty));
        let exception = self.exception(method, hierarchy.throwable());
        MethodSummaryNodes {
            method,
            formals,
            ret,
            exception,
        }
    }

    /// A human readable name for `id`.
    pub fn describe(&self, hierarchy: &ClassHierarchy, id: VariableId) -> String {
        let method_name = |m: MethodId| {
            let m = hierarchy.method(m);
            format!("{}.{}", hierarchy.type_name(m.declaring), m.name)
        };
        match self.kind(id) {
            VariableKind::Local { method, name } => format!("{}:{}", method_name(*method), name),
            VariableKind::StaticField(f) => {
                let f = hierarchy.field(*f);
                format!("{}.{}", hierarchy.type_name(f.declaring), f.name)
            }
            VariableKind::Formal { method, index } => {
                format!("{}:formal{}", method_name(*method), index)
            }
            VariableKind::Return(m) => format!("{}:return", method_name(*m)),
            VariableKind::Exception(m) => format!("{}:exception", method_name(*m)),
            VariableKind::Temporary { method, site, role } => {
                format!("{}:{:?}@{}", method_name(*method), role, site)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pointsto_ir::{ClassHierarchyBuilder, MethodFlags};

    #[test]
    fn test_variables_are_deduplicated() {
        let mut builder = ClassHierarchyBuilder::new();
        let a = builder.declare_class("A", false).unwrap();
        let int = builder.resolve_type("int").unwrap();
        let m = builder
            .add_method(a, "m", vec![int, a], Some(a), MethodFlags::default())
            .unwrap();
        let h = builder.build();
        let mut factory = ReferenceVariableFactory::new();

        let x = factory.local(m, "x", a, false);
        assert_eq!(factory.local(m, "x", a, false), x);
        assert_ne!(factory.local(m, "y", a, false), x);

        let summary = factory.summary_nodes(&h, m);
        assert_eq!(summary.formals.len(), 3);
        assert!(summary.formals[1].is_none());
        assert_eq!(summary.formals[2].map(|v| v.ty), Some(a));
        assert_eq!(summary.ret.map(|v| v.ty), Some(a));
        let again = factory.summary_nodes(&h, m);
        assert_eq!(again.exception, summary.exception);
        assert_eq!(factory.describe(&h, summary.exception.id), "A.m:exception");
    }

    #[test]
    fn test_singleton_replicas_ignore_context() {
        let mut factory = ReferenceVariableFactory::new();
        let s = factory.static_field(FieldId(0), TypeId(9));
        let l = factory.local(MethodId(0), "l", TypeId(9), false);
        let ctx = Context::from_elements([crate::context::ContextElement::Type(TypeId(1))]);
        let initial = Context::empty();
        assert_eq!(s.replica(&ctx, &initial).context, initial);
        assert_eq!(l.replica(&ctx, &initial).context, ctx);
    }
}
