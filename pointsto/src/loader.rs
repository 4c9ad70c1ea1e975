//! Builds a sealed [`Program`] from an XML [`ProgramDecl`].

use crate::error::AnalysisError;
use crate::graph::FieldKey;
use crate::program_point::ProgramPoint;
use crate::registrar::{Program, StatementRegistrar};
use crate::statement::{
    CallKind, CallStatement, ClassInitStatement, CopyStatement, ExceptionFlowStatement, Handler,
    LoadStatement, NewArrayStatement, NewStatement, PhiStatement, ReturnStatement, StaticAccess,
    StaticFieldStatement, StoreStatement,
};
use crate::variable::{MethodSummaryNodes, ReferenceVariable, Temporary};
use pointsto_ir::decl::{MethodDecl, StatementDecl, split_list};
use pointsto_ir::{ClassHierarchy, IrError, MethodId, ProgramDecl, TypeId};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Read and load the program described by the XML file at `path`.
pub fn load_file(path: &Path) -> Result<Program, AnalysisError> {
    let decl = ProgramDecl::from_file(path)?;
    load_program(&decl)
}

/// Translate every method body of `decl` into constraint statements.
#[instrument(skip_all, fields(entry = %decl.entry))]
pub fn load_program(decl: &ProgramDecl) -> Result<Program, AnalysisError> {
    let hierarchy = Arc::new(decl.build_hierarchy()?);
    let mut registrar = StatementRegistrar::new(hierarchy.clone());
    for class in &decl.classes {
        for method in class.methods() {
            let id = hierarchy.lookup_method(&format!("{}.{}", class.name, method.name))?;
            MethodLoader::new(&mut registrar, &hierarchy, id, method)?.load(method)?;
        }
    }
    let entry = hierarchy
        .lookup_method(&decl.entry)
        .map_err(|_| AnalysisError::MissingEntryPoint(decl.entry.clone()))?;
    registrar.set_entry(entry);
    for init in hierarchy.class_initializers_for(hierarchy.method(entry).declaring) {
        registrar.add_initializer(init);
    }
    registrar.seal()
}

/// Per-method translation state.
struct MethodLoader<'a> {
    registrar: &'a mut StatementRegistrar,
    hierarchy: &'a ClassHierarchy,
    method: MethodId,
    summary: MethodSummaryNodes,
    vars: HashMap<String, ReferenceVariable>,
    handlers: Arc<[Handler]>,
}

impl<'a> MethodLoader<'a> {
    fn new(
        registrar: &'a mut StatementRegistrar,
        hierarchy: &'a ClassHierarchy,
        method: MethodId,
        decl: &MethodDecl,
    ) -> Result<Self, AnalysisError> {
        let summary = registrar.summary(method);
        let mut vars = HashMap::new();
        let mut formals = summary.formals.iter();
        if !hierarchy.method(method).is_static {
            if let Some(Some(this)) = formals.next() {
                vars.insert("this".to_string(), *this);
            }
        }
        for (param, formal) in decl.params().zip(formals) {
            if let Some(formal) = formal {
                vars.insert(param.name.clone(), *formal);
            }
        }
        for local in decl.locals() {
            let ty = lookup_type(hierarchy, &local.ty)?;
            if hierarchy.is_reference(ty) {
                let var = registrar
                    .variables()
                    .local(method, &local.name, ty, local.flow_sensitive);
                vars.insert(local.name.clone(), var);
            }
        }
        let mut loader = Self {
            registrar,
            hierarchy,
            method,
            summary,
            vars,
            handlers: Arc::from(Vec::new()),
        };
        let handlers = decl
            .catches()
            .map(|c| {
                Ok(Handler {
                    ty: lookup_type(hierarchy, &c.ty)?,
                    var: loader.var(&c.var)?,
                })
            })
            .collect::<Result<Vec<_>, AnalysisError>>()?;
        loader.handlers = handlers.into();
        Ok(loader)
    }

    fn method_name(&self) -> String {
        let m = self.hierarchy.method(self.method);
        format!("{}.{}", self.hierarchy.type_name(m.declaring), m.name)
    }

    fn var(&self, name: &str) -> Result<ReferenceVariable, AnalysisError> {
        self.vars
            .get(name)
            .copied()
            .ok_or_else(|| AnalysisError::UnknownVariable {
                method: self.method_name(),
                name: name.to_string(),
            })
    }

    fn required_var(
        &self,
        value: &Option<String>,
        element: &'static str,
        attribute: &'static str,
    ) -> Result<ReferenceVariable, AnalysisError> {
        self.var(StatementDecl::require(value, element, attribute)?)
    }

    fn load(mut self, decl: &MethodDecl) -> Result<(), AnalysisError> {
        let statements: Vec<_> = decl.statements().collect();
        // calls also own the site right after theirs, for the exception flow
        let mut sites = Vec::with_capacity(statements.len());
        let mut next = 0;
        for (element, _) in &statements {
            sites.push(next);
            next += if *element == "call" { 2 } else { 1 };
        }
        let points = self.control_flow(&statements, &sites)?;
        for (((element, stmt), site), point) in statements.iter().zip(&sites).zip(&points) {
            self.translate(*element, stmt, *site, *point)?;
        }
        debug!(
            method = %self.method_name(),
            statements = self.registrar.statements_for_method(self.method).len(),
            "loaded method"
        );
        Ok(())
    }

    /// One program point per statement, linked in declaration order except where a statement
    /// jumps, branches, returns or throws.
    fn control_flow(
        &mut self,
        statements: &[(&'static str, &StatementDecl)],
        sites: &[u32],
    ) -> Result<Vec<ProgramPoint>, AnalysisError> {
        let method = self.method;
        let points_builder = self.registrar.points();
        let (entry, exit) = points_builder.method_points(method);
        let points: Vec<ProgramPoint> = sites
            .iter()
            .map(|site| points_builder.add_point(method, *site))
            .collect();
        let labels: HashMap<&str, ProgramPoint> = statements
            .iter()
            .zip(&points)
            .filter_map(|((_, s), p)| Some((s.label.as_deref()?, *p)))
            .collect();
        let target = |label: &str| {
            labels
                .get(label)
                .copied()
                .ok_or_else(|| AnalysisError::UnknownLabel {
                    method: self.method_name(),
                    label: label.to_string(),
                })
        };
        let mut edges = vec![(entry, points.first().copied().unwrap_or(exit))];
        for (i, (element, stmt)) in statements.iter().enumerate() {
            let from = points[i];
            let fallthrough = points.get(i + 1).copied().unwrap_or(exit);
            match (*element, &stmt.jump, &stmt.branch) {
                ("return" | "throw", _, _) => edges.push((from, exit)),
                (_, Some(label), _) => edges.push((from, target(label)?)),
                (_, None, Some(label)) => {
                    edges.push((from, target(label)?));
                    edges.push((from, fallthrough));
                }
                (_, None, None) => edges.push((from, fallthrough)),
            }
        }
        let points_builder = self.registrar.points();
        for (from, to) in edges {
            points_builder.add_successor(from, to);
        }
        Ok(points)
    }

    fn field_of(
        &self,
        element: &'static str,
        stmt: &StatementDecl,
        base: Option<ReferenceVariable>,
    ) -> Result<pointsto_ir::FieldId, AnalysisError> {
        let name = StatementDecl::require(&stmt.field, element, "field")?;
        let class = match (&stmt.class, base) {
            (Some(class), _) => lookup_type(self.hierarchy, class)?,
            (None, Some(base)) => base.ty,
            (None, None) => {
                return Err(IrError::MissingAttribute {
                    element,
                    attribute: "class",
                }
                .into());
            }
        };
        Ok(self.hierarchy.lookup_field(class, name)?)
    }

    fn translate(
        &mut self,
        element: &'static str,
        stmt: &StatementDecl,
        site: u32,
        point: ProgramPoint,
    ) -> Result<(), AnalysisError> {
        let method = self.method;
        let point = Some(point);
        match element {
            "new" => {
                let target = self.required_var(&stmt.target, element, "target")?;
                let ty = StatementDecl::require(&stmt.ty, element, "type")?;
                let ty = lookup_type(self.hierarchy, ty)?;
                self.registrar.register(NewStatement {
                    method,
                    site,
                    point,
                    target,
                    ty,
                })?;
            }
            "newarray" => {
                let target = self.required_var(&stmt.target, element, "target")?;
                let dims = stmt.dims.unwrap_or(1).max(1);
                let mut name = StatementDecl::require(&stmt.ty, element, "type")?.to_string();
                for _ in 0..dims {
                    name.push_str("[]");
                }
                self.registrar.register(NewArrayStatement {
                    method,
                    site,
                    point,
                    target,
                    ty: lookup_type(self.hierarchy, &name)?,
                    dims,
                })?;
            }
            "copy" => {
                let cast = stmt
                    .ty
                    .as_deref()
                    .map(|ty| lookup_type(self.hierarchy, ty))
                    .transpose()?;
                let target = self.required_var(&stmt.target, element, "target")?;
                let source = self.required_var(&stmt.source, element, "source")?;
                self.registrar.register(CopyStatement {
                    method,
                    site,
                    point,
                    target,
                    source,
                    cast,
                })?;
            }
            "phi" => {
                let sources = split_list(&stmt.sources)
                    .into_iter()
                    .map(|s| self.var(s))
                    .collect::<Result<Vec<_>, _>>()?;
                let target = self.required_var(&stmt.target, element, "target")?;
                self.registrar.register(PhiStatement {
                    method,
                    site,
                    point,
                    target,
                    sources,
                })?;
            }
            "load" | "aload" => {
                let base = self.required_var(&stmt.base, element, "base")?;
                let field = match element {
                    "load" => FieldKey::Named(self.field_of(element, stmt, Some(base))?),
                    _ => FieldKey::ArrayContents,
                };
                let target = self.required_var(&stmt.target, element, "target")?;
                self.registrar.register(LoadStatement {
                    method,
                    site,
                    point,
                    target,
                    base,
                    field,
                })?;
            }
            "store" | "astore" => {
                let base = self.required_var(&stmt.base, element, "base")?;
                let field = match element {
                    "store" => FieldKey::Named(self.field_of(element, stmt, Some(base))?),
                    _ => FieldKey::ArrayContents,
                };
                let source = self.required_var(&stmt.source, element, "source")?;
                self.registrar.register(StoreStatement {
                    method,
                    site,
                    point,
                    base,
                    field,
                    source,
                })?;
            }
            "getstatic" | "putstatic" => {
                let (access, local) = match element {
                    "getstatic" => (
                        StaticAccess::Get,
                        self.required_var(&stmt.target, element, "target")?,
                    ),
                    _ => (
                        StaticAccess::Put,
                        self.required_var(&stmt.source, element, "source")?,
                    ),
                };
                let id = self.field_of(element, stmt, None)?;
                let field = self.hierarchy.field(id);
                let var = self.registrar.variables().static_field(id, field.ty);
                self.registrar.register(StaticFieldStatement {
                    method,
                    site,
                    point,
                    access,
                    local,
                    field: var,
                    initializers: self.hierarchy.class_initializers_for(field.declaring),
                })?;
            }
            "call" => self.translate_call(stmt, site, point)?,
            "return" => {
                if let (Some(source), Some(ret)) = (&stmt.source, self.summary.ret) {
                    let source = self.var(source)?;
                    self.registrar.register(ReturnStatement {
                        method,
                        site,
                        point,
                        source,
                        summary: ret,
                    })?;
                }
            }
            "throw" => {
                let source = self.required_var(&stmt.source, element, "source")?;
                self.registrar.register(ExceptionFlowStatement {
                    method,
                    site,
                    point,
                    source,
                    handlers: self.handlers.clone(),
                    summary: self.summary.exception,
                })?;
            }
            "clinit" => {
                let class = StatementDecl::require(&stmt.class, element, "class")?;
                let class = lookup_type(self.hierarchy, class)?;
                self.registrar.register(ClassInitStatement {
                    method,
                    site,
                    point,
                    initializers: self.hierarchy.class_initializers_for(class),
                })?;
            }
            other => tracing::warn!(element = other, "skipping unsupported statement"),
        }
        Ok(())
    }

    fn translate_call(
        &mut self,
        stmt: &StatementDecl,
        site: u32,
        point: Option<ProgramPoint>,
    ) -> Result<(), AnalysisError> {
        let element = "call";
        let callee = self
            .hierarchy
            .lookup_method(StatementDecl::require(&stmt.method, element, "method")?)?;
        let kind = match stmt.kind.as_deref() {
            None | Some("virtual") | Some("interface") => CallKind::Virtual,
            Some("special") => CallKind::Special,
            Some("static") => CallKind::Static,
            Some(_) => {
                return Err(IrError::MissingAttribute {
                    element,
                    attribute: "kind",
                }
                .into());
            }
        };
        let receiver = match kind {
            CallKind::Static => None,
            _ => Some(self.required_var(&stmt.receiver, element, "receiver")?),
        };
        let declared = self.hierarchy.method(callee);
        let args = declared
            .params
            .iter()
            .zip(split_list(&stmt.args).into_iter().map(Some).chain(std::iter::repeat(None)))
            .map(|(ty, arg)| match arg {
                Some(name) if self.hierarchy.is_reference(*ty) && name != "_" => {
                    self.var(name).map(Some)
                }
                _ => Ok(None),
            })
            .collect::<Result<Vec<_>, _>>()?;
        let result = stmt.target.as_deref().map(|t| self.var(t)).transpose()?;
        let exception = self.registrar.variables().temporary(
            self.method,
            site,
            Temporary::CallException,
            self.hierarchy.throwable(),
        );
        self.registrar.register(CallStatement {
            method: self.method,
            site,
            point,
            kind,
            callee,
            receiver,
            args,
            result,
            exception,
        })?;
        self.registrar.register(ExceptionFlowStatement {
            method: self.method,
            site: site + 1,
            point: None,
            source: exception,
            handlers: self.handlers.clone(),
            summary: self.summary.exception,
        })?;
        Ok(())
    }
}

fn lookup_type(hierarchy: &ClassHierarchy, name: &str) -> Result<TypeId, AnalysisError> {
    hierarchy
        .lookup_type(name)
        .ok_or_else(|| IrError::UnknownType(name.to_string()).into())
}
