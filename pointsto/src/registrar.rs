use crate::error::AnalysisError;
use crate::program_point::{ProgramPointGraph, ProgramPointGraphBuilder};
use crate::statement::{ConstraintStatement, StatementId};
use crate::variable::{MethodSummaryNodes, ReferenceVariable, ReferenceVariableFactory, VariableId};
use pointsto_ir::{ClassHierarchy, MethodId};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Collects the constraint statements of a program, method by method.
///
/// This is the build phase: everything here takes `&mut self`. [`seal`](Self::seal) turns
/// the registrar into an immutable [`Program`] the solver can share between workers.
pub struct StatementRegistrar {
    hierarchy: Arc<ClassHierarchy>,
    variables: ReferenceVariableFactory,
    points: ProgramPointGraphBuilder,
    statements: Vec<Box<dyn ConstraintStatement>>,
    by_method: HashMap<MethodId, Vec<StatementId>>,
    sites: HashSet<(MethodId, u32)>,
    summaries: HashMap<MethodId, MethodSummaryNodes>,
    entry: Option<MethodId>,
    initializers: Vec<MethodId>,
}

impl StatementRegistrar {
    pub fn new(hierarchy: Arc<ClassHierarchy>) -> Self {
        Self {
            hierarchy,
            variables: ReferenceVariableFactory::new(),
            points: ProgramPointGraphBuilder::new(),
            statements: Vec::new(),
            by_method: HashMap::new(),
            sites: HashSet::new(),
            summaries: HashMap::new(),
            entry: None,
            initializers: Vec::new(),
        }
    }

    pub fn hierarchy(&self) -> &ClassHierarchy {
        &self.hierarchy
    }

    pub fn variables(&mut self) -> &mut ReferenceVariableFactory {
        &mut self.variables
    }

    pub fn points(&mut self) -> &mut ProgramPointGraphBuilder {
        &mut self.points
    }

    /// The summary nodes of `method`, created the first time any method asks.
    pub fn summary(&mut self, method: MethodId) -> MethodSummaryNodes {
        if let Some(s) = self.summaries.get(&method) {
            return s.clone();
        }
        let s = self.variables.summary_nodes(&self.hierarchy, method);
        self.summaries.insert(method, s.clone());
        s
    }

    /// Add a statement. Each (method, site) pair may be registered once.
    pub fn register<S: ConstraintStatement + 'static>(
        &mut self,
        statement: S,
    ) -> Result<StatementId, AnalysisError> {
        let method = statement.method();
        if !self.sites.insert((method, statement.site())) {
            return Err(AnalysisError::DuplicateStatement {
                method: describe_method(&self.hierarchy, method),
                site: statement.site(),
                statement: statement.to_string(),
            });
        }
        let id = StatementId(self.statements.len() as u32);
        self.statements.push(Box::new(statement));
        self.by_method.entry(method).or_default().push(id);
        Ok(id)
    }

    /// Substitute `new` for `old` in every statement of `method`. Returns how many
    /// statements changed.
    pub fn replace_use(
        &mut self,
        method: MethodId,
        old: ReferenceVariable,
        new: ReferenceVariable,
    ) -> usize {
        let ids = self.by_method.get(&method).cloned().unwrap_or_default();
        ids.iter()
            .filter(|id| self.statements[id.0 as usize].replace_use(old, new))
            .count()
    }

    pub fn statements_for_method(&self, method: MethodId) -> &[StatementId] {
        self.by_method.get(&method).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn set_entry(&mut self, method: MethodId) {
        self.entry = Some(method);
    }

    /// A class initializer to run in the initial context before anything else.
    pub fn add_initializer(&mut self, method: MethodId) {
        if !self.initializers.contains(&method) {
            self.initializers.push(method);
        }
    }

    pub fn seal(mut self) -> Result<Program, AnalysisError> {
        let entry = self
            .entry
            .ok_or_else(|| AnalysisError::MissingEntryPoint("<none>".to_string()))?;
        let methods: Vec<MethodId> = self.hierarchy.methods().map(|m| m.id).collect();
        for m in methods {
            self.summary(m);
        }
        let kills = self
            .statements
            .iter()
            .filter_map(|s| {
                let var = s.defined_variable().filter(|v| v.flow_sensitive)?;
                Some((s.point()?, var.id))
            })
            .collect();
        tracing::debug!(
            statements = self.statements.len(),
            variables = self.variables.len(),
            "sealed program"
        );
        Ok(Program {
            hierarchy: self.hierarchy,
            variables: self.variables,
            points: self.points.seal(kills),
            statements: self.statements,
            by_method: self.by_method,
            summaries: self.summaries,
            entry,
            initializers: self.initializers,
        })
    }
}

fn describe_method(hierarchy: &ClassHierarchy, method: MethodId) -> String {
    let m = hierarchy.method(method);
    format!("{}.{}", hierarchy.type_name(m.declaring), m.name)
}

/// An immutable, fully registered program.
pub struct Program {
    hierarchy: Arc<ClassHierarchy>,
    variables: ReferenceVariableFactory,
    points: ProgramPointGraph,
    statements: Vec<Box<dyn ConstraintStatement>>,
    by_method: HashMap<MethodId, Vec<StatementId>>,
    summaries: HashMap<MethodId, MethodSummaryNodes>,
    entry: MethodId,
    initializers: Vec<MethodId>,
}

impl Program {
    pub fn hierarchy(&self) -> &ClassHierarchy {
        &self.hierarchy
    }

    pub fn shared_hierarchy(&self) -> Arc<ClassHierarchy> {
        self.hierarchy.clone()
    }

    pub fn variables(&self) -> &ReferenceVariableFactory {
        &self.variables
    }

    pub fn points(&self) -> &ProgramPointGraph {
        &self.points
    }

    pub fn entry(&self) -> MethodId {
        self.entry
    }

    pub fn initializers(&self) -> &[MethodId] {
        &self.initializers
    }

    pub fn statement(&self, id: StatementId) -> &dyn ConstraintStatement {
        self.statements[id.0 as usize].as_ref()
    }

    pub fn statements(&self) -> impl Iterator<Item = (StatementId, &dyn ConstraintStatement)> {
        self.statements
            .iter()
            .enumerate()
            .map(|(i, s)| (StatementId(i as u32), s.as_ref()))
    }

    pub fn statement_count(&self) -> usize {
        self.statements.len()
    }

    pub fn statements_for_method(&self, method: MethodId) -> &[StatementId] {
        self.by_method.get(&method).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn summary(&self, method: MethodId) -> Option<&MethodSummaryNodes> {
        self.summaries.get(&method)
    }

    pub fn describe_method(&self, method: MethodId) -> String {
        describe_method(&self.hierarchy, method)
    }

    pub fn describe_variable(&self, var: VariableId) -> String {
        self.variables.describe(&self.hierarchy, var)
    }

    pub fn describe_statement(&self, id: StatementId) -> String {
        let s = self.statement(id);
        format!("{}#{}: {}", self.describe_method(s.method()), s.site(), s)
    }
}

impl std::fmt::Debug for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Program")
            .field("entry", &self.describe_method(self.entry))
            .field("statements", &self.statements.len())
            .field("variables", &self.variables.len())
            .field("points", &self.points.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::{CopyStatement, NewStatement};
    use pointsto_ir::{ClassHierarchyBuilder, MethodFlags};

    fn registrar() -> (StatementRegistrar, MethodId, pointsto_ir::TypeId) {
        let mut builder = ClassHierarchyBuilder::new();
        let a = builder.declare_class("A", false).unwrap();
        let main = builder
            .add_method(
                a,
                "main",
                vec![],
                None,
                MethodFlags {
                    is_static: true,
                    ..Default::default()
                },
            )
            .unwrap();
        (StatementRegistrar::new(Arc::new(builder.build())), main, a)
    }

    #[test]
    fn test_duplicate_site_is_fatal() {
        let (mut reg, main, a) = registrar();
        let x = reg.variables().local(main, "x", a, false);
        let new = NewStatement {
            method: main,
            site: 0,
            point: None,
            target: x,
            ty: a,
        };
        reg.register(new.clone()).unwrap();
        let err = reg.register(new).unwrap_err();
        assert!(matches!(err, AnalysisError::DuplicateStatement { site: 0, .. }));
    }

    #[test]
    fn test_seal_requires_an_entry_and_builds_summaries() {
        let (mut reg, main, a) = registrar();
        let x = reg.variables().local(main, "x", a, false);
        let y = reg.variables().local(main, "y", a, false);
        let z = reg.variables().local(main, "z", a, false);
        reg.register(CopyStatement {
            method: main,
            site: 0,
            point: None,
            target: y,
            source: x,
            cast: None,
        })
        .unwrap();
        assert_eq!(reg.replace_use(main, x, z), 1);
        assert_eq!(reg.replace_use(main, x, z), 0);
        assert!(matches!(
            StatementRegistrar::new(Arc::new(ClassHierarchyBuilder::new().build())).seal(),
            Err(AnalysisError::MissingEntryPoint(_))
        ));

        reg.set_entry(main);
        let program = reg.seal().unwrap();
        assert_eq!(program.statements_for_method(main).len(), 1);
        let id = program.statements_for_method(main)[0];
        assert_eq!(program.statement(id).used_variables(), vec![z]);
        assert!(program.summary(main).is_some());
        // Object.clone exists in every hierarchy
        assert!(program.summary(program.hierarchy().clone_method()).is_some());
        assert_eq!(program.describe_statement(id), format!("A.main#0: v{} = v{}", y.id.0, z.id.0));
    }
}
