use super::*;
use crate::context::{CallSiteLabel, ContextElement};
use crate::graph::FieldKey;
use crate::haf::HeapAbstractionFactory;
use crate::heap::{AllocationKind, AllocationSite, InstanceKey, ObjectId, Recency};
use crate::loader::load_program;
use crate::program_point::InterProgramPoint;
use crate::variable::{ReferenceVariable, VariableKind};
use pointsto_ir::ProgramDecl;
use std::collections::BTreeSet;
use std::sync::atomic::AtomicU32;

fn program(xml: &str) -> Arc<Program> {
    // RUST_LOG=pointsto=trace shows the worklist
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    Arc::new(load_program(&ProgramDecl::parse(xml).unwrap()).unwrap())
}

fn solve_with(xml: &str, config: AnalysisConfig) -> Result<AnalysisResults, AnalysisError> {
    Solver::new(program(xml), config)?.solve()
}

fn solve(xml: &str) -> AnalysisResults {
    solve_with(xml, AnalysisConfig::default()).unwrap()
}

fn method(results: &AnalysisResults, name: &str) -> MethodId {
    results.program().hierarchy().lookup_method(name).unwrap()
}

fn local(results: &AnalysisResults, method_name: &str, name: &str) -> ReferenceVariable {
    let method = method(results, method_name);
    results
        .program()
        .variables()
        .lookup(&VariableKind::Local {
            method,
            name: name.to_string(),
        })
        .unwrap()
}

/// What `var` of `method_name` points to, over every context the method was analyzed in.
fn objects_of(results: &AnalysisResults, method_name: &str, var: ReferenceVariable) -> SortedSet {
    let method = method(results, method_name);
    results
        .reachable_contexts(method)
        .iter()
        .flat_map(|c| results.points_to(var, c).iter().collect::<Vec<_>>())
        .map(ObjectId)
        .collect()
}

fn names(results: &AnalysisResults, objects: &SortedSet) -> BTreeSet<String> {
    objects.iter().map(|o| results.describe_object(*o)).collect()
}

type SortedSet = BTreeSet<ObjectId>;

const ALLOC_COPY: &str = r#"
<program entry="Main.main">
  <class name="A"/>
  <class name="Main">
    <method name="main" static="true">
      <local name="x" type="A"/>
      <local name="y" type="A"/>
      <new target="x" type="A"/>
      <copy target="y" source="x"/>
    </method>
  </class>
</program>
"#;

#[test]
fn test_allocation_then_copy() {
    let results = solve(ALLOC_COPY);
    let x = objects_of(&results, "Main.main", local(&results, "Main.main", "x"));
    let y = objects_of(&results, "Main.main", local(&results, "Main.main", "y"));
    assert_eq!(x.len(), 1);
    assert_eq!(x, y);
    let only = results.instance_key(*x.iter().next().unwrap());
    assert_eq!(only.site.site, 0);
    assert_eq!(results.program().hierarchy().type_name(only.ty()), "A");
    assert!(!results.timed_out());
    assert_eq!(results.stats().objects, 1);
}

const VIRTUAL: &str = r#"
<program entry="Main.main">
  <class name="A">
    <method name="m" returns="Object">
      <return source="this"/>
    </method>
  </class>
  <class name="B" extends="A">
    <method name="m" returns="Object">
      <return source="this"/>
    </method>
  </class>
  <class name="C" extends="A">
    <method name="m" returns="Object">
      <return source="this"/>
    </method>
  </class>
  <class name="Main">
    <method name="main" static="true">
      <local name="r" type="A"/>
      <local name="o" type="Object"/>
      <new target="r" type="B"/>
      <new target="r" type="C"/>
      <call target="o" receiver="r" method="A.m"/>
    </method>
  </class>
</program>
"#;

#[test]
fn test_virtual_call_resolves_each_receiver() {
    let results = solve(VIRTUAL);
    let main = method(&results, "Main.main");
    let b_m = method(&results, "B.m");
    let c_m = method(&results, "C.m");
    let edges: Vec<_> = results
        .call_edges()
        .into_iter()
        .filter(|e| e.site.caller == main && e.site.site == 2)
        .collect();
    assert_eq!(edges.len(), 2);
    let callees: BTreeSet<_> = edges.iter().map(|e| e.callee).collect();
    assert_eq!(callees, BTreeSet::from([b_m, c_m]));
    assert_ne!(edges[0].callee_context, edges[1].callee_context);
    assert!(!results.is_reachable(method(&results, "A.m")));

    let r = objects_of(&results, "Main.main", local(&results, "Main.main", "r"));
    let o = objects_of(&results, "Main.main", local(&results, "Main.main", "o"));
    assert_eq!(r.len(), 2);
    assert_eq!(r, o);

    let graph = results.call_graph();
    assert_eq!(graph.edge_count(), 2);
    assert_eq!(graph.node_count(), 3);
}

const CLONE: &str = r#"
<program entry="Main.main">
  <class name="T"/>
  <class name="Main">
    <method name="main" static="true">
      <local name="t" type="T"/>
      <local name="arr" type="T[]"/>
      <local name="y" type="Object"/>
      <new target="t" type="T"/>
      <newarray target="arr" type="T"/>
      <astore base="arr" source="t"/>
      <call target="y" receiver="arr" method="Object.clone"/>
    </method>
  </class>
</program>
"#;

#[test]
fn test_clone_copies_array_contents() {
    let results = solve(CLONE);
    let arr = objects_of(&results, "Main.main", local(&results, "Main.main", "arr"));
    let y = objects_of(&results, "Main.main", local(&results, "Main.main", "y"));
    assert_eq!(arr.len(), 1);
    assert_eq!(y.len(), 1);
    let original = *arr.iter().next().unwrap();
    let copy = *y.iter().next().unwrap();
    assert_ne!(original, copy);
    assert_eq!(results.instance_key(copy).site.kind, AllocationKind::Clone);
    assert_eq!(results.instance_key(copy).ty(), results.instance_key(original).ty());

    let t = results.field_points_to(original, FieldKey::ArrayContents);
    assert_eq!(t.len(), 1);
    assert_eq!(results.field_points_to(copy, FieldKey::ArrayContents), t);
    // no body to analyze
    assert!(!results.is_reachable(results.program().hierarchy().clone_method()));
}

const ALIASING: &str = r#"
<program entry="Main.main">
  <class name="A">
    <field name="f" type="Object"/>
  </class>
  <class name="V"/>
  <class name="Main">
    <method name="main" static="true">
      <local name="a" type="A"/>
      <local name="b" type="A"/>
      <local name="v" type="V"/>
      <local name="w" type="Object"/>
      <new target="a" type="A"/>
      <new target="v" type="V"/>
      <store base="a" field="f" source="v"/>
      <copy target="b" source="a"/>
      <load target="w" base="b" field="f"/>
    </method>
  </class>
</program>
"#;

#[test]
fn test_store_then_load_through_alias() {
    let results = solve(ALIASING);
    let v = objects_of(&results, "Main.main", local(&results, "Main.main", "v"));
    let w = objects_of(&results, "Main.main", local(&results, "Main.main", "w"));
    assert_eq!(v.len(), 1);
    assert!(v.is_subset(&w));
}

/// Virtual dispatch, fields, arrays, statics and exceptions all feeding each other.
const MIXED: &str = r#"
<program entry="Main.main">
  <class name="Node">
    <field name="next" type="Node"/>
    <field name="item" type="Object"/>
    <method name="link" returns="Node">
      <param name="other" type="Node"/>
      <store base="this" field="next" source="other"/>
      <return source="other"/>
    </method>
  </class>
  <class name="Special" extends="Node">
    <method name="link" returns="Node">
      <param name="other" type="Node"/>
      <local name="n" type="Node"/>
      <load target="n" base="other" field="next"/>
      <store base="this" field="next" source="n"/>
      <return source="this"/>
    </method>
  </class>
  <class name="Oops" extends="Throwable"/>
  <class name="Registry">
    <field name="head" type="Node" static="true"/>
    <method name="&lt;clinit&gt;" static="true">
      <local name="n" type="Node"/>
      <new target="n" type="Special"/>
      <putstatic source="n" class="Registry" field="head"/>
    </method>
  </class>
  <class name="Main">
    <method name="fail" static="true">
      <local name="e" type="Oops"/>
      <new target="e" type="Oops"/>
      <throw source="e"/>
    </method>
    <method name="main" static="true">
      <catch type="Oops" var="caught"/>
      <local name="caught" type="Oops"/>
      <local name="a" type="Node"/>
      <local name="b" type="Node"/>
      <local name="c" type="Node"/>
      <local name="h" type="Node"/>
      <local name="arr" type="Node[]"/>
      <local name="x" type="Node"/>
      <new target="a" type="Node"/>
      <new target="b" type="Node"/>
      <getstatic target="h" class="Registry" field="head"/>
      <call target="c" receiver="a" method="Node.link" args="b"/>
      <call target="c" receiver="h" method="Node.link" args="c"/>
      <newarray target="arr" type="Node"/>
      <astore base="arr" source="c"/>
      <aload target="x" base="arr"/>
      <phi target="x" sources="a,h"/>
      <call method="Main.fail" kind="static"/>
    </method>
  </class>
</program>
"#;

#[test]
fn test_fixpoint_is_independent_of_worker_count() {
    let reference = solve_with(MIXED, AnalysisConfig::default().with_workers(1))
        .unwrap()
        .canonical();
    assert!(!reference.is_empty());
    for workers in [2, 4, 8] {
        for _ in 0..3 {
            let config = AnalysisConfig::default().with_workers(workers);
            let results = solve_with(MIXED, config).unwrap();
            assert_eq!(results.canonical(), reference, "{workers} workers");
        }
    }
}

#[test]
fn test_bit_vector_sets_reach_the_same_fixpoint() {
    let hashed = solve(MIXED).canonical();
    let config = AnalysisConfig {
        set_kind: crate::intset::IntSetKind::BitVector,
        ..AnalysisConfig::default()
    };
    assert_eq!(solve_with(MIXED, config).unwrap().canonical(), hashed);
}

#[test]
fn test_every_policy_reaches_a_fixpoint() {
    for policy in crate::haf::policies() {
        let config = AnalysisConfig::default().with_policy(policy.name);
        let results = solve_with(MIXED, config).unwrap();
        assert!(results.check_fixpoint().unwrap().is_empty(), "{}", policy.name);
        let caught = objects_of(&results, "Main.main", local(&results, "Main.main", "caught"));
        assert_eq!(caught.len(), 1, "{}", policy.name);
    }
}

#[test]
fn test_reprocessing_at_fixpoint_adds_nothing() {
    let results = solve(MIXED);
    assert_eq!(results.check_fixpoint().unwrap(), Vec::<String>::new());
    let edges = results.graph().edge_count();
    assert_eq!(results.stats().edges, edges);

    // class initializer ran, so the static field is populated
    let h = objects_of(&results, "Main.main", local(&results, "Main.main", "h"));
    assert_eq!(names(&results, &h).len(), 1);
    assert!(names(&results, &h).iter().all(|n| n.contains("Special")));
    let clinit = method(&results, "Registry.<clinit>");
    assert!(results.is_reachable(clinit));
}

const EXCEPTIONS: &str = r#"
<program entry="Main.main">
  <class name="E1" extends="Throwable"/>
  <class name="E2" extends="Throwable"/>
  <class name="Sub1" extends="E1"/>
  <class name="Main">
    <method name="thrower" static="true">
      <local name="a" type="Throwable"/>
      <local name="b" type="Throwable"/>
      <local name="c" type="Throwable"/>
      <new target="a" type="E1"/>
      <throw source="a"/>
      <new target="b" type="E2"/>
      <throw source="b"/>
      <new target="c" type="Sub1"/>
      <throw source="c"/>
    </method>
    <method name="main" static="true">
      <catch type="E1" var="first"/>
      <catch type="Sub1" var="second"/>
      <local name="first" type="E1"/>
      <local name="second" type="Sub1"/>
      <call method="Main.thrower" kind="static"/>
    </method>
  </class>
</program>
"#;

#[test]
fn test_exceptions_flow_to_the_first_matching_handler() {
    let results = solve(EXCEPTIONS);
    let main = method(&results, "Main.main");
    let thrower = method(&results, "Main.thrower");
    let hierarchy = results.program().hierarchy();
    let type_names = |objects: &SortedSet| -> BTreeSet<String> {
        objects
            .iter()
            .map(|o| hierarchy.type_name(results.instance_key(*o).ty()).to_string())
            .collect()
    };

    let first = objects_of(&results, "Main.main", local(&results, "Main.main", "first"));
    assert_eq!(type_names(&first), BTreeSet::from(["E1".to_string(), "Sub1".to_string()]));
    // an earlier handler already caught every Sub1
    let second = objects_of(&results, "Main.main", local(&results, "Main.main", "second"));
    assert!(second.is_empty());

    let escaped = results.program().summary(main).unwrap().exception;
    let escaped = objects_of(&results, "Main.main", escaped);
    assert_eq!(type_names(&escaped), BTreeSet::from(["E2".to_string()]));

    let thrown = results.program().summary(thrower).unwrap().exception;
    assert_eq!(objects_of(&results, "Main.thrower", thrown).len(), 3);
}

const FLOW_SENSITIVE: &str = r#"
<program entry="Main.main">
  <class name="A"/>
  <class name="B" extends="A"/>
  <class name="Main">
    <method name="main" static="true">
      <local name="x" type="A" flow_sensitive="true"/>
      <local name="y" type="A"/>
      <local name="z" type="A"/>
      <local name="w" type="A"/>
      <new target="x" type="A"/>
      <copy target="y" source="x"/>
      <new target="x" type="B"/>
      <copy target="z" source="x" branch="join"/>
      <new target="x" type="A"/>
      <copy target="w" source="x" label="join"/>
    </method>
  </class>
</program>
"#;

#[test]
fn test_flow_sensitive_writes_kill_earlier_values() {
    let results = solve(FLOW_SENSITIVE);
    let type_of = |objects: &SortedSet| -> BTreeSet<(String, u32)> {
        objects
            .iter()
            .map(|o| {
                let key = results.instance_key(*o);
                (
                    results.program().hierarchy().type_name(key.ty()).to_string(),
                    key.site.site,
                )
            })
            .collect()
    };
    let y = objects_of(&results, "Main.main", local(&results, "Main.main", "y"));
    let z = objects_of(&results, "Main.main", local(&results, "Main.main", "z"));
    let w = objects_of(&results, "Main.main", local(&results, "Main.main", "w"));
    assert_eq!(type_of(&y), BTreeSet::from([("A".to_string(), 0)]));
    assert_eq!(type_of(&z), BTreeSet::from([("B".to_string(), 2)]));
    // the branch skips the last allocation
    assert_eq!(
        type_of(&w),
        BTreeSet::from([("B".to_string(), 2), ("A".to_string(), 4)])
    );
    let x = objects_of(&results, "Main.main", local(&results, "Main.main", "x"));
    assert_eq!(x.len(), 3);
}

#[test]
fn test_flow_sensitive_handler_variables_are_rejected() {
    let xml = r#"
<program entry="Main.main">
  <class name="Main">
    <method name="main" static="true">
      <catch type="Throwable" var="t"/>
      <local name="t" type="Throwable" flow_sensitive="true"/>
      <local name="e" type="Throwable"/>
      <new target="e" type="Throwable"/>
      <throw source="e"/>
    </method>
  </class>
</program>
"#;
    let err = solve_with(xml, AnalysisConfig::default()).unwrap_err();
    assert!(matches!(
        err,
        AnalysisError::MissingProgramPoint { variable, context, .. }
            if variable == "Main.main:t" && context == "[]"
    ));
}

const RECENCY_LOOP: &str = r#"
<program entry="Main.main">
  <class name="A">
    <field name="f" type="A"/>
  </class>
  <class name="Main">
    <method name="main" static="true">
      <local name="x" type="A" flow_sensitive="true"/>
      <local name="prev" type="A" flow_sensitive="true"/>
      <local name="older" type="A"/>
      <local name="current" type="A"/>
      <local name="inner" type="A"/>
      <copy target="prev" source="x" label="top"/>
      <new target="x" type="A" branch="top"/>
      <store base="x" field="f" source="x"/>
      <copy target="older" source="prev"/>
      <copy target="current" source="x"/>
      <load target="inner" base="older" field="f"/>
    </method>
  </class>
</program>
"#;

#[test]
fn test_recency_separates_objects_of_earlier_iterations() {
    let config = AnalysisConfig {
        recency: true,
        ..AnalysisConfig::default()
    };
    let results = solve_with(RECENCY_LOOP, config).unwrap();
    let older = objects_of(&results, "Main.main", local(&results, "Main.main", "older"));
    let current = objects_of(&results, "Main.main", local(&results, "Main.main", "current"));
    let recency = |objects: &SortedSet| -> Vec<Recency> {
        objects
            .iter()
            .map(|o| results.instance_key(*o).recency)
            .collect()
    };
    // prev was written before the allocation ran again
    assert_eq!(recency(&older), vec![Recency::Summary]);
    assert_eq!(recency(&current), vec![Recency::MostRecent]);
    let old = *older.iter().next().unwrap();
    let new = *current.iter().next().unwrap();
    assert_eq!(
        results.instance_key(old),
        results.instance_key(new).with_recency(Recency::Summary)
    );

    // the summary's fields cover everything stored into the recent object
    let inner = objects_of(&results, "Main.main", local(&results, "Main.main", "inner"));
    assert!(inner.contains(&new));

    let main = method(&results, "Main.main");
    let prev = local(&results, "Main.main", "prev");
    let point = results.program().points().point_of(main, 3).unwrap();
    let contexts = results.reachable_contexts(main);
    let at = results.points_to_at(prev, &contexts[0], InterProgramPoint::Pre(point));
    assert_eq!(at.iter().map(ObjectId).collect::<SortedSet>(), older);

    // without the refinement both variables share one object
    let plain = solve(RECENCY_LOOP);
    let older = objects_of(&plain, "Main.main", local(&plain, "Main.main", "older"));
    let current = objects_of(&plain, "Main.main", local(&plain, "Main.main", "current"));
    assert_eq!(older.len(), 1);
    assert_eq!(older, current);
}

#[test]
fn test_timeout_returns_partial_results() {
    let config = AnalysisConfig {
        timeout_ms: Some(0),
        ..AnalysisConfig::default()
    };
    let results = solve_with(MIXED, config).unwrap();
    assert!(results.timed_out());
    assert_eq!(results.stats().processed, 0);
}

#[test]
fn test_unknown_policy_is_rejected_up_front() {
    let err = solve_with(ALLOC_COPY, AnalysisConfig::default().with_policy("nope")).unwrap_err();
    assert!(matches!(err, AnalysisError::UnknownPolicy(name) if name == "nope"));
}

#[test]
fn test_unresolvable_dispatch_is_fatal() {
    let xml = r#"
<program entry="Main.main">
  <class name="A">
    <method name="m" abstract="true"/>
  </class>
  <class name="B" extends="A"/>
  <class name="Main">
    <method name="main" static="true">
      <local name="r" type="A"/>
      <new target="r" type="B"/>
      <call receiver="r" method="A.m"/>
    </method>
  </class>
</program>
"#;
    let err = solve_with(xml, AnalysisConfig::default()).unwrap_err();
    match err {
        AnalysisError::UnresolvedTarget {
            receiver,
            statement,
            ..
        } => {
            assert_eq!(receiver, "B");
            assert!(statement.starts_with("Main.main#1"));
        }
        other => panic!("unexpected error {other}"),
    }
}

/// Allocates into a different heap context every other time it is asked.
#[derive(Debug, Default)]
struct Flaky(AtomicU32);

impl HeapAbstractionFactory for Flaky {
    fn name(&self) -> &'static str {
        "flaky"
    }

    fn merge(&self, _: CallSiteLabel, _: Option<&InstanceKey>, caller: &Context) -> Context {
        caller.clone()
    }

    fn record(&self, site: AllocationSite, context: &Context) -> InstanceKey {
        match self.0.fetch_add(1, Ordering::Relaxed) % 2 {
            0 => InstanceKey::new(site, context.clone()),
            _ => InstanceKey::new(site, Context::from_elements([ContextElement::Type(site.ty)])),
        }
    }
}

#[test]
fn test_impure_policy_is_reported_when_verifying() {
    let haf = HeapAbstraction::new(Arc::new(Flaky::default()), true);
    let solver =
        Solver::with_heap_abstraction(program(ALLOC_COPY), AnalysisConfig::default(), haf);
    let err = solver.solve().unwrap_err();
    assert!(matches!(err, AnalysisError::ImpurePolicy { policy: "flaky", .. }));
}
