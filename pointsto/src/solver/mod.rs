//! The worklist fixpoint engine.
//!
//! A work item is a (statement, context) pair plus what it has yet to see: either `None`, a
//! full evaluation, or the [`GraphDelta`] accumulated since its last run. Enqueueing a pair
//! that is already pending folds the new delta into the pending one, so each pair is queued
//! at most once at a time. Every enqueue of a fresh pair spawns one task into a `rayon`
//! scope; when the scope ends, nothing is pending and the graph is a fixpoint.

#[cfg(test)]
mod tests;

use crate::arena::Interner;
use crate::config::AnalysisConfig;
use crate::context::Context;
use crate::error::AnalysisError;
use crate::graph::{DeltaView, FullView, GraphDelta, PointsToGraph, SubscriberId};
use crate::haf::{HeapAbstraction, heap_abstraction};
use crate::intset::IntSet;
use crate::lattice::JoinSemiLattice;
use crate::registrar::Program;
use crate::results::AnalysisResults;
use crate::statement::{ProcessContext, StatementId};
use pointsto_ir::MethodId;
use rayon::Scope;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, trace, warn};

/// Counters describing one finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SolverStats {
    /// Statement evaluations, full and incremental
    pub processed: u64,
    pub nodes: usize,
    pub objects: usize,
    pub edges: usize,
    pub call_edges: usize,
    /// Reachable (method, context) pairs
    pub reachable: usize,
    pub elapsed: Duration,
}

/// Runs a [`Program`] to its points-to fixpoint.
#[derive(Debug)]
pub struct Solver {
    program: Arc<Program>,
    config: AnalysisConfig,
    haf: HeapAbstraction,
}

impl Solver {
    /// A solver using the heap abstraction policy `config` names.
    pub fn new(program: Arc<Program>, config: AnalysisConfig) -> Result<Self, AnalysisError> {
        let haf = heap_abstraction(&config)?;
        Ok(Self::with_heap_abstraction(program, config, haf))
    }

    pub fn with_heap_abstraction(
        program: Arc<Program>,
        config: AnalysisConfig,
        haf: HeapAbstraction,
    ) -> Self {
        Self {
            program,
            config,
            haf,
        }
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    #[instrument(skip_all, fields(policy = self.haf.name()))]
    pub fn solve(&self) -> Result<AnalysisResults, AnalysisError> {
        let start = Instant::now();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers)
            .build()?;
        let session = Session {
            program: &self.program,
            graph: PointsToGraph::new(self.program.shared_hierarchy(), self.config.set_kind),
            haf: &self.haf,
            subscribers: Interner::new(),
            reachable: Interner::new(),
            pending: Mutex::new(HashMap::new()),
            processed: AtomicU64::new(0),
            deadline: self.config.timeout().map(|t| start + t),
            timed_out: AtomicBool::new(false),
            abort: AtomicBool::new(false),
            error: Mutex::new(None),
        };
        info!(
            statements = self.program.statement_count(),
            workers = pool.current_num_threads(),
            "solving"
        );
        pool.scope(|scope| session.seed(scope));

        let Session {
            graph,
            subscribers,
            reachable,
            processed,
            timed_out,
            error,
            ..
        } = session;
        if let Some(e) = error.into_inner().unwrap_or_else(|e| e.into_inner()) {
            return Err(e);
        }
        let timed_out = timed_out.into_inner();
        let stats = SolverStats {
            processed: processed.into_inner(),
            nodes: graph.node_count(),
            objects: graph.object_count(),
            edges: graph.edge_count(),
            call_edges: graph.call_count(),
            reachable: reachable.len(),
            elapsed: start.elapsed(),
        };
        if timed_out {
            warn!(?stats, "timed out; the points-to graph is partial and may be unsound");
        } else {
            info!(?stats, "reached fixpoint");
        }
        Ok(AnalysisResults::new(
            self.program.clone(),
            self.haf.clone(),
            graph,
            subscribers,
            reachable.entries().into_iter().map(|(k, _)| k).collect(),
            stats,
            timed_out,
        ))
    }
}

/// State shared by every worker of one run.
struct Session<'a> {
    program: &'a Program,
    graph: PointsToGraph,
    haf: &'a HeapAbstraction,
    subscribers: Interner<(StatementId, Context)>,
    reachable: Interner<(MethodId, Context)>,
    pending: Mutex<HashMap<SubscriberId, Option<GraphDelta>>>,
    processed: AtomicU64,
    deadline: Option<Instant>,
    timed_out: AtomicBool,
    abort: AtomicBool,
    error: Mutex<Option<AnalysisError>>,
}

impl<'a> Session<'a> {
    fn pending(&self) -> MutexGuard<'_, HashMap<SubscriberId, Option<GraphDelta>>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn seed<'s>(&'s self, scope: &Scope<'s>) {
        let initial = self.haf.initial_context();
        let initializers = self.program.initializers();
        // seed initializers count as triggered
        let triggered = self.graph.add_class_initializers(initializers);
        for init in triggered.class_inits().iter() {
            self.reach(scope, MethodId(init), &initial);
        }
        self.reach(scope, self.program.entry(), &initial);
    }

    /// Mark `method` reachable in `context`, scheduling all of its statements the first time.
    fn reach<'s>(&'s self, scope: &Scope<'s>, method: MethodId, context: &Context) {
        let (_, new) = self.reachable.intern((method, context.clone()));
        if !new {
            return;
        }
        debug!(method = %self.program.describe_method(method), %context, "reachable");
        for statement in self.program.statements_for_method(method) {
            let (id, _) = self.subscribers.intern((*statement, context.clone()));
            self.enqueue(scope, SubscriberId(id), None);
        }
    }

    fn enqueue<'s>(
        &'s self,
        scope: &Scope<'s>,
        subscriber: SubscriberId,
        delta: Option<GraphDelta>,
    ) {
        let mut pending = self.pending();
        match pending.entry(subscriber) {
            Entry::Occupied(mut e) => match (e.get_mut(), delta) {
                (Some(queued), Some(delta)) => queued.join(&delta),
                (slot, None) => *slot = None,
                (None, Some(_)) => {}
            },
            Entry::Vacant(e) => {
                e.insert(delta);
                drop(pending);
                scope.spawn(move |scope| self.run(scope, subscriber));
            }
        }
    }

    fn run<'s>(&'s self, scope: &Scope<'s>, subscriber: SubscriberId) {
        let Some(delta) = self.pending().remove(&subscriber) else {
            return;
        };
        if self.abort.load(Ordering::Acquire) {
            return;
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            self.timed_out.store(true, Ordering::Release);
            self.abort.store(true, Ordering::Release);
            return;
        }
        let (statement, context) = self.subscribers.key(subscriber.0);
        let cx = ProcessContext {
            program: self.program,
            graph: &self.graph,
            haf: self.haf,
            context: &context,
            statement,
            originator: subscriber,
        };
        let stmt = self.program.statement(statement);
        trace!(statement = %stmt, %context, incremental = delta.is_some(), "processing");
        let result = match &delta {
            None => stmt.process(&cx, &FullView),
            Some(d) => stmt.process(&cx, &DeltaView::new(d)),
        };
        self.processed.fetch_add(1, Ordering::Relaxed);
        match result {
            Ok(produced) => self.propagate(scope, produced),
            Err(e) => self.fail(e),
        }
    }

    fn fail(&self, error: AnalysisError) {
        self.abort.store(true, Ordering::Release);
        let mut slot = self.error.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_none() {
            warn!(%error, "analysis aborted");
            *slot = Some(error);
        }
    }

    /// Notify everything that depends on what `delta` added.
    fn propagate<'s>(&'s self, scope: &Scope<'s>, delta: GraphDelta) {
        if delta.is_empty() {
            return;
        }
        let mut notify: HashMap<u32, GraphDelta> = HashMap::new();
        for (node, objects) in delta.nodes() {
            for subscriber in self.graph.subscribers_of(node).iter() {
                notify
                    .entry(subscriber)
                    .or_default()
                    .record_edges(node, objects.clone());
            }
        }
        for (subscriber, delta) in notify {
            self.enqueue(scope, SubscriberId(subscriber), Some(delta));
        }
        for call in delta.calls().iter() {
            let edge = self.graph.call_edge(call);
            self.reach(scope, edge.callee, &edge.callee_context);
        }
        if !delta.class_inits().is_empty() {
            let initial = self.haf.initial_context();
            for init in delta.class_inits().iter() {
                let initializer = self.program.describe_method(MethodId(init));
                debug!(%initializer, "class initializer triggered");
                self.reach(scope, MethodId(init), &initial);
            }
        }
    }
}
