use pointsto_ir::IrError;
use thiserror::Error;

/// A fatal analysis error. These indicate a bug in the front end or in a heap-abstraction
/// policy; the solver stops at the first one and reports the implicated statement.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Error in the program model")]
    Ir(#[from] IrError),
    /// The front end registered two statements for one site of one method
    #[error("statement `{statement}` registered twice for site {site} of `{method}`")]
    DuplicateStatement {
        method: String,
        site: u32,
        statement: String,
    },
    /// A receiver's runtime type has no concrete implementation of the called selector
    #[error(
        "no implementation of `{selector}` for receiver type `{receiver}` at `{statement}` \
         in context {context}"
    )]
    UnresolvedTarget {
        selector: String,
        receiver: String,
        statement: String,
        context: String,
    },
    /// A heap-abstraction policy returned different results for identical inputs
    #[error(
        "heap abstraction `{policy}` is not a pure function: {detail} at `{statement}` \
         in context {context}"
    )]
    ImpurePolicy {
        policy: &'static str,
        detail: String,
        statement: String,
        context: String,
    },
    /// A method body referenced a local that was never declared
    #[error("unknown variable `{name}` in `{method}`")]
    UnknownVariable { method: String, name: String },
    /// A jump or branch named a label that no statement carries
    #[error("unknown label `{label}` in `{method}`")]
    UnknownLabel { method: String, label: String },
    /// A flow-sensitive variable was accessed by a statement that has no program point
    #[error(
        "flow-sensitive variable `{variable}` accessed outside of any program point by \
         `{statement}` in context {context}"
    )]
    MissingProgramPoint {
        variable: String,
        statement: String,
        context: String,
    },
    #[error("no heap abstraction policy named `{0}` is registered")]
    UnknownPolicy(String),
    #[error("the program has no analyzable entry point `{0}`")]
    MissingEntryPoint(String),
    #[error("unable to start worker threads")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}
