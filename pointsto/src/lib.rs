pub mod arena;
pub mod config;
pub mod context;
mod error;
pub mod graph;
pub mod haf;
pub mod heap;
pub mod intset;
pub mod lattice;
pub mod loader;
pub mod program_point;
pub mod registrar;
mod results;
pub mod solver;
pub mod statement;
pub mod variable;

pub use pointsto_ir as ir;

pub use config::AnalysisConfig;
pub use context::Context;
pub use error::AnalysisError;
pub use graph::{GraphDelta, PointsToGraph};
pub use haf::{HeapAbstraction, HeapAbstractionFactory};
pub use loader::{load_file, load_program};
pub use registrar::{Program, StatementRegistrar};
pub use results::AnalysisResults;
pub use solver::{Solver, SolverStats};
