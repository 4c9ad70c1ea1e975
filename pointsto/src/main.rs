use anyhow::Context as _;
use clap::{Parser, Subcommand};
use pointsto::haf::policies;
use pointsto::{AnalysisConfig, AnalysisResults, Solver, load_file};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const APP: &str = "pointsto";

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct PointsToParams {
    #[command(subcommand)]
    pub command: Commands,
    /// Heap abstraction policy (see `policies`)
    #[arg(long, global = true)]
    pub policy: Option<String>,
    /// Maximum method context length
    #[arg(long, global = true)]
    pub depth: Option<usize>,
    /// Maximum heap context length
    #[arg(long, global = true)]
    pub heap_depth: Option<usize>,
    /// Worker threads, 0 for one per core
    #[arg(long, global = true)]
    pub workers: Option<usize>,
    #[arg(long, global = true)]
    pub recency: Option<bool>,
    #[arg(long, global = true)]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Solve the program described by an XML file and print the points-to sets
    Analyze {
        file: PathBuf,
        /// Only print variables of methods whose qualified name starts with this
        #[arg(long)]
        method: Option<String>,
        /// Also print the context-sensitive call graph
        #[arg(long)]
        call_graph: bool,
    },
    /// List the registered heap abstraction policies
    Policies,
    /// Print the stored configuration
    Config,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    let params = PointsToParams::parse();
    let config = update_config(&params)?;
    match params.command {
        Commands::Analyze {
            file,
            method,
            call_graph,
        } => analyze(config, &file, method.as_deref(), call_graph),
        Commands::Policies => {
            for policy in policies() {
                println!("{:<12} {}", policy.name, policy.description);
            }
            Ok(())
        }
        Commands::Config => {
            println!("{}", confy::get_configuration_file_path(APP, None)?.display());
            println!("{config:#?}");
            Ok(())
        }
    }
}

/// Fold command-line overrides into the stored configuration, persisting any change.
fn update_config(params: &PointsToParams) -> anyhow::Result<AnalysisConfig> {
    let stored: AnalysisConfig = confy::load(APP, None)?;
    let mut config = stored.clone();
    if let Some(policy) = &params.policy {
        config.policy = policy.clone();
    }
    if let Some(depth) = params.depth {
        config.depth = depth;
    }
    if let Some(heap_depth) = params.heap_depth {
        config.heap_depth = heap_depth;
    }
    if let Some(workers) = params.workers {
        config.workers = workers;
    }
    if let Some(recency) = params.recency {
        config.recency = recency;
    }
    if params.timeout_ms.is_some() {
        config.timeout_ms = params.timeout_ms;
    }
    if stored != config {
        confy::store(APP, None, config.clone())?;
    }
    Ok(config)
}

fn analyze(
    config: AnalysisConfig,
    file: &Path,
    method: Option<&str>,
    call_graph: bool,
) -> anyhow::Result<()> {
    let program =
        load_file(file).with_context(|| format!("loading {}", file.display()))?;
    let results = Solver::new(Arc::new(program), config)?.solve()?;
    print_points_to(&results, method);
    if call_graph {
        print_call_graph(&results);
    }
    let stats = results.stats();
    println!(
        "\n{} statements processed, {} objects, {} edges, {} call edges, \
         {} reachable method contexts in {:?}",
        stats.processed,
        stats.objects,
        stats.edges,
        stats.call_edges,
        stats.reachable,
        stats.elapsed
    );
    if results.timed_out() {
        println!("timed out: the results above are partial");
    }
    Ok(())
}

fn print_points_to(results: &AnalysisResults, method: Option<&str>) {
    for (node, objects) in results.canonical() {
        if method.is_some_and(|m| !node.starts_with(m)) {
            continue;
        }
        println!("{node}");
        for object in objects {
            println!("    {object}");
        }
    }
}

fn print_call_graph(results: &AnalysisResults) {
    let graph = results.call_graph();
    let program = results.program();
    println!();
    for edge in graph.edge_indices() {
        let Some((from, to)) = graph.edge_endpoints(edge) else {
            continue;
        };
        println!(
            "{} {} -> {} {} at site {}",
            program.describe_method(graph[from].method),
            graph[from].context,
            program.describe_method(graph[to].method),
            graph[to].context,
            graph[edge].site
        );
    }
}
