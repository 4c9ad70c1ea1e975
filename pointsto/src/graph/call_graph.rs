use crate::context::{CallSiteLabel, Context};
use petgraph::graph::{DiGraph, NodeIndex};
use pointsto_ir::MethodId;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};

/// One resolved call: `site` in `caller_context` invokes `callee` in `callee_context`.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct CallEdge {
    pub site: CallSiteLabel,
    pub caller_context: Context,
    pub callee: MethodId,
    pub callee_context: Context,
}

/// A method analyzed in one context.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct CallGraphNode {
    pub method: MethodId,
    pub context: Context,
}

impl Display for CallGraphNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "m{} in {}", self.method.0, self.context)
    }
}

/// The context-sensitive call graph, one node per reachable (method, context) pair.
pub type CallGraph = DiGraph<CallGraphNode, CallSiteLabel>;

/// Assemble a [`CallGraph`] from `roots` (reachable pairs with no incoming edge of their
/// own, such as the entry point) and the registered `edges`.
pub fn build_call_graph<'a, R, E>(roots: R, edges: E) -> CallGraph
where
    R: IntoIterator<Item = CallGraphNode>,
    E: IntoIterator<Item = &'a CallEdge>,
{
    let mut graph = CallGraph::new();
    let mut indices: HashMap<CallGraphNode, NodeIndex> = HashMap::new();
    let mut index_of = |graph: &mut CallGraph, node: CallGraphNode| {
        *indices
            .entry(node.clone())
            .or_insert_with(|| graph.add_node(node))
    };
    for root in roots {
        index_of(&mut graph, root);
    }
    for edge in edges {
        let from = index_of(
            &mut graph,
            CallGraphNode {
                method: edge.site.caller,
                context: edge.caller_context.clone(),
            },
        );
        let to = index_of(
            &mut graph,
            CallGraphNode {
                method: edge.callee,
                context: edge.callee_context.clone(),
            },
        );
        graph.add_edge(from, to, edge.site);
    }
    graph
}
