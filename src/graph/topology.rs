//! Graph-level derived properties: execution order, reachability, and the
//! merged signature/returns a model exposes.

use super::dag::{EdgeRecord, ModelGraph, NodeRecord};
use crate::error::{GraphError, SignatureError};
use crate::signature::{restructure_signature, Parameter, Signature};
use crate::value::Kwargs;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::Direction;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

/// Nodes reachable from `starts` (inclusive) following `direction`.
pub(crate) fn reachable(
    graph: &StableDiGraph<NodeRecord, EdgeRecord>,
    starts: &[NodeIndex],
    direction: Direction,
) -> HashSet<NodeIndex> {
    let mut visited = HashSet::new();
    let mut queue = VecDeque::from(starts.to_vec());

    while let Some(node) = queue.pop_front() {
        if visited.insert(node) {
            queue.extend(graph.neighbors_directed(node, direction));
        }
    }
    visited
}

fn reachable_names(graph: &ModelGraph, names: &[String], direction: Direction) -> HashSet<String> {
    let starts: Vec<NodeIndex> = names.iter().filter_map(|n| graph.index_of(n)).collect();
    let inner = graph.inner();
    reachable(inner, &starts, direction).into_iter().map(|idx| inner[idx].name.clone()).collect()
}

/// `names` and everything downstream of them.
pub fn descendants(graph: &ModelGraph, names: &[String]) -> HashSet<String> {
    reachable_names(graph, names, Direction::Outgoing)
}

/// `names` and everything upstream of them.
pub fn ancestors(graph: &ModelGraph, names: &[String]) -> HashSet<String> {
    reachable_names(graph, names, Direction::Incoming)
}

/// Node names ordered so every parent precedes its children.
pub fn topological_order(graph: &ModelGraph) -> Result<Vec<String>, GraphError> {
    let inner = graph.inner();
    let order = petgraph::algo::toposort(inner, None)
        .map_err(|_| GraphError::Cycle { graph: graph.name().to_string() })?;
    Ok(order.into_iter().map(|idx| inner[idx].name.clone()).collect())
}

/// The merged input signature of the graph.
///
/// Every parameter read by a node and not produced by any node, as
/// positional-or-keyword, in canonical order. When nodes disagree on a
/// default, a default wins over a required parameter and the first default
/// seen is kept.
pub fn graph_signature(graph: &ModelGraph) -> Result<Signature, SignatureError> {
    let mut merged: BTreeMap<String, Parameter> = BTreeMap::new();
    for node in graph.nodes() {
        for param in node.signature().params().iter().filter(|p| !p.kind.is_variadic()) {
            match merged.get(&param.name) {
                Some(existing) if existing.has_default() || !param.has_default() => {}
                _ => {
                    merged.insert(param.name.clone(), param.clone());
                }
            }
        }
    }
    for node in graph.nodes() {
        for output in node.returns() {
            merged.remove(&output);
        }
    }

    let defaults: Kwargs =
        merged.values().filter_map(|p| p.default.clone().map(|d| (p.name.clone(), d))).collect();
    let keyword = Signature::keyword_only(merged.into_keys())?;
    restructure_signature(&keyword, &defaults)
}

/// Sorted outputs of the terminal nodes.
pub fn graph_returns(graph: &ModelGraph) -> Vec<String> {
    let inner = graph.inner();
    let mut returns: Vec<String> = inner
        .node_indices()
        .filter(|&idx| inner.neighbors_directed(idx, Direction::Outgoing).next().is_none())
        .filter_map(|idx| inner[idx].node_object.as_ref())
        .flat_map(|node| node.returns())
        .collect();
    returns.sort();
    returns
}

/// Every name produced by some node.
pub fn graph_outputs(graph: &ModelGraph) -> HashSet<String> {
    graph.nodes().flat_map(|node| node.returns()).collect()
}

/// How many times each value is read during one execution: once per node
/// parameter, plus once for each name in `returns`.
pub fn param_counter(graph: &ModelGraph, returns: &[String]) -> HashMap<String, usize> {
    let mut count = HashMap::new();
    let reads = graph.nodes().flat_map(|node| node.signature().names().map(str::to_string).collect::<Vec<_>>());
    for name in reads.chain(returns.iter().cloned()) {
        *count.entry(name).or_insert(0) += 1;
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::scenario_graph;
    use rstest::{fixture, rstest};

    #[fixture]
    fn graph() -> ModelGraph { scenario_graph() }

    fn position(order: &[String], name: &str) -> usize {
        order.iter().position(|n| n == name).unwrap()
    }

    #[rstest]
    fn test_topological_order(graph: ModelGraph) {
        let order = topological_order(&graph).unwrap();
        assert_eq!(order.len(), 5);
        for (u, v) in graph.edges() {
            assert!(position(&order, &u) < position(&order, &v), "{} before {}", u, v);
        }
    }

    #[test]
    fn test_cycle_is_reported() {
        let mut graph = ModelGraph::new("cyclic");
        graph.add_edges_from([("a", "b"), ("b", "c"), ("c", "a")]);
        assert_eq!(topological_order(&graph).unwrap_err(), GraphError::Cycle { graph: "cyclic".into() });
    }

    #[rstest]
    fn test_graph_signature(graph: ModelGraph) {
        let sig = graph_signature(&graph).unwrap();
        assert_eq!(sig.to_string(), "(a, b, d, f, constant=2)");
    }

    #[test]
    fn test_graph_signature_default_wins() {
        use crate::graph::Node;
        use crate::signature::Function;
        use crate::value::Value;

        let required = Signature::keyword_only(["x"]).unwrap();
        let defaulted = Signature::new(vec![Parameter::keyword("x").with_default(1), Parameter::keyword("y")]).unwrap();
        let mut graph = ModelGraph::new("g");
        graph.add_edge("first", "second");
        graph.set_node_objects_from([
            Node::builder("first", Function::plain("f", required, |_| Ok(Value::Int(0)))).output("y").build().unwrap(),
            Node::builder("second", Function::plain("s", defaulted, |_| Ok(Value::Int(0)))).output("z").build().unwrap(),
        ]);
        assert_eq!(graph_signature(&graph).unwrap().to_string(), "(x=1)");
    }

    #[test]
    fn test_graph_signature_default_wins_across_kinds() {
        use crate::graph::Node;
        use crate::modifier::Modifier;
        use crate::signature::Function;
        use crate::value::Value;

        let required = Signature::keyword_only(["x"]).unwrap();
        let plain = Signature::keyword_only(["a", "b"]).unwrap();
        let mut graph = ModelGraph::new("g");
        graph.add_edge("first", "second");
        graph.set_node_objects_from([
            Node::builder("first", Function::plain("f", required, |_| Ok(Value::Int(0)))).output("y").build().unwrap(),
            Node::builder("second", Function::plain("s", plain, |_| Ok(Value::Int(0))))
                .modifier(Modifier::signature(vec![
                    Parameter::positional("x").with_default(1),
                    Parameter::positional("y").with_default(0),
                ]))
                .output("z")
                .build()
                .unwrap(),
        ]);
        assert_eq!(graph_signature(&graph).unwrap().to_string(), "(x=1)");
    }

    #[rstest]
    fn test_graph_returns(graph: ModelGraph) {
        assert_eq!(graph_returns(&graph), vec!["k".to_string(), "m".to_string()]);
    }

    #[rstest]
    fn test_descendants_and_ancestors(graph: ModelGraph) {
        let down = descendants(&graph, &["subtract".to_string()]);
        let expected: HashSet<String> = ["subtract", "multiply"].iter().map(|s| s.to_string()).collect();
        assert_eq!(down, expected);
        let up = ancestors(&graph, &["multiply".to_string()]);
        assert_eq!(up.len(), 4);
        assert!(!up.contains("log"));
    }

    #[rstest]
    fn test_param_counter(graph: ModelGraph) {
        let count = param_counter(&graph, &["k".to_string(), "m".to_string()]);
        // c feeds subtract, power and log
        assert_eq!(count["c"], 3);
        assert_eq!(count["k"], 1);
        assert_eq!(count["e"], 1);
        assert_eq!(count["constant"], 1);
    }
}
