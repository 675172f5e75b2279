//! dag.rs
//! The model graph: a petgraph arena of node records plus a name index.
//!
//! Edge attributes are derived state. Every structural edit ends with a
//! recomputation of the affected edges, so an edge carries `output` exactly
//! when both endpoints have node objects and the child reads one of the
//! parent's outputs.

use super::node::{Node, NodeBuilder, Output};
use super::topology;
use crate::error::GraphError;
use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableDiGraph};
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Names routed along one edge; almost always a single name.
pub type EdgeOutput = SmallVec<[String; 1]>;

#[derive(Debug, Clone)]
pub struct NodeRecord {
    pub name: String,
    pub node_object: Option<Node>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EdgeRecord {
    pub output: Option<EdgeOutput>,
}

/// One side of a grouped edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EdgeEnd {
    One(String),
    Many(Vec<String>),
}

impl EdgeEnd {
    pub fn names(&self) -> Vec<String> {
        match self {
            EdgeEnd::One(name) => vec![name.clone()],
            EdgeEnd::Many(names) => names.clone(),
        }
    }

    pub fn is_many(&self) -> bool { matches!(self, EdgeEnd::Many(_)) }
}

impl fmt::Display for EdgeEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeEnd::One(name) => write!(f, "{}", name),
            EdgeEnd::Many(names) => write!(f, "[{}]", names.join(", ")),
        }
    }
}

impl From<&str> for EdgeEnd {
    fn from(name: &str) -> Self { EdgeEnd::One(name.to_string()) }
}

impl From<String> for EdgeEnd {
    fn from(name: String) -> Self { EdgeEnd::One(name) }
}

impl From<Vec<&str>> for EdgeEnd {
    fn from(names: Vec<&str>) -> Self { EdgeEnd::Many(names.into_iter().map(str::to_string).collect()) }
}

impl From<Vec<String>> for EdgeEnd {
    fn from(names: Vec<String>) -> Self { EdgeEnd::Many(names) }
}

/// A directed graph of named nodes backing a model.
///
/// `Clone` yields a fully independent graph: records are owned, node objects
/// are immutable once built.
#[derive(Debug, Clone, Default)]
pub struct ModelGraph {
    name: String,
    doc: String,
    graph: StableDiGraph<NodeRecord, EdgeRecord>,
    index: HashMap<String, NodeIndex>,
}

impl ModelGraph {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Default::default() }
    }

    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = doc.into();
        self
    }

    pub fn name(&self) -> &str { &self.name }

    pub fn set_name(&mut self, name: impl Into<String>) { self.name = name.into(); }

    pub fn doc(&self) -> &str { &self.doc }

    pub fn node_count(&self) -> usize { self.graph.node_count() }

    pub fn edge_count(&self) -> usize { self.graph.edge_count() }

    pub fn contains_node(&self, name: &str) -> bool { self.index.contains_key(name) }

    pub(crate) fn inner(&self) -> &StableDiGraph<NodeRecord, EdgeRecord> { &self.graph }

    pub(crate) fn index_of(&self, name: &str) -> Option<NodeIndex> { self.index.get(name).copied() }

    /// Adds a node key without a node object; no-op if it exists.
    pub fn add_node(&mut self, name: &str) -> NodeIndex {
        if let Some(&idx) = self.index.get(name) {
            return idx;
        }
        let idx = self.graph.add_node(NodeRecord { name: name.to_string(), node_object: None });
        self.index.insert(name.to_string(), idx);
        idx
    }

    /// Adds `u -> v`, creating missing endpoints; re-adding an edge is a no-op.
    pub fn add_edge(&mut self, u: &str, v: &str) {
        let a = self.add_node(u);
        let b = self.add_node(v);
        let edge = match self.graph.find_edge(a, b) {
            Some(edge) => edge,
            None => self.graph.add_edge(a, b, EdgeRecord::default()),
        };
        self.update_edge(edge);
    }

    pub fn add_edges_from<I, U, V>(&mut self, edges: I)
    where
        I: IntoIterator<Item = (U, V)>,
        U: AsRef<str>,
        V: AsRef<str>,
    {
        for (u, v) in edges {
            self.add_edge(u.as_ref(), v.as_ref());
        }
    }

    /// Adds the cross product of `u` and `v`; only one side may be a list.
    pub fn add_grouped_edge(&mut self, u: impl Into<EdgeEnd>, v: impl Into<EdgeEnd>) -> Result<(), GraphError> {
        self.add_grouped_edges_from([(u.into(), v.into())])
    }

    /// Adds every grouped edge; nothing is added if any entry is invalid.
    pub fn add_grouped_edges_from<I>(&mut self, edges: I) -> Result<(), GraphError>
    where
        I: IntoIterator<Item = (EdgeEnd, EdgeEnd)>,
    {
        let edges: Vec<(EdgeEnd, EdgeEnd)> = edges.into_iter().collect();
        if let Some((u, v)) = edges.iter().find(|(u, v)| u.is_many() && v.is_many()) {
            return Err(GraphError::BothSidesGrouped { u: u.to_string(), v: v.to_string() });
        }
        for (u, v) in edges {
            for a in u.names() {
                for b in v.names() {
                    self.add_edge(&a, &b);
                }
            }
        }
        Ok(())
    }

    /// The compact grouped form of the edge set.
    ///
    /// A node with several parents yields `([parents], node)`; the remaining
    /// single-parent edges are grouped by source as `(source, [children])`.
    pub fn grouped_edges(&self) -> Vec<(EdgeEnd, EdgeEnd)> {
        let mut grouped = Vec::new();
        let mut by_source: Vec<(NodeIndex, Vec<String>)> = Vec::new();

        for idx in self.graph.node_indices() {
            let name = self.graph[idx].name.clone();
            let mut parents: Vec<NodeIndex> = self.graph.neighbors_directed(idx, Direction::Incoming).collect();
            parents.sort();
            match parents.as_slice() {
                [] => {}
                [parent] => match by_source.iter_mut().find(|(source, _)| source == parent) {
                    Some((_, children)) => children.push(name),
                    None => by_source.push((*parent, vec![name])),
                },
                many => {
                    let names = many.iter().map(|&p| self.graph[p].name.clone()).collect();
                    grouped.push((EdgeEnd::Many(names), EdgeEnd::One(name)));
                }
            }
        }

        for (source, mut children) in by_source {
            let source = EdgeEnd::One(self.graph[source].name.clone());
            let target = if children.len() == 1 {
                EdgeEnd::One(children.remove(0))
            } else {
                EdgeEnd::Many(children)
            };
            grouped.push((source, target));
        }
        grouped
    }

    /// Binds `node` to the graph key of the same name, adding the key if
    /// needed, then recomputes every edge.
    pub fn set_node_object(&mut self, node: Node) {
        let idx = self.add_node(node.name());
        log::debug!("graph '{}': set node object '{}'", self.name, node.name());
        self.graph[idx].node_object = Some(node);
        self.update_edges();
    }

    pub fn set_node_objects_from<I>(&mut self, nodes: I)
    where
        I: IntoIterator<Item = Node>,
    {
        for node in nodes {
            let idx = self.add_node(node.name());
            self.graph[idx].node_object = Some(node);
        }
        self.update_edges();
    }

    /// The node object bound to `name`.
    pub fn node(&self, name: &str) -> Result<&Node, GraphError> {
        let idx = self.index_of(name).ok_or_else(|| GraphError::NodeNotFound(name.to_string()))?;
        self.graph[idx].node_object.as_ref().ok_or_else(|| GraphError::MissingNodeAttribute {
            graph: self.name.clone(),
            attribute: "node_object".to_string(),
            nodes: vec![name.to_string()],
        })
    }

    /// Rebuilds a node object from its construction arguments.
    pub fn modify_node<F>(&mut self, name: &str, edit: F) -> Result<(), GraphError>
    where
        F: FnOnce(NodeBuilder) -> NodeBuilder,
    {
        let node = edit(self.node(name)?.edit()).name(name).build()?;
        self.set_node_object(node);
        Ok(())
    }

    pub fn remove_nodes_from<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in names {
            if let Some(idx) = self.index.remove(name.as_ref()) {
                self.graph.remove_node(idx);
            }
        }
    }

    /// Node names in insertion order.
    pub fn node_names(&self) -> Vec<String> {
        self.graph.node_indices().map(|idx| self.graph[idx].name.clone()).collect()
    }

    /// Nodes carrying a node object, in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.graph.node_weights().filter_map(|record| record.node_object.as_ref())
    }

    pub fn edges(&self) -> Vec<(String, String)> {
        self.graph
            .edge_indices()
            .filter_map(|e| self.graph.edge_endpoints(e))
            .map(|(a, b)| (self.graph[a].name.clone(), self.graph[b].name.clone()))
            .collect()
    }

    /// Names routed along `u -> v`, if the edge exists and is resolved.
    pub fn edge_output(&self, u: &str, v: &str) -> Option<&[String]> {
        let edge = self.graph.find_edge(self.index_of(u)?, self.index_of(v)?)?;
        self.graph[edge].output.as_deref()
    }

    pub fn predecessors(&self, name: &str) -> Result<Vec<String>, GraphError> {
        self.neighbors(name, Direction::Incoming)
    }

    pub fn successors(&self, name: &str) -> Result<Vec<String>, GraphError> {
        self.neighbors(name, Direction::Outgoing)
    }

    fn neighbors(&self, name: &str, direction: Direction) -> Result<Vec<String>, GraphError> {
        let idx = self.index_of(name).ok_or_else(|| GraphError::NodeNotFound(name.to_string()))?;
        let mut found: Vec<NodeIndex> = self.graph.neighbors_directed(idx, direction).collect();
        found.sort();
        Ok(found.into_iter().map(|n| self.graph[n].name.clone()).collect())
    }

    /// Detached copy of the part of the graph selected by `nodes`, by the
    /// nodes reading any of `inputs` plus their descendants, and by the
    /// nodes producing any of `outputs` plus their ancestors.
    pub fn subgraph(&self, nodes: &[String], inputs: &[String], outputs: &[String]) -> ModelGraph {
        let mut selected: HashSet<NodeIndex> = nodes.iter().filter_map(|n| self.index_of(n)).collect();

        let readers: Vec<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|&idx| match &self.graph[idx].node_object {
                Some(node) => inputs.iter().any(|p| node.signature().contains(p)),
                None => false,
            })
            .collect();
        selected.extend(topology::reachable(&self.graph, &readers, Direction::Outgoing));

        let producers: Vec<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|&idx| match &self.graph[idx].node_object {
                Some(node) => outputs.iter().any(|o| node.output().is_some_and(|out| out.contains(o))),
                None => false,
            })
            .collect();
        selected.extend(topology::reachable(&self.graph, &producers, Direction::Incoming));

        self.induced(&selected)
    }

    fn induced(&self, selected: &HashSet<NodeIndex>) -> ModelGraph {
        let mut sub = ModelGraph::new(self.name.clone()).with_doc(self.doc.clone());
        for idx in self.graph.node_indices().filter(|idx| selected.contains(idx)) {
            let record = self.graph[idx].clone();
            let new_idx = sub.graph.add_node(record);
            sub.index.insert(self.graph[idx].name.clone(), new_idx);
        }
        for edge in self.graph.edge_indices() {
            let Some((a, b)) = self.graph.edge_endpoints(edge) else { continue };
            if let (Some(&na), Some(&nb)) =
                (sub.index.get(&self.graph[a].name), sub.index.get(&self.graph[b].name))
            {
                sub.graph.add_edge(na, nb, self.graph[edge].clone());
            }
        }
        sub
    }

    /// Collapses `subgraph` into the single node `node`.
    ///
    /// Edges entering or leaving the subgraph are rerouted to the new node.
    /// The new node's output is `node_output`, else the node's own output,
    /// else the single terminal output of the subgraph.
    pub fn replace_subgraph(
        &self,
        subgraph: &ModelGraph,
        node: Node,
        node_output: Option<Output>,
    ) -> Result<ModelGraph, GraphError> {
        let inner: HashSet<String> = subgraph.node_names().into_iter().collect();
        if let Some(missing) = inner.iter().find(|n| !self.contains_node(n)) {
            return Err(GraphError::NodeNotFound(missing.clone()));
        }
        if self.contains_node(node.name()) && !inner.contains(node.name()) {
            return Err(GraphError::DuplicateNode(node.name().to_string()));
        }

        let output = match node_output.or_else(|| node.output().cloned()) {
            Some(output) => output,
            None => {
                let mut returns = topology::graph_returns(subgraph);
                match returns.len() {
                    0 => return Err(GraphError::MissingOutput { node: node.name().to_string() }),
                    1 => Output::Single(returns.remove(0)),
                    _ => return Err(GraphError::AmbiguousOutput { node: node.name().to_string(), outputs: returns }),
                }
            }
        };
        let node = if node.output() == Some(&output) { node } else { node.edit().output(output).build()? };

        let mut incoming = Vec::new();
        let mut outgoing = Vec::new();
        for (u, v) in self.edges() {
            match (inner.contains(&u), inner.contains(&v)) {
                (false, true) => incoming.push(u),
                (true, false) => outgoing.push(v),
                _ => {}
            }
        }

        let mut graph = self.clone();
        graph.remove_nodes_from(&inner);
        let name = node.name().to_string();
        graph.add_node(&name);
        for u in &incoming {
            graph.add_edge(u, &name);
        }
        for v in &outgoing {
            graph.add_edge(&name, v);
        }
        graph.set_node_object(node);

        log::debug!(
            "graph '{}': replaced {} nodes with '{}' ({} in, {} out)",
            self.name,
            inner.len(),
            name,
            incoming.len(),
            outgoing.len()
        );
        Ok(graph)
    }

    fn update_edge(&mut self, edge: EdgeIndex) {
        let Some((a, b)) = self.graph.edge_endpoints(edge) else { return };
        let output = match (&self.graph[a].node_object, &self.graph[b].node_object) {
            (Some(parent), Some(child)) => {
                let names: EdgeOutput =
                    parent.returns().into_iter().filter(|r| child.signature().contains(r)).collect();
                (!names.is_empty()).then_some(names)
            }
            _ => None,
        };
        self.graph[edge].output = output;
    }

    fn update_edges(&mut self) {
        let edges: Vec<EdgeIndex> = self.graph.edge_indices().collect();
        for edge in edges {
            self.update_edge(edge);
        }
    }
}
