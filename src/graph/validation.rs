//! The validity check a graph must pass before it can back a model.

use super::dag::ModelGraph;
use crate::error::GraphError;
use petgraph::Direction;

/// Runs the structural rules in order and stops at the first violation.
///
/// Like a linter run before compilation: nothing here executes a node.
pub struct Validator<'a> {
    graph: &'a ModelGraph,
}

impl<'a> Validator<'a> {
    pub fn new(graph: &'a ModelGraph) -> Self {
        Self { graph }
    }

    pub fn validate(&self) -> Result<(), GraphError> {
        self.check_not_empty()?;
        self.check_acyclic()?;
        self.check_isolated()?;
        self.check_node_attributes()?;
        self.check_edge_attributes()
    }

    fn name(&self) -> String { self.graph.name().to_string() }

    fn check_not_empty(&self) -> Result<(), GraphError> {
        if self.graph.node_count() == 0 {
            return Err(GraphError::Empty { graph: self.name() });
        }
        Ok(())
    }

    fn check_acyclic(&self) -> Result<(), GraphError> {
        if petgraph::algo::is_cyclic_directed(self.graph.inner()) {
            return Err(GraphError::Cycle { graph: self.name() });
        }
        Ok(())
    }

    /// A lone node is a valid one-node model; in larger graphs every node
    /// must be connected.
    fn check_isolated(&self) -> Result<(), GraphError> {
        if self.graph.node_count() < 2 {
            return Ok(());
        }
        let inner = self.graph.inner();
        let isolated: Vec<String> = inner
            .node_indices()
            .filter(|&idx| {
                inner.neighbors_directed(idx, Direction::Incoming).next().is_none()
                    && inner.neighbors_directed(idx, Direction::Outgoing).next().is_none()
            })
            .map(|idx| inner[idx].name.clone())
            .collect();
        if !isolated.is_empty() {
            return Err(GraphError::IsolatedNodes { graph: self.name(), nodes: isolated });
        }
        Ok(())
    }

    fn check_node_attributes(&self) -> Result<(), GraphError> {
        let missing: Vec<String> = self
            .graph
            .inner()
            .node_weights()
            .filter(|record| record.node_object.is_none())
            .map(|record| record.name.clone())
            .collect();
        if !missing.is_empty() {
            return Err(GraphError::MissingNodeAttribute {
                graph: self.name(),
                attribute: "node_object".to_string(),
                nodes: missing,
            });
        }
        Ok(())
    }

    fn check_edge_attributes(&self) -> Result<(), GraphError> {
        let missing: Vec<(String, String)> = self
            .graph
            .edges()
            .into_iter()
            .filter(|(u, v)| self.graph.edge_output(u, v).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(GraphError::MissingEdgeAttribute {
                graph: self.name(),
                attribute: "output".to_string(),
                edges: missing,
            });
        }
        Ok(())
    }
}

/// Shorthand for `Validator::new(graph).validate()`.
pub fn validate_graph(graph: &ModelGraph) -> Result<(), GraphError> {
    Validator::new(graph).validate()
}
