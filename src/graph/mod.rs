//! Defines the node and graph data structures a model is built from.
pub mod dag;
pub mod node;
pub mod topology;
pub mod validation;

// Re-export key types for convenient access
pub use dag::{EdgeEnd, EdgeOutput, ModelGraph};
pub use node::{Node, NodeBuilder, Output};
pub use validation::{validate_graph, Validator};
