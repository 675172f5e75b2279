//! Human-facing descriptions of nodes, edges and models.
pub mod metadata;

pub use metadata::{edge_labels, format_metadata, node_labels, Metadata};
