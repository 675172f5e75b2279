//! Core of a DAG model builder.
//!
//! Functions are wrapped as nodes, wired into a `ModelGraph`, and compiled
//! into a `Model`: one callable whose signature is the merged signature of
//! its nodes. Execution strategies decide where intermediate values live.

pub mod compute;
pub mod display;
pub mod error;
pub mod graph;
pub mod group;
pub mod model;
pub mod modifier;
pub mod shortcut;
pub mod signature;
pub mod value;

#[cfg(test)]
pub(crate) mod test_utils;

pub use compute::{ExecutionStats, HandlerConfig, MemHandler, PlainHandler, StoreHandler, Strategy};
pub use error::{CallError, GraphError, GroupError, SignatureError, StoreError};
pub use graph::{EdgeEnd, ModelGraph, Node, NodeBuilder, Output};
pub use group::{ModelDefaults, ModelGroup, ModelRecipe};
pub use model::{Model, ModelBuilder};
pub use modifier::Modifier;
pub use shortcut::{loop_shortcut, modifier_shortcut};
pub use signature::{Function, KwFunc, ParamKind, Parameter, Signature};
pub use value::{kwargs, Kwargs, Value};
