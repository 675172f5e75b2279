//! model.rs
//! The top-level composition: a validated graph compiled into one callable.

use crate::compute::{ExecutionStats, Executor, MemHandler, Strategy};
use crate::display::metadata::{self, Metadata};
use crate::error::{CallError, GraphError};
use crate::graph::topology::graph_returns;
use crate::graph::{validate_graph, ModelGraph, Node};
use crate::modifier::{modify_func, Modifier};
use crate::signature::{KwFunc, Signature};
use crate::value::{Kwargs, Value};
use std::fmt;
use std::sync::Arc;

/// Construction arguments of a `Model`.
#[derive(Debug, Clone)]
pub struct ModelBuilder {
    name: String,
    graph: ModelGraph,
    handler: Arc<dyn Strategy>,
    modifiers: Vec<Modifier>,
    returns: Option<Vec<String>>,
    doc: Option<String>,
}

impl ModelBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn graph(mut self, graph: &ModelGraph) -> Self {
        self.graph = graph.clone();
        self
    }

    /// Execution strategy; `MemHandler` by default.
    pub fn handler(mut self, handler: Arc<dyn Strategy>) -> Self {
        self.handler = handler;
        self
    }

    pub fn modifier(mut self, modifier: Modifier) -> Self {
        self.modifiers.push(modifier);
        self
    }

    pub fn modifiers(mut self, modifiers: Vec<Modifier>) -> Self {
        self.modifiers = modifiers;
        self
    }

    /// Explicit return names; defaults to the sorted terminal outputs.
    pub fn returns<I, S>(mut self, returns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.returns = Some(returns.into_iter().map(Into::into).collect());
        self
    }

    pub fn default_returns(mut self) -> Self {
        self.returns = None;
        self
    }

    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    pub fn build(self) -> Result<Model, GraphError> {
        validate_graph(&self.graph)?;

        let returns = self.returns.clone().unwrap_or_else(|| graph_returns(&self.graph));
        let executor = Executor::new(&self.graph, &returns, self.handler.clone())?;

        let inner = executor.clone();
        let base = KwFunc::new(self.name.clone(), executor.signature().clone(), move |kwargs| inner.run(kwargs));
        let func = modify_func(base, &self.modifiers)?;

        log::debug!("built model '{}' with signature {}", self.name, func.signature());

        Ok(Model {
            doc: self.doc.clone().unwrap_or_else(|| self.graph.doc().to_string()),
            name: self.name,
            graph: self.graph,
            handler: self.handler,
            modifiers: self.modifiers,
            explicit_returns: self.returns,
            returns,
            executor,
            func,
        })
    }
}

/// A compiled model. Owns a private copy of its graph.
#[derive(Debug, Clone)]
pub struct Model {
    name: String,
    doc: String,
    graph: ModelGraph,
    handler: Arc<dyn Strategy>,
    modifiers: Vec<Modifier>,
    explicit_returns: Option<Vec<String>>,
    returns: Vec<String>,
    executor: Executor,
    func: KwFunc,
}

impl Model {
    pub fn builder(name: impl Into<String>, graph: &ModelGraph) -> ModelBuilder {
        ModelBuilder {
            name: name.into(),
            graph: graph.clone(),
            handler: Arc::new(MemHandler),
            modifiers: Vec::new(),
            returns: None,
            doc: None,
        }
    }

    /// A model with the default strategy and no modifiers.
    pub fn new(name: impl Into<String>, graph: &ModelGraph) -> Result<Self, GraphError> {
        Self::builder(name, graph).build()
    }

    /// Returns a builder holding this model's construction arguments.
    pub fn edit(&self) -> ModelBuilder {
        ModelBuilder {
            name: self.name.clone(),
            graph: self.graph.clone(),
            handler: self.handler.clone(),
            modifiers: self.modifiers.clone(),
            returns: self.explicit_returns.clone(),
            doc: Some(self.doc.clone()),
        }
    }

    pub fn name(&self) -> &str { &self.name }

    pub fn doc(&self) -> &str { &self.doc }

    /// The public signature, after model modifiers.
    pub fn signature(&self) -> &Signature { self.func.signature() }

    pub fn returns(&self) -> &[String] { &self.returns }

    pub fn graph(&self) -> &ModelGraph { &self.graph }

    pub fn handler(&self) -> &Arc<dyn Strategy> { &self.handler }

    pub fn modifiers(&self) -> Vec<Modifier> { self.modifiers.clone() }

    pub fn get_node(&self, name: &str) -> Result<&Node, GraphError> { self.graph.node(name) }

    pub fn call(&self, kwargs: Kwargs) -> Result<Value, CallError> {
        self.func.call(kwargs)
    }

    /// Binds `args`/`kwargs` against the public signature, applies
    /// defaults, then runs.
    pub fn call_with(&self, args: Vec<Value>, kwargs: Kwargs) -> Result<Value, CallError> {
        self.func.call_with(args, kwargs)
    }

    /// Runs the graph directly, without model modifiers, and reports
    /// execution counters.
    pub fn run_with_stats(&self, kwargs: Kwargs) -> Result<(Value, ExecutionStats), CallError> {
        self.executor.run_with_stats(kwargs)
    }

    pub fn metadata(&self) -> Metadata {
        vec![
            ("name", self.name.clone()),
            ("signature", format!("{}{}", self.name, self.signature())),
            ("returns", metadata::format_returns(&self.returns)),
            ("handler", self.handler.name()),
            ("modifiers", metadata::format_modifiers(&self.modifiers)),
            ("doc", self.doc.trim().to_string()),
        ]
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", metadata::format_metadata(&self.metadata()))
    }
}
