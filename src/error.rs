//! Error types shared across the crate.
//!
//! Construction-time failures (`SignatureError`, `GraphError`) prevent an
//! object from existing at all; `CallError` is raised while calling a node,
//! model or modifier-wrapped function.

use thiserror::Error;

/// Boxed error returned by user-supplied function bodies.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    #[error("duplicate parameter name: '{0}'")]
    DuplicateParameter(String),
    #[error("wrong parameter order: {kind} parameter '{name}' before {previous} parameter")]
    InvalidOrder { name: String, kind: String, previous: String },
    #[error("non-default argument '{0}' follows default argument")]
    NonDefaultAfterDefault(String),
    #[error("not enough arguments, minimum {minimum} but got {given}")]
    NotEnoughArguments { minimum: usize, given: usize },
    #[error("too many arguments, maximum {maximum} but got {given}")]
    TooManyArguments { maximum: usize, given: usize },
    #[error("node '{0}' function requires 'inputs' to be specified")]
    RequiresInputs(String),
    #[error("{modifier}: parameter '{parameter}' not found in signature")]
    UnknownParameter { modifier: String, parameter: String },
    #[error("{modifier}: expected {expected} parameters but got {given}")]
    ArityMismatch { modifier: String, expected: usize, given: usize },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("node '{0}' not found")]
    NodeNotFound(String),
    #[error("node '{0}' already exists")]
    DuplicateNode(String),
    #[error("invalid grouped edge: only one side may be a list, got {u} -> {v}")]
    BothSidesGrouped { u: String, v: String },
    #[error("invalid graph ({graph}): graph contains no nodes")]
    Empty { graph: String },
    #[error("invalid graph ({graph}): graph contains cycles")]
    Cycle { graph: String },
    #[error("invalid graph ({graph}): graph contains isolated nodes {nodes:?}")]
    IsolatedNodes { graph: String, nodes: Vec<String> },
    #[error("invalid graph ({graph}): missing attribute '{attribute}' for nodes {nodes:?}")]
    MissingNodeAttribute { graph: String, attribute: String, nodes: Vec<String> },
    #[error("invalid graph ({graph}): missing attribute '{attribute}' for edges {edges:?}")]
    MissingEdgeAttribute { graph: String, attribute: String, edges: Vec<(String, String)> },
    #[error("node '{node}' requires an explicit output: subgraph has no terminal output")]
    MissingOutput { node: String },
    #[error("node '{node}' requires an explicit output: subgraph has multiple terminal outputs {outputs:?}")]
    AmbiguousOutput { node: String, outputs: Vec<String> },
    #[error("return value '{0}' is neither a model input nor a node output")]
    UnknownReturn(String),
    #[error(transparent)]
    Signature(#[from] SignatureError),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("group '{0}' already exists")]
    GroupExists(String),
    #[error("group '{0}' not found")]
    GroupNotFound(String),
    #[error("entry '{key}' not found in group '{group}'")]
    EntryNotFound { group: String, key: String },
    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("store session is closed")]
    Closed,
}

/// Failure building a model group from recipes.
#[derive(Error, Debug)]
pub enum GroupError {
    #[error("model '{model}': {source}")]
    Model {
        model: String,
        #[source]
        source: GraphError,
    },
    #[error("model '{model}': cannot open handler: {source}")]
    Handler {
        model: String,
        #[source]
        source: StoreError,
    },
    #[error("invalid model recipes: {0}")]
    Config(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum CallError {
    #[error("missing a required argument: '{0}'")]
    MissingArgument(String),
    #[error("got an unexpected keyword argument '{0}'")]
    UnexpectedKeyword(String),
    #[error("too many positional arguments, maximum {maximum} but got {given}")]
    TooManyPositional { maximum: usize, given: usize },
    #[error("multiple values for argument '{0}'")]
    MultipleValues(String),
    #[error("positional-only argument '{0}' passed as keyword argument")]
    PositionalOnlyAsKeyword(String),
    #[error("parameter '{parameter}' must be iterable, got {type_name}")]
    NotIterable { parameter: String, type_name: String },
    #[error("node returned {given} values but declares outputs {expected:?}")]
    OutputMismatch { expected: Vec<String>, given: usize },
    #[error("value '{0}' not found in execution state")]
    MissingValue(String),
    #[error("exception occurred for node '{node}'\n{details}")]
    Node {
        node: String,
        details: String,
        #[source]
        source: Box<CallError>,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Failed(BoxError),
}

impl CallError {
    /// Wraps an arbitrary failure raised by a function body.
    pub fn failed<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        CallError::Failed(err.into())
    }

    /// Failure with a plain message.
    pub fn msg(message: impl Into<String>) -> Self {
        let message: String = message.into();
        CallError::Failed(message.into())
    }
}
