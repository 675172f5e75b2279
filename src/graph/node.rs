//! Defines the `Node`: a named, signature-normalized execution unit.

use crate::display::metadata::{self, Metadata};
use crate::error::{CallError, SignatureError};
use crate::modifier::{modify_func, Modifier};
use crate::signature::{
    add_signature, adapter, check_signature, convert_signature, has_signature, modify_signature, FuncType, Function,
    KwFunc, Signature,
};
use crate::value::{Kwargs, Value};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Declared output name(s) of a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Output {
    Single(String),
    /// Ordered names; the node returns a tuple/list zipped into them.
    Multiple(Vec<String>),
}

impl Output {
    pub fn names(&self) -> Vec<String> {
        match self {
            Output::Single(name) => vec![name.clone()],
            Output::Multiple(names) => names.clone(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        match self {
            Output::Single(n) => n == name,
            Output::Multiple(names) => names.iter().any(|n| n == name),
        }
    }
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Output::Single(name) => write!(f, "{}", name),
            Output::Multiple(names) => write!(f, "({})", names.join(", ")),
        }
    }
}

impl From<&str> for Output {
    fn from(name: &str) -> Self { Output::Single(name.to_string()) }
}

impl From<String> for Output {
    fn from(name: String) -> Self { Output::Single(name) }
}

impl From<Vec<&str>> for Output {
    fn from(names: Vec<&str>) -> Self { Output::Multiple(names.into_iter().map(str::to_string).collect()) }
}

impl From<Vec<String>> for Output {
    fn from(names: Vec<String>) -> Self { Output::Multiple(names) }
}

/// Construction arguments of a `Node`.
///
/// `Node::edit` hands these back pre-filled, so an edited node is rebuilt
/// from scratch rather than patched.
#[derive(Debug, Clone)]
pub struct NodeBuilder {
    name: String,
    func: Function,
    inputs: Vec<String>,
    output: Option<Output>,
    modifiers: Vec<Modifier>,
    doc: Option<String>,
    func_type: Option<FuncType>,
}

impl NodeBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn func(mut self, func: Function) -> Self {
        self.func = func;
        self
    }

    /// Explicit argument names; required for functions without a signature.
    pub fn inputs<I, S>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs = inputs.into_iter().map(Into::into).collect();
        self
    }

    pub fn output(mut self, output: impl Into<Output>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn no_output(mut self) -> Self {
        self.output = None;
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

    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    pub fn func_type(mut self, func_type: FuncType) -> Self {
        self.func_type = Some(func_type);
        self
    }

    pub fn build(self) -> Result<Node, SignatureError> {
        let base = base_function(&self.name, self.func.clone(), &self.inputs)?;
        let node_func = modify_func(base, &self.modifiers)?;

        log::trace!("built node '{}' with signature {}", self.name, node_func.signature());

        Ok(Node {
            func_type: self.func_type.unwrap_or_else(|| self.func.func_type()),
            doc: self.doc.clone().unwrap_or_else(|| self.func.doc().to_string()),
            overrides: (self.doc, self.func_type),
            name: self.name,
            func: self.func,
            inputs: self.inputs,
            output: self.output,
            modifiers: self.modifiers,
            node_func,
        })
    }
}

/// Normalizes `func` into the keyword-only base function of a node.
fn base_function(name: &str, func: Function, inputs: &[String]) -> Result<KwFunc, SignatureError> {
    if !has_signature(&func) {
        if inputs.is_empty() {
            return Err(SignatureError::RequiresInputs(name.to_string()));
        }
        add_signature(func, inputs)
    } else if !inputs.is_empty() {
        modify_signature(func, inputs)
    } else if check_signature(&func) {
        adapter::keyword_function(func)
    } else {
        convert_signature(func)
    }
}

/// An immutable execution unit wrapping one function.
#[derive(Debug, Clone)]
pub struct Node {
    name: String,
    func: Function,
    inputs: Vec<String>,
    output: Option<Output>,
    modifiers: Vec<Modifier>,
    func_type: FuncType,
    doc: String,
    /// Explicit `doc` and `func_type`; unset ones follow the function.
    overrides: (Option<String>, Option<FuncType>),
    node_func: KwFunc,
}

impl Node {
    pub fn builder(name: impl Into<String>, func: Function) -> NodeBuilder {
        NodeBuilder {
            name: name.into(),
            func,
            inputs: Vec::new(),
            output: None,
            modifiers: Vec::new(),
            doc: None,
            func_type: None,
        }
    }

    /// Returns a builder holding this node's construction arguments.
    pub fn edit(&self) -> NodeBuilder {
        NodeBuilder {
            name: self.name.clone(),
            func: self.func.clone(),
            inputs: self.inputs.clone(),
            output: self.output.clone(),
            modifiers: self.modifiers.clone(),
            doc: self.overrides.0.clone(),
            func_type: self.overrides.1,
        }
    }

    pub fn name(&self) -> &str { &self.name }

    pub fn func(&self) -> &Function { &self.func }

    pub fn inputs(&self) -> Vec<String> { self.inputs.clone() }

    pub fn modifiers(&self) -> Vec<Modifier> { self.modifiers.clone() }

    pub fn output(&self) -> Option<&Output> { self.output.as_ref() }

    /// Output names; empty if the node declares none.
    pub fn returns(&self) -> Vec<String> {
        self.output.as_ref().map(Output::names).unwrap_or_default()
    }

    pub fn func_type(&self) -> FuncType { self.func_type }

    pub fn doc(&self) -> &str { &self.doc }

    /// First line of the documentation.
    pub fn short_doc(&self) -> &str {
        self.doc.trim().lines().next().unwrap_or("")
    }

    /// The public, keyword-only signature after modifiers.
    pub fn signature(&self) -> &Signature { self.node_func.signature() }

    pub fn node_func(&self) -> &KwFunc { &self.node_func }

    pub fn call(&self, kwargs: Kwargs) -> Result<Value, CallError> {
        self.node_func.call(kwargs)
    }

    pub fn call_with(&self, args: Vec<Value>, kwargs: Kwargs) -> Result<Value, CallError> {
        self.node_func.call_with(args, kwargs)
    }

    pub fn metadata(&self) -> Metadata {
        vec![
            ("name", self.name.clone()),
            ("func", format!("{}{}", self.func.name(), self.signature())),
            ("returns", metadata::format_returns(&self.returns())),
            ("functype", self.func_type.to_string()),
            ("modifiers", metadata::format_modifiers(&self.modifiers)),
            ("doc", self.short_doc().to_string()),
        ]
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", metadata::format_metadata(&self.metadata()))
    }
}
