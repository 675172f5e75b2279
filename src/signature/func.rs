//! func.rs
//! The closed set of callable sources and the normalized keyword-only callable.

use super::sig::{BoundArguments, Signature};
use crate::error::CallError;
use crate::model::Model;
use crate::value::{Kwargs, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

type PlainBody = dyn Fn(&BoundArguments) -> Result<Value, CallError> + Send + Sync;
type NativeBody = dyn Fn(Vec<Value>) -> Result<Value, CallError> + Send + Sync;
type KwBody = dyn Fn(Kwargs) -> Result<Value, CallError> + Send + Sync;

/// Function-type classification shown in node descriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FuncType {
    Function,
    Builtin,
    Model,
}

impl fmt::Display for FuncType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FuncType::Function => "function",
            FuncType::Builtin => "builtin",
            FuncType::Model => "model",
        };
        write!(f, "{}", s)
    }
}

/// A function with an introspectable signature.
///
/// The body receives the arguments after binding and defaults, the way an
/// interpreter hands a call frame to a function.
#[derive(Clone)]
pub struct PlainFn {
    name: String,
    signature: Signature,
    doc: String,
    body: Arc<PlainBody>,
}

impl PlainFn {
    pub fn new<F>(name: impl Into<String>, signature: Signature, body: F) -> Self
    where
        F: Fn(&BoundArguments) -> Result<Value, CallError> + Send + Sync + 'static,
    {
        Self { name: name.into(), signature, doc: String::new(), body: Arc::new(body) }
    }

    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = doc.into();
        self
    }

    pub fn call(&self, args: Vec<Value>, kwargs: Kwargs) -> Result<Value, CallError> {
        let bound = self.signature.bind_defaults(args, kwargs)?;
        (self.body)(&bound)
    }
}

/// A native function without an introspectable signature.
#[derive(Clone)]
pub struct NativeFn {
    name: String,
    arity: Option<usize>,
    doc: String,
    body: Arc<NativeBody>,
}

impl NativeFn {
    pub fn new<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(Vec<Value>) -> Result<Value, CallError> + Send + Sync + 'static,
    {
        Self { name: name.into(), arity: None, doc: String::new(), body: Arc::new(body) }
    }

    /// Declares a fixed number of positional arguments.
    pub fn with_arity(mut self, arity: usize) -> Self {
        self.arity = Some(arity);
        self
    }

    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = doc.into();
        self
    }

    pub fn arity(&self) -> Option<usize> { self.arity }

    pub fn call(&self, args: Vec<Value>, kwargs: Kwargs) -> Result<Value, CallError> {
        if let Some(key) = kwargs.into_keys().next() {
            return Err(CallError::UnexpectedKeyword(key));
        }
        if let Some(arity) = self.arity {
            if args.len() > arity {
                return Err(CallError::TooManyPositional { maximum: arity, given: args.len() });
            }
            if args.len() < arity {
                return Err(CallError::msg(format!(
                    "{}() takes {} positional arguments but {} were given",
                    self.name,
                    arity,
                    args.len()
                )));
            }
        }
        (self.body)(args)
    }
}

/// Any callable that can back a node.
#[derive(Clone)]
pub enum Function {
    Plain(PlainFn),
    Native(NativeFn),
    Composed(Arc<Model>),
}

impl Function {
    /// Shorthand for `Function::Plain(PlainFn::new(..))`.
    pub fn plain<F>(name: impl Into<String>, signature: Signature, body: F) -> Self
    where
        F: Fn(&BoundArguments) -> Result<Value, CallError> + Send + Sync + 'static,
    {
        Function::Plain(PlainFn::new(name, signature, body))
    }

    /// Shorthand for `Function::Native(NativeFn::new(..))`.
    pub fn native<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(Vec<Value>) -> Result<Value, CallError> + Send + Sync + 'static,
    {
        Function::Native(NativeFn::new(name, body))
    }

    pub fn name(&self) -> &str {
        match self {
            Function::Plain(f) => &f.name,
            Function::Native(f) => &f.name,
            Function::Composed(m) => m.name(),
        }
    }

    /// `None` for native functions.
    pub fn signature(&self) -> Option<&Signature> {
        match self {
            Function::Plain(f) => Some(&f.signature),
            Function::Native(_) => None,
            Function::Composed(m) => Some(m.signature()),
        }
    }

    pub fn doc(&self) -> &str {
        match self {
            Function::Plain(f) => &f.doc,
            Function::Native(f) => &f.doc,
            Function::Composed(m) => m.doc(),
        }
    }

    pub fn func_type(&self) -> FuncType {
        match self {
            Function::Plain(_) => FuncType::Function,
            Function::Native(_) => FuncType::Builtin,
            Function::Composed(_) => FuncType::Model,
        }
    }

    pub fn call(&self, args: Vec<Value>, kwargs: Kwargs) -> Result<Value, CallError> {
        match self {
            Function::Plain(f) => f.call(args, kwargs),
            Function::Native(f) => f.call(args, kwargs),
            Function::Composed(m) => m.call_with(args, kwargs),
        }
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.signature() {
            Some(sig) => write!(f, "{}{}", self.name(), sig),
            None => write!(f, "{}(...)", self.name()),
        }
    }
}

impl From<Model> for Function {
    fn from(model: Model) -> Self { Function::Composed(Arc::new(model)) }
}

/// A normalized callable: explicit signature, body over a resolved keyword map.
///
/// Calls are bound against the signature first, so argument mismatches
/// surface as ordinary binding failures.
#[derive(Clone)]
pub struct KwFunc {
    name: String,
    signature: Signature,
    body: Arc<KwBody>,
}

impl KwFunc {
    pub fn new<F>(name: impl Into<String>, signature: Signature, body: F) -> Self
    where
        F: Fn(Kwargs) -> Result<Value, CallError> + Send + Sync + 'static,
    {
        Self { name: name.into(), signature, body: Arc::new(body) }
    }

    pub fn name(&self) -> &str { &self.name }

    pub fn signature(&self) -> &Signature { &self.signature }

    pub fn call(&self, kwargs: Kwargs) -> Result<Value, CallError> {
        self.call_with(Vec::new(), kwargs)
    }

    pub fn call_with(&self, args: Vec<Value>, kwargs: Kwargs) -> Result<Value, CallError> {
        let bound = self.signature.bind_defaults(args, kwargs)?;
        (self.body)(bound.into_inner())
    }

    /// Calls the body with an already resolved map, skipping binding.
    pub(crate) fn call_resolved(&self, kwargs: Kwargs) -> Result<Value, CallError> {
        (self.body)(kwargs)
    }
}

impl fmt::Debug for KwFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name, self.signature)
    }
}
