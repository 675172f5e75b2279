//! Modifiers: composable transforms of a keyword-only callable.
//!
//! A modifier takes a `KwFunc` and returns a new one, possibly with a new
//! signature. Nodes and models apply their modifier lists in order, each
//! wrapping the result of the previous one.

use crate::error::{CallError, SignatureError};
use crate::signature::{KwFunc, ParamKind, Parameter, Signature};
use crate::value::{Kwargs, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

type WrapFn = dyn Fn(KwFunc) -> Result<KwFunc, SignatureError> + Send + Sync;

/// A modifier together with its arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "modifier", rename_all = "snake_case")]
pub enum Modifier {
    Loop { parameter: String },
    ZipLoop { parameters: Vec<String> },
    Signature { parameters: Vec<Parameter> },
    PosSignature { parameters: Vec<Parameter> },
    #[serde(skip)]
    Custom(CustomModifier),
}

impl Modifier {
    pub fn looped(parameter: impl Into<String>) -> Self {
        Modifier::Loop { parameter: parameter.into() }
    }

    pub fn zip_looped<I, S>(parameters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Modifier::ZipLoop { parameters: parameters.into_iter().map(Into::into).collect() }
    }

    pub fn signature(parameters: Vec<Parameter>) -> Self {
        Modifier::Signature { parameters }
    }

    pub fn pos_signature(parameters: Vec<Parameter>) -> Self {
        Modifier::PosSignature { parameters }
    }

    /// A user-defined modifier; `args` are shown in descriptions only.
    pub fn custom<F>(name: impl Into<String>, args: Vec<(String, Value)>, wrap: F) -> Self
    where
        F: Fn(KwFunc) -> Result<KwFunc, SignatureError> + Send + Sync + 'static,
    {
        Modifier::Custom(CustomModifier { name: name.into(), args, wrap: Arc::new(wrap) })
    }

    pub fn name(&self) -> &str {
        match self {
            Modifier::Loop { .. } => "loop_modifier",
            Modifier::ZipLoop { .. } => "zip_loop_modifier",
            Modifier::Signature { .. } => "signature_modifier",
            Modifier::PosSignature { .. } => "pos_signature_modifier",
            Modifier::Custom(c) => &c.name,
        }
    }

    pub fn apply(&self, func: KwFunc) -> Result<KwFunc, SignatureError> {
        match self {
            Modifier::Loop { parameter } => loop_modifier(func, parameter),
            Modifier::ZipLoop { parameters } => zip_loop_modifier(func, parameters),
            Modifier::Signature { parameters } => signature_modifier(func, parameters.clone()),
            Modifier::PosSignature { parameters } => pos_signature_modifier(func, parameters.clone()),
            Modifier::Custom(c) => (c.wrap)(func),
        }
    }
}

/// Applies `modifiers` in order.
pub fn modify_func(func: KwFunc, modifiers: &[Modifier]) -> Result<KwFunc, SignatureError> {
    modifiers.iter().try_fold(func, |func, modifier| modifier.apply(func))
}

impl fmt::Display for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |params: &[Parameter]| params.iter().map(|p| p.to_string()).collect::<Vec<_>>().join(", ");
        match self {
            Modifier::Loop { parameter } => write!(f, "loop_modifier(parameter='{}')", parameter),
            Modifier::ZipLoop { parameters } => {
                let quoted: Vec<_> = parameters.iter().map(|p| format!("'{}'", p)).collect();
                write!(f, "zip_loop_modifier(parameters=[{}])", quoted.join(", "))
            }
            Modifier::Signature { parameters } => write!(f, "signature_modifier(parameters=[{}])", join(parameters)),
            Modifier::PosSignature { parameters } => {
                write!(f, "pos_signature_modifier(parameters=[{}])", join(parameters))
            }
            Modifier::Custom(c) => {
                let args: Vec<_> = c.args.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
                write!(f, "{}({})", c.name, args.join(", "))
            }
        }
    }
}

#[derive(Clone)]
pub struct CustomModifier {
    name: String,
    args: Vec<(String, Value)>,
    wrap: Arc<WrapFn>,
}

impl fmt::Debug for CustomModifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomModifier").field("name", &self.name).field("args", &self.args).finish()
    }
}

impl PartialEq for CustomModifier {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && Arc::ptr_eq(&self.wrap, &other.wrap)
    }
}

/// Signature with the defaults of `looped` wrapped into one-element lists.
fn loop_signature(sig: &Signature, looped: &[String], modifier: &str) -> Result<Signature, SignatureError> {
    let mut params = sig.params().to_vec();
    for name in looped {
        let param = params.iter_mut().find(|p| &p.name == name).ok_or_else(|| SignatureError::UnknownParameter {
            modifier: modifier.to_string(),
            parameter: name.clone(),
        })?;
        if let Some(default) = param.default.take() {
            param.default = Some(Value::list(vec![default]));
        }
    }
    Signature::new(params)
}

fn take_items(kwargs: &mut Kwargs, parameter: &str) -> Result<Vec<Value>, CallError> {
    let value = kwargs.remove(parameter).unwrap_or_default();
    let type_name = value.type_name();
    value.into_items().ok_or_else(|| CallError::NotIterable {
        parameter: parameter.to_string(),
        type_name: type_name.to_string(),
    })
}

/// Calls `func` once per element of `parameter`, returning the list of results.
pub fn loop_modifier(func: KwFunc, parameter: &str) -> Result<KwFunc, SignatureError> {
    let parameter = parameter.to_string();
    let signature = loop_signature(func.signature(), std::slice::from_ref(&parameter), "loop_modifier")?;
    let name = func.name().to_string();

    Ok(KwFunc::new(name, signature, move |mut kwargs| {
        let items = take_items(&mut kwargs, &parameter)?;
        let mut results = Vec::with_capacity(items.len());
        for item in items {
            let mut call = kwargs.clone();
            call.insert(parameter.clone(), item);
            results.push(func.call_resolved(call)?);
        }
        Ok(Value::list(results))
    }))
}

/// Calls `func` once per tuple of paired elements; stops at the shortest.
pub fn zip_loop_modifier(func: KwFunc, parameters: &[String]) -> Result<KwFunc, SignatureError> {
    let parameters = parameters.to_vec();
    let signature = loop_signature(func.signature(), &parameters, "zip_loop_modifier")?;
    let name = func.name().to_string();

    Ok(KwFunc::new(name, signature, move |mut kwargs| {
        let columns = parameters
            .iter()
            .map(|p| take_items(&mut kwargs, p))
            .collect::<Result<Vec<_>, _>>()?;
        let rows = columns.iter().map(Vec::len).min().unwrap_or(0);

        let mut results = Vec::with_capacity(rows);
        for row in 0..rows {
            let mut call = kwargs.clone();
            for (param, column) in parameters.iter().zip(&columns) {
                call.insert(param.clone(), column[row].clone());
            }
            results.push(func.call_resolved(call)?);
        }
        Ok(Value::list(results))
    }))
}

fn remap(func: KwFunc, parameters: Vec<Parameter>, modifier: &str) -> Result<KwFunc, SignatureError> {
    let old: Vec<String> = func.signature().names().map(str::to_string).collect();
    if old.len() != parameters.len() {
        return Err(SignatureError::ArityMismatch {
            modifier: modifier.to_string(),
            expected: old.len(),
            given: parameters.len(),
        });
    }
    let new: Vec<String> = parameters.iter().map(|p| p.name.clone()).collect();
    let signature = Signature::new(parameters)?;
    let name = func.name().to_string();

    Ok(KwFunc::new(name, signature, move |mut kwargs| {
        let mapped = new
            .iter()
            .zip(&old)
            .map(|(new_name, old_name)| (old_name.clone(), kwargs.remove(new_name).unwrap_or_default()))
            .collect();
        func.call_resolved(mapped)
    }))
}

/// Rebinds the signature to `parameters`, mapping old names to new ones positionally.
pub fn signature_modifier(func: KwFunc, parameters: Vec<Parameter>) -> Result<KwFunc, SignatureError> {
    remap(func, parameters, "signature_modifier")
}

/// Like `signature_modifier`, but the new parameters only bind positionally.
pub fn pos_signature_modifier(func: KwFunc, parameters: Vec<Parameter>) -> Result<KwFunc, SignatureError> {
    let parameters = parameters.into_iter().map(|p| p.with_kind(ParamKind::PositionalOnly)).collect();
    remap(func, parameters, "pos_signature_modifier")
}
