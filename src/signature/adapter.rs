//! adapter.rs
//! Normalizes any `Function` into a keyword-only `KwFunc`.
//!
//! Every node reads its inputs by name from the shared execution state, so
//! whatever calling convention the underlying function has, the adapter
//! produces a signature of keyword-only parameters and a body that routes the
//! named values back into the original positional/keyword slots.

use super::func::{Function, KwFunc};
use super::param::{param_sorter, ParamKind, Parameter};
use super::sig::Signature;
use crate::error::{CallError, SignatureError};
use crate::value::{Kwargs, Value};
use std::sync::Arc;

/// True if the parameter names of the function can be inspected.
pub fn has_signature(func: &Function) -> bool {
    func.signature().is_some()
}

/// True if the function is already keyword-only and needs no rerouting.
pub fn check_signature(func: &Function) -> bool {
    func.signature()
        .map(|sig| sig.params().iter().all(|p| p.kind == ParamKind::KeywordOnly))
        .unwrap_or(false)
}

/// Wraps an already keyword-only function without changing its signature.
pub fn keyword_function(func: Function) -> Result<KwFunc, SignatureError> {
    let sig = func
        .signature()
        .cloned()
        .ok_or_else(|| SignatureError::RequiresInputs(func.name().to_string()))?;
    let name = func.name().to_string();
    Ok(KwFunc::new(name, sig, move |kwargs| func.call(Vec::new(), kwargs)))
}

/// Rebuilds the function with a keyword-only signature.
///
/// Named parameters keep their defaults; variadic parameters cannot be
/// addressed by name and are dropped from the public signature.
pub fn convert_signature(func: Function) -> Result<KwFunc, SignatureError> {
    let original = func
        .signature()
        .cloned()
        .ok_or_else(|| SignatureError::RequiresInputs(func.name().to_string()))?;

    let mut params: Vec<Parameter> = original
        .params()
        .iter()
        .filter(|p| !p.kind.is_variadic())
        .map(|p| p.clone().with_kind(ParamKind::KeywordOnly))
        .collect();
    params.sort_by(param_sorter);
    let signature = Signature::new(params)?;

    let name = func.name().to_string();
    Ok(KwFunc::new(name, signature, move |kwargs| {
        let (args, kwargs) = split_arguments(&original, kwargs)?;
        func.call(args, kwargs)
    }))
}

/// Rebinds the existing parameters of an introspectable function to `names`.
///
/// `names[i]` takes over the i-th non-variadic parameter (its kind and
/// default); names beyond those feed the variadic positional parameter.
pub fn modify_signature(func: Function, names: &[String]) -> Result<KwFunc, SignatureError> {
    let original = func
        .signature()
        .cloned()
        .ok_or_else(|| SignatureError::RequiresInputs(func.name().to_string()))?;

    let fixed: Vec<Parameter> = original.params().iter().filter(|p| !p.kind.is_variadic()).cloned().collect();
    let minimum = fixed.iter().rposition(Parameter::is_required).map_or(0, |i| i + 1);
    if names.len() < minimum {
        return Err(SignatureError::NotEnoughArguments { minimum, given: names.len() });
    }
    if !original.has_var_positional() && names.len() > fixed.len() {
        return Err(SignatureError::TooManyArguments { maximum: fixed.len(), given: names.len() });
    }

    let mut params = Vec::with_capacity(names.len());
    for (i, name) in names.iter().enumerate() {
        let mut param = Parameter::keyword(name.clone());
        param.default = fixed.get(i).and_then(|p| p.default.clone());
        params.push(param);
    }
    params.sort_by(param_sorter);
    let signature = Signature::new(params)?;

    let names = names.to_vec();
    let name = func.name().to_string();
    Ok(KwFunc::new(name, signature, move |mut kwargs| {
        let mut args = Vec::with_capacity(names.len());
        let mut slots = Kwargs::new();
        for (i, new_name) in names.iter().enumerate() {
            let value = kwargs.remove(new_name).unwrap_or_default();
            match fixed.get(i) {
                Some(p) if p.kind.is_positional() => args.push(value),
                Some(p) => {
                    slots.insert(p.name.clone(), value);
                }
                None => args.push(value),
            }
        }
        func.call(args, slots)
    }))
}

/// Attaches a keyword-only signature to a function that has none.
///
/// The call extracts the values in `names` order and invokes the function
/// positionally.
pub fn add_signature(func: Function, names: &[String]) -> Result<KwFunc, SignatureError> {
    if let Function::Native(native) = &func {
        if let Some(arity) = native.arity() {
            if names.len() < arity {
                return Err(SignatureError::NotEnoughArguments { minimum: arity, given: names.len() });
            }
            if names.len() > arity {
                return Err(SignatureError::TooManyArguments { maximum: arity, given: names.len() });
            }
        }
    }

    let mut params: Vec<Parameter> = names.iter().map(Parameter::keyword).collect();
    params.sort_by(param_sorter);
    let signature = Signature::new(params)?;

    let names = names.to_vec();
    let name = func.name().to_string();
    Ok(KwFunc::new(name, signature, move |mut kwargs| {
        let args = names.iter().map(|n| kwargs.remove(n).unwrap_or_default()).collect();
        func.call(args, Kwargs::new())
    }))
}

/// Splits bound arguments into a positional list and a keyword map.
///
/// Positional values are taken in declared order until the first keyword-only
/// or variadic keyword parameter, or until a positional parameter is absent.
/// Variadic positional values behind an absent positional parameter have no
/// slot to go to and fail with `MissingArgument`.
pub fn split_arguments(signature: &Signature, mut arguments: Kwargs) -> Result<(Vec<Value>, Kwargs), CallError> {
    let mut args = Vec::new();
    let mut kwargs = Kwargs::new();
    let mut positional = true;
    let mut gap: Option<&str> = None;

    for param in signature.params() {
        let Some(value) = arguments.remove(&param.name) else {
            if param.kind.is_positional() && positional {
                positional = false;
                gap = Some(&param.name);
            }
            continue;
        };
        match param.kind {
            ParamKind::PositionalOnly | ParamKind::PositionalOrKeyword if positional => args.push(value),
            ParamKind::PositionalOnly | ParamKind::PositionalOrKeyword => {
                kwargs.insert(param.name.clone(), value);
            }
            ParamKind::VarPositional => {
                let items = value.into_items().unwrap_or_default();
                match gap {
                    Some(missing) if !items.is_empty() => return Err(CallError::MissingArgument(missing.to_string())),
                    _ if positional => args.extend(items),
                    _ => {}
                }
            }
            ParamKind::KeywordOnly => {
                positional = false;
                kwargs.insert(param.name.clone(), value);
            }
            ParamKind::VarKeyword => {
                positional = false;
                if let Value::Map(map) = value {
                    kwargs.extend(Arc::unwrap_or_clone(map));
                }
            }
        }
    }

    Ok((args, kwargs))
}

/// Converts every parameter to positional-or-keyword, applies `defaults`,
/// and sorts canonically. Used for a model's merged signature.
pub fn restructure_signature(signature: &Signature, defaults: &Kwargs) -> Result<Signature, SignatureError> {
    let mut params: Vec<Parameter> = signature
        .params()
        .iter()
        .filter(|p| !p.kind.is_variadic())
        .map(|p| Parameter {
            name: p.name.clone(),
            kind: ParamKind::PositionalOrKeyword,
            default: defaults.get(&p.name).cloned(),
        })
        .collect();
    params.sort_by(param_sorter);
    Signature::new(params)
}
