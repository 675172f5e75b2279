//! sig.rs
//! Validated parameter lists and argument binding.

use super::param::{ParamKind, Parameter};
use crate::error::{CallError, SignatureError};
use crate::value::{Kwargs, Value};
use std::fmt;

/// An ordered, validated list of parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Signature {
    params: Vec<Parameter>,
}

impl Signature {
    /// Validates kind order, default placement and name uniqueness.
    pub fn new(params: Vec<Parameter>) -> Result<Self, SignatureError> {
        let mut top_kind = ParamKind::PositionalOnly;
        let mut seen_default = false;
        let mut names = std::collections::HashSet::new();

        for param in &params {
            if param.kind < top_kind
                || (param.kind == top_kind && param.kind.is_variadic() && !names.is_empty())
            {
                return Err(SignatureError::InvalidOrder {
                    name: param.name.clone(),
                    kind: param.kind.label().to_string(),
                    previous: top_kind.label().to_string(),
                });
            }
            top_kind = param.kind;

            if param.kind.is_positional() {
                if param.has_default() {
                    seen_default = true;
                } else if seen_default {
                    return Err(SignatureError::NonDefaultAfterDefault(param.name.clone()));
                }
            }

            if !names.insert(param.name.as_str()) {
                return Err(SignatureError::DuplicateParameter(param.name.clone()));
            }
        }

        Ok(Self { params })
    }

    /// Keyword-only signature with required parameters in the given order.
    pub fn keyword_only<I, S>(names: I) -> Result<Self, SignatureError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(names.into_iter().map(Parameter::keyword).collect())
    }

    pub fn params(&self) -> &[Parameter] { &self.params }

    pub fn len(&self) -> usize { self.params.len() }

    pub fn is_empty(&self) -> bool { self.params.is_empty() }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.params.iter().map(|p| p.name.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn contains(&self, name: &str) -> bool { self.get(name).is_some() }

    pub fn has_var_positional(&self) -> bool {
        self.params.iter().any(|p| p.kind == ParamKind::VarPositional)
    }

    pub fn has_var_keyword(&self) -> bool {
        self.params.iter().any(|p| p.kind == ParamKind::VarKeyword)
    }

    /// Binds a call against this signature without applying defaults.
    pub fn bind(&self, args: Vec<Value>, mut kwargs: Kwargs) -> Result<BoundArguments, CallError> {
        let mut arguments = Kwargs::new();
        let given = args.len();
        let mut args = args.into_iter();

        // Positional pass.
        for param in &self.params {
            match param.kind {
                ParamKind::PositionalOnly | ParamKind::PositionalOrKeyword => match args.next() {
                    Some(value) => {
                        if param.kind == ParamKind::PositionalOrKeyword && kwargs.contains_key(&param.name) {
                            return Err(CallError::MultipleValues(param.name.clone()));
                        }
                        arguments.insert(param.name.clone(), value);
                    }
                    None => break,
                },
                ParamKind::VarPositional => {
                    arguments.insert(param.name.clone(), Value::tuple(args.by_ref().collect()));
                }
                _ => break,
            }
        }

        if args.next().is_some() {
            let maximum = self.params.iter().filter(|p| p.kind.is_positional()).count();
            return Err(CallError::TooManyPositional { maximum, given });
        }

        // Keyword pass.
        let mut var_keyword = None;
        for param in &self.params {
            if arguments.contains_key(&param.name) {
                continue;
            }
            match param.kind {
                ParamKind::PositionalOnly => {
                    if kwargs.contains_key(&param.name) && !self.has_var_keyword() {
                        return Err(CallError::PositionalOnlyAsKeyword(param.name.clone()));
                    }
                    if param.is_required() {
                        return Err(CallError::MissingArgument(param.name.clone()));
                    }
                }
                ParamKind::PositionalOrKeyword | ParamKind::KeywordOnly => {
                    match kwargs.remove(&param.name) {
                        Some(value) => {
                            arguments.insert(param.name.clone(), value);
                        }
                        None if param.is_required() => {
                            return Err(CallError::MissingArgument(param.name.clone()));
                        }
                        None => {}
                    }
                }
                ParamKind::VarKeyword => var_keyword = Some(param.name.clone()),
                ParamKind::VarPositional => {}
            }
        }

        match var_keyword {
            Some(name) => {
                arguments.insert(name, Value::map(kwargs));
            }
            None => {
                if let Some(key) = kwargs.into_keys().next() {
                    return Err(CallError::UnexpectedKeyword(key));
                }
            }
        }

        Ok(BoundArguments { arguments })
    }

    /// Binds a call and fills in defaults; the result holds every parameter.
    pub fn bind_defaults(&self, args: Vec<Value>, kwargs: Kwargs) -> Result<BoundArguments, CallError> {
        let mut bound = self.bind(args, kwargs)?;
        bound.apply_defaults(self);
        Ok(bound)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::with_capacity(self.params.len() + 2);
        let mut star_written = false;
        for (i, param) in self.params.iter().enumerate() {
            match param.kind {
                ParamKind::VarPositional => star_written = true,
                ParamKind::KeywordOnly if !star_written => {
                    parts.push("*".to_string());
                    star_written = true;
                }
                _ => {}
            }
            parts.push(param.to_string());
            let next_kind = self.params.get(i + 1).map(|p| p.kind);
            if param.kind == ParamKind::PositionalOnly && next_kind != Some(ParamKind::PositionalOnly) {
                parts.push("/".to_string());
            }
        }
        write!(f, "({})", parts.join(", "))
    }
}

/// The name -> value mapping produced by binding a call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundArguments {
    pub arguments: Kwargs,
}

impl BoundArguments {
    pub fn apply_defaults(&mut self, signature: &Signature) {
        for param in signature.params() {
            if self.arguments.contains_key(&param.name) {
                continue;
            }
            let value = match (&param.default, param.kind) {
                (Some(default), _) => default.clone(),
                (None, ParamKind::VarPositional) => Value::tuple(Vec::new()),
                (None, ParamKind::VarKeyword) => Value::map(Kwargs::new()),
                (None, _) => continue,
            };
            self.arguments.insert(param.name.clone(), value);
        }
    }

    pub fn get(&self, name: &str) -> Result<&Value, CallError> {
        self.arguments
            .get(name)
            .ok_or_else(|| CallError::MissingArgument(name.to_string()))
    }

    /// Numeric argument as `f64`.
    pub fn f64(&self, name: &str) -> Result<f64, CallError> {
        let value = self.get(name)?;
        value
            .as_f64()
            .ok_or_else(|| CallError::msg(format!("argument '{}' must be numeric, got {}", name, value.type_name())))
    }

    /// Integer argument as `i64`.
    pub fn i64(&self, name: &str) -> Result<i64, CallError> {
        let value = self.get(name)?;
        value
            .as_i64()
            .ok_or_else(|| CallError::msg(format!("argument '{}' must be an integer, got {}", name, value.type_name())))
    }

    pub fn into_inner(self) -> Kwargs { self.arguments }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::kwargs;
    use rstest::{fixture, rstest};

    /// (pos_only, /, pos_or_kw, *var_pos, kw_only, kw_default=3, **var_kw)
    #[fixture]
    fn full_sig() -> Signature {
        Signature::new(vec![
            Parameter::new("pos_only", ParamKind::PositionalOnly),
            Parameter::positional("pos_or_kw"),
            Parameter::new("var_pos", ParamKind::VarPositional),
            Parameter::keyword("kw_only"),
            Parameter::keyword("kw_default").with_default(3),
            Parameter::new("var_kw", ParamKind::VarKeyword),
        ])
        .unwrap()
    }

    #[rstest]
    fn test_display(full_sig: Signature) {
        assert_eq!(
            full_sig.to_string(),
            "(pos_only, /, pos_or_kw, *var_pos, kw_only, kw_default=3, **var_kw)"
        );
        let kw = Signature::keyword_only(["a", "b"]).unwrap();
        assert_eq!(kw.to_string(), "(*, a, b)");
    }

    #[test]
    fn test_invalid_order() {
        let err = Signature::new(vec![Parameter::keyword("a"), Parameter::positional("b")]).unwrap_err();
        assert!(matches!(err, SignatureError::InvalidOrder { .. }));
    }

    #[test]
    fn test_non_default_after_default() {
        let err = Signature::new(vec![Parameter::positional("a").with_default(1), Parameter::positional("b")])
            .unwrap_err();
        assert_eq!(err, SignatureError::NonDefaultAfterDefault("b".into()));
    }

    #[test]
    fn test_duplicate_name() {
        let err = Signature::new(vec![Parameter::positional("a"), Parameter::keyword("a")]).unwrap_err();
        assert_eq!(err, SignatureError::DuplicateParameter("a".into()));
    }

    #[rstest]
    fn test_bind_routes_every_kind(full_sig: Signature) {
        let bound = full_sig
            .bind_defaults(
                vec![1.into(), 2.into(), 3.into(), 4.into()],
                kwargs([("kw_only", 5), ("extra", 6)]),
            )
            .unwrap();
        let args = bound.arguments;
        assert_eq!(args["pos_only"], Value::Int(1));
        assert_eq!(args["pos_or_kw"], Value::Int(2));
        assert_eq!(args["var_pos"], Value::tuple(vec![3.into(), 4.into()]));
        assert_eq!(args["kw_only"], Value::Int(5));
        assert_eq!(args["kw_default"], Value::Int(3));
        assert_eq!(args["var_kw"], Value::map(kwargs([("extra", 6)])));
    }

    #[test]
    fn test_bind_failures() {
        let sig = Signature::keyword_only(["a", "b"]).unwrap();

        let err = sig.bind(vec![], kwargs([("a", 1)])).unwrap_err();
        assert_eq!(err.to_string(), "missing a required argument: 'b'");

        let err = sig.bind(vec![], kwargs([("a", 1), ("b", 2), ("c", 3)])).unwrap_err();
        assert_eq!(err.to_string(), "got an unexpected keyword argument 'c'");

        let err = sig.bind(vec![1.into()], kwargs([("a", 1), ("b", 2)])).unwrap_err();
        assert!(matches!(err, CallError::TooManyPositional { maximum: 0, given: 1 }));
    }

    #[test]
    fn test_bind_multiple_values() {
        let sig = Signature::new(vec![Parameter::positional("a")]).unwrap();
        let err = sig.bind(vec![1.into()], kwargs([("a", 1)])).unwrap_err();
        assert!(matches!(err, CallError::MultipleValues(name) if name == "a"));
    }

    #[test]
    fn test_bind_positional_only_as_keyword() {
        let sig = Signature::new(vec![Parameter::new("a", ParamKind::PositionalOnly)]).unwrap();
        let err = sig.bind(vec![], kwargs([("a", 1)])).unwrap_err();
        assert!(matches!(err, CallError::PositionalOnlyAsKeyword(_)));
    }
}
