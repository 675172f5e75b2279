//! Parameter descriptors and their canonical ordering.

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Binding kind of a parameter, ranked in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    PositionalOnly,
    PositionalOrKeyword,
    VarPositional,
    KeywordOnly,
    VarKeyword,
}

impl ParamKind {
    pub fn is_variadic(&self) -> bool {
        matches!(self, ParamKind::VarPositional | ParamKind::VarKeyword)
    }

    /// Filled from positional arguments.
    pub fn is_positional(&self) -> bool {
        matches!(self, ParamKind::PositionalOnly | ParamKind::PositionalOrKeyword)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ParamKind::PositionalOnly => "positional-only",
            ParamKind::PositionalOrKeyword => "positional-or-keyword",
            ParamKind::VarPositional => "variadic positional",
            ParamKind::KeywordOnly => "keyword-only",
            ParamKind::VarKeyword => "variadic keyword",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub kind: ParamKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, kind: ParamKind) -> Self {
        Self { name: name.into(), kind, default: None }
    }

    pub fn positional(name: impl Into<String>) -> Self {
        Self::new(name, ParamKind::PositionalOrKeyword)
    }

    pub fn keyword(name: impl Into<String>) -> Self {
        Self::new(name, ParamKind::KeywordOnly)
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn with_kind(mut self, kind: ParamKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn has_default(&self) -> bool { self.default.is_some() }

    pub fn is_required(&self) -> bool {
        self.default.is_none() && !self.kind.is_variadic()
    }

    /// Sort key: kind rank, then no-default before has-default, then name.
    pub fn sort_key(&self) -> (ParamKind, bool, &str) {
        (self.kind, self.has_default(), self.name.as_str())
    }
}

/// The canonical parameter ordering used whenever a signature is rebuilt.
pub fn param_sorter(a: &Parameter, b: &Parameter) -> Ordering {
    a.sort_key().cmp(&b.sort_key())
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ParamKind::VarPositional => write!(f, "*{}", self.name)?,
            ParamKind::VarKeyword => write!(f, "**{}", self.name)?,
            _ => write!(f, "{}", self.name)?,
        }
        if let Some(default) = &self.default {
            write!(f, "={}", default)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_sorter_kind_then_default_then_name() {
        let mut params = vec![
            Parameter::keyword("z"),
            Parameter::positional("b").with_default(2),
            Parameter::new("kwargs", ParamKind::VarKeyword),
            Parameter::positional("c"),
            Parameter::new("p", ParamKind::PositionalOnly),
            Parameter::positional("a"),
            Parameter::new("args", ParamKind::VarPositional),
        ];
        params.sort_by(param_sorter);
        let names: Vec<_> = params.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["p", "a", "c", "b", "args", "z", "kwargs"]);
    }

    #[test]
    fn test_display() {
        assert_eq!(Parameter::positional("b").with_default(2).to_string(), "b=2");
        assert_eq!(Parameter::new("args", ParamKind::VarPositional).to_string(), "*args");
    }
}
