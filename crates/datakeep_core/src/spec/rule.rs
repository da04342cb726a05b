//! Named business-rule payloads.

use serde::{Deserialize, Serialize};

/// One positional business-rule argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleArg {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    Text(String),
}

impl From<bool> for RuleArg {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for RuleArg {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for RuleArg {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for RuleArg {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<&str> for RuleArg {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for RuleArg {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl<V: Into<RuleArg>> From<Option<V>> for RuleArg {
    fn from(value: Option<V>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Opaque store-defined query selected by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessRule {
    pub name: String,
    pub args: Vec<RuleArg>,
}

impl BusinessRule {
    pub fn new(name: impl Into<String>, args: Vec<RuleArg>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }
}
