//! Operator set shared by every filter backend.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Two-operand operators: logical connectives and comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    And,
    Or,
    Equal,              // =
    NotEqual,           // !=
    GreaterThan,        // >
    GreaterThanOrEqual, // >=
    LessThan,           // <
    LessThanOrEqual,    // <=
}

/// Single-operand operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    Not,
    IsNull,
    NotNull,
}

/// Method-style operators applied to a target with an argument list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallOp {
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    In,
    NotIn,
    Between,
    ContainsAny,
}

impl CallOp {
    pub fn arity(self) -> Arity {
        match self {
            CallOp::Contains | CallOp::NotContains | CallOp::StartsWith | CallOp::EndsWith => {
                Arity::Exactly(1)
            }
            CallOp::Between => Arity::Exactly(2),
            CallOp::In | CallOp::NotIn | CallOp::ContainsAny => Arity::Any,
        }
    }
}

/// Number of arguments a [`CallOp`] accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exactly(usize),
    Any,
}

impl Arity {
    pub fn accepts(self, count: usize) -> bool {
        match self {
            Arity::Exactly(n) => n == count,
            Arity::Any => true,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exactly(1) => write!(f, "exactly 1 argument"),
            Arity::Exactly(n) => write!(f, "exactly {} arguments", n),
            Arity::Any => write!(f, "any number of arguments"),
        }
    }
}

/// Comparison after lowering; `Between`, `In` and friends all end up here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CompareOp {
    pub fn is_ordering(self) -> bool {
        !matches!(self, CompareOp::Eq | CompareOp::Ne)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
        }
    }
}

/// Any operator that can appear in a filter tree. Used for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Binary(BinaryOp),
    Unary(UnaryOp),
    Call(CallOp),
}

impl From<BinaryOp> for Operator {
    fn from(op: BinaryOp) -> Self {
        Operator::Binary(op)
    }
}

impl From<UnaryOp> for Operator {
    fn from(op: UnaryOp) -> Self {
        Operator::Unary(op)
    }
}

impl From<CallOp> for Operator {
    fn from(op: CallOp) -> Self {
        Operator::Call(op)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operator::Binary(op) => fmt::Debug::fmt(op, f),
            Operator::Unary(op) => fmt::Debug::fmt(op, f),
            Operator::Call(op) => fmt::Debug::fmt(op, f),
        }
    }
}
