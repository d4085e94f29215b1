//! Backend-neutral filter tree.
//!
//! A `FilterNode` is produced by an upstream parser and consumed by the
//! compilers in [`crate::relational`] and [`crate::document`]. Arity is
//! enforced when a tree is built: binary and unary shapes are fixed by the
//! enum, and [`Call`] can only be created through [`Call::new`].

use crate::operator::{Arity, BinaryOp, CallOp, UnaryOp};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A node of the filter tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum FilterNode {
    /// Logical connective or comparison
    Binary {
        op: BinaryOp,
        left: Box<FilterNode>,
        right: Box<FilterNode>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<FilterNode>,
    },
    /// `target.op(arguments...)`
    Call(Call),
    /// Reference to a logical field name, resolved through a `FieldMap`
    Field { name: String },
    Literal { value: Value },
    /// Explicit parentheses from the source text; compiles as its inner node
    Group { inner: Box<FilterNode> },
}

/// Operator call node. Fields are private so the argument count always
/// matches [`CallOp::arity`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCall")]
pub struct Call {
    op: CallOp,
    target: Box<FilterNode>,
    arguments: Vec<FilterNode>,
}

#[derive(Debug, Error, Clone, PartialEq)]
#[error("{op:?} takes {expected}, got {actual}")]
pub struct ArityError {
    pub op: CallOp,
    pub expected: Arity,
    pub actual: usize,
}

impl Call {
    pub fn new(
        op: CallOp,
        target: FilterNode,
        arguments: Vec<FilterNode>,
    ) -> Result<Self, ArityError> {
        let expected = op.arity();
        if !expected.accepts(arguments.len()) {
            return Err(ArityError {
                op,
                expected,
                actual: arguments.len(),
            });
        }
        Ok(Self {
            op,
            target: Box::new(target),
            arguments,
        })
    }

    pub fn op(&self) -> CallOp {
        self.op
    }

    pub fn target(&self) -> &FilterNode {
        &self.target
    }

    pub fn arguments(&self) -> &[FilterNode] {
        &self.arguments
    }
}

#[derive(Deserialize)]
struct RawCall {
    op: CallOp,
    target: Box<FilterNode>,
    #[serde(default)]
    arguments: Vec<FilterNode>,
}

impl TryFrom<RawCall> for Call {
    type Error = ArityError;

    fn try_from(raw: RawCall) -> Result<Self, Self::Error> {
        Call::new(raw.op, *raw.target, raw.arguments)
    }
}

impl FilterNode {
    pub fn field(name: impl Into<String>) -> Self {
        FilterNode::Field { name: name.into() }
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        FilterNode::Literal {
            value: value.into(),
        }
    }

    pub fn null() -> Self {
        FilterNode::Literal { value: Value::Null }
    }

    pub fn binary(op: BinaryOp, left: FilterNode, right: FilterNode) -> Self {
        FilterNode::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn unary(op: UnaryOp, operand: FilterNode) -> Self {
        FilterNode::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    pub fn call(
        op: CallOp,
        target: FilterNode,
        arguments: Vec<FilterNode>,
    ) -> Result<Self, ArityError> {
        Call::new(op, target, arguments).map(FilterNode::Call)
    }

    pub fn group(inner: FilterNode) -> Self {
        FilterNode::Group {
            inner: Box::new(inner),
        }
    }

    pub fn and(left: FilterNode, right: FilterNode) -> Self {
        Self::binary(BinaryOp::And, left, right)
    }

    pub fn or(left: FilterNode, right: FilterNode) -> Self {
        Self::binary(BinaryOp::Or, left, right)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(operand: FilterNode) -> Self {
        Self::unary(UnaryOp::Not, operand)
    }

    /// `field = value`
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Self::binary(BinaryOp::Equal, Self::field(field), Self::literal(value))
    }

    /// `field != value`
    pub fn ne(field: &str, value: impl Into<Value>) -> Self {
        Self::binary(BinaryOp::NotEqual, Self::field(field), Self::literal(value))
    }

    pub fn gt(field: &str, value: impl Into<Value>) -> Self {
        Self::binary(BinaryOp::GreaterThan, Self::field(field), Self::literal(value))
    }

    pub fn gte(field: &str, value: impl Into<Value>) -> Self {
        Self::binary(
            BinaryOp::GreaterThanOrEqual,
            Self::field(field),
            Self::literal(value),
        )
    }

    pub fn lt(field: &str, value: impl Into<Value>) -> Self {
        Self::binary(BinaryOp::LessThan, Self::field(field), Self::literal(value))
    }

    pub fn lte(field: &str, value: impl Into<Value>) -> Self {
        Self::binary(
            BinaryOp::LessThanOrEqual,
            Self::field(field),
            Self::literal(value),
        )
    }

    pub fn is_null(field: &str) -> Self {
        Self::unary(UnaryOp::IsNull, Self::field(field))
    }

    pub fn not_null(field: &str) -> Self {
        Self::unary(UnaryOp::NotNull, Self::field(field))
    }

    /// Single-argument text call (`Contains`, `NotContains`, `StartsWith`, `EndsWith`).
    pub fn text_call(op: CallOp, field: &str, needle: &str) -> Result<Self, ArityError> {
        Self::call(op, Self::field(field), vec![Self::literal(needle)])
    }

    fn one_argument(op: CallOp, field: &str, needle: &str) -> Self {
        FilterNode::Call(Call {
            op,
            target: Box::new(Self::field(field)),
            arguments: vec![Self::literal(needle)],
        })
    }

    pub fn contains(field: &str, needle: &str) -> Self {
        Self::one_argument(CallOp::Contains, field, needle)
    }

    pub fn not_contains(field: &str, needle: &str) -> Self {
        Self::one_argument(CallOp::NotContains, field, needle)
    }

    pub fn starts_with(field: &str, prefix: &str) -> Self {
        Self::one_argument(CallOp::StartsWith, field, prefix)
    }

    pub fn ends_with(field: &str, suffix: &str) -> Self {
        Self::one_argument(CallOp::EndsWith, field, suffix)
    }

    /// `Call` over a literal list (`In`, `NotIn`, `ContainsAny`).
    pub fn list_call<V: Into<Value>>(
        op: CallOp,
        field: &str,
        values: impl IntoIterator<Item = V>,
    ) -> Result<Self, ArityError> {
        let arguments = values.into_iter().map(Self::literal).collect();
        Self::call(op, Self::field(field), arguments)
    }

    pub fn between(field: &str, min: impl Into<Value>, max: impl Into<Value>) -> Self {
        FilterNode::Call(Call {
            op: CallOp::Between,
            target: Box::new(Self::field(field)),
            arguments: vec![Self::literal(min), Self::literal(max)],
        })
    }

    /// Short name of the node kind, used in structural error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            FilterNode::Binary { .. } => "binary expression",
            FilterNode::Unary { .. } => "unary expression",
            FilterNode::Call(_) => "call",
            FilterNode::Field { .. } => "field",
            FilterNode::Literal { .. } => "literal",
            FilterNode::Group { .. } => "group",
        }
    }

    /// Strips any number of enclosing `Group` nodes.
    pub fn ungrouped(&self) -> &FilterNode {
        let mut node = self;
        while let FilterNode::Group { inner } = node {
            node = inner;
        }
        node
    }

    /// Nesting depth of the tree, where a leaf has depth 1, or `None` once
    /// it exceeds `max`. The walk never descends more than `max` levels.
    pub fn depth_within(&self, max: usize) -> Option<usize> {
        let below = max.checked_sub(1)?;
        let deepest = match self {
            FilterNode::Binary { left, right, .. } => {
                left.depth_within(below)?.max(right.depth_within(below)?)
            }
            FilterNode::Unary { operand, .. } => operand.depth_within(below)?,
            FilterNode::Call(call) => {
                let mut deepest = call.target.depth_within(below)?;
                for argument in &call.arguments {
                    deepest = deepest.max(argument.depth_within(below)?);
                }
                deepest
            }
            FilterNode::Group { inner } => inner.depth_within(below)?,
            FilterNode::Field { .. } | FilterNode::Literal { .. } => 0,
        };
        Some(1 + deepest)
    }
}
