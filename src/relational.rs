//! Relational filter compiler that lowers filter trees into [`Predicate`]s,
//! which render to sea-query conditions for push-down.

use crate::ast::{Call, FilterNode};
use crate::config::CompilerLimits;
use crate::error::{Capability, CompileError};
use crate::field_map::{Field, FieldMap};
use crate::operator::{BinaryOp, CallOp, CompareOp, Operator, UnaryOp};
use crate::predicate::{MatchKind, Operand, Predicate};
use crate::value::{Value, ValueType};
use crate::FilterCompiler;
use tracing::debug;

/// Compiles a filter tree against a [`FieldMap`] into a [`Predicate`].
#[derive(Debug, Clone, Default)]
pub struct RelationalCompiler {
    limits: CompilerLimits,
}

impl RelationalCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(limits: CompilerLimits) -> Self {
        Self { limits }
    }

    pub fn compile<T>(
        &self,
        node: &FilterNode,
        fields: &FieldMap<T>,
    ) -> Result<Predicate<T>, CompileError> {
        let depth = self.limits.check_depth(node)?;
        let predicate = self.compile_node(node, fields)?;
        debug!(depth, "compiled relational filter");
        Ok(predicate)
    }

    fn compile_node<T>(
        &self,
        node: &FilterNode,
        fields: &FieldMap<T>,
    ) -> Result<Predicate<T>, CompileError> {
        match node {
            FilterNode::Binary { op, left, right } => match op {
                BinaryOp::And => {
                    let left = self.compile_node(left, fields)?;
                    Ok(left.and(self.compile_node(right, fields)?))
                }
                BinaryOp::Or => {
                    let left = self.compile_node(left, fields)?;
                    Ok(left.or(self.compile_node(right, fields)?))
                }
                BinaryOp::Equal => self.compile_comparison(*op, CompareOp::Eq, left, right, fields),
                BinaryOp::NotEqual => {
                    self.compile_comparison(*op, CompareOp::Ne, left, right, fields)
                }
                BinaryOp::GreaterThan => {
                    self.compile_comparison(*op, CompareOp::Gt, left, right, fields)
                }
                BinaryOp::GreaterThanOrEqual => {
                    self.compile_comparison(*op, CompareOp::Gte, left, right, fields)
                }
                BinaryOp::LessThan => {
                    self.compile_comparison(*op, CompareOp::Lt, left, right, fields)
                }
                BinaryOp::LessThanOrEqual => {
                    self.compile_comparison(*op, CompareOp::Lte, left, right, fields)
                }
            },
            FilterNode::Unary { op, operand } => match op {
                UnaryOp::Not => Ok(self.compile_node(operand, fields)?.not()),
                UnaryOp::IsNull => Ok(Predicate::IsNull {
                    field: resolve_field(operand, fields)?,
                    negated: false,
                }),
                UnaryOp::NotNull => Ok(Predicate::IsNull {
                    field: resolve_field(operand, fields)?,
                    negated: true,
                }),
            },
            FilterNode::Call(call) => self.compile_call(call, fields),
            FilterNode::Field { .. } => {
                // A bare bool field reads as `field = true`
                let field = resolve_field(node, fields)?;
                if field.value_type() != ValueType::Bool {
                    return Err(CompileError::structural("boolean expression", "field"));
                }
                Ok(Predicate::Compare {
                    left: field,
                    op: CompareOp::Eq,
                    right: Operand::Value(Value::Bool(true)),
                })
            }
            FilterNode::Literal { value } => match value {
                Value::Bool(b) => Ok(Predicate::Const(*b)),
                _ => Err(CompileError::structural("boolean expression", "literal")),
            },
            FilterNode::Group { inner } => self.compile_node(inner, fields),
        }
    }

    fn compile_comparison<T>(
        &self,
        op: BinaryOp,
        cmp: CompareOp,
        left: &FilterNode,
        right: &FilterNode,
        fields: &FieldMap<T>,
    ) -> Result<Predicate<T>, CompileError> {
        let field = resolve_field(left, fields)?;

        match right.ungrouped() {
            FilterNode::Literal { value: Value::Null } => {
                if !field.is_nullable() {
                    return Err(CompileError::NullNotAllowed(field.name().to_string()));
                }
                match cmp {
                    CompareOp::Eq => Ok(Predicate::IsNull {
                        field,
                        negated: false,
                    }),
                    CompareOp::Ne => Ok(Predicate::IsNull {
                        field,
                        negated: true,
                    }),
                    _ => Err(CompileError::unsupported(op, "null")),
                }
            }
            FilterNode::Literal { value } => {
                check_ordering(op, cmp, &field)?;
                let value = field.coerce(value)?;
                Ok(Predicate::Compare {
                    left: field,
                    op: cmp,
                    right: Operand::Value(value),
                })
            }
            FilterNode::Field { .. } => {
                check_ordering(op, cmp, &field)?;
                let other = resolve_field(right, fields)?;
                let compatible = field.value_type() == other.value_type()
                    || (field.value_type().is_numeric() && other.value_type().is_numeric());
                if !compatible {
                    return Err(CompileError::TypeMismatch {
                        field: field.name().to_string(),
                        expected: field.value_type(),
                        actual: other.value_type(),
                    });
                }
                Ok(Predicate::Compare {
                    left: field,
                    op: cmp,
                    right: Operand::Field(other),
                })
            }
            other => Err(CompileError::structural("literal or field", other.kind())),
        }
    }

    fn compile_call<T>(
        &self,
        call: &Call,
        fields: &FieldMap<T>,
    ) -> Result<Predicate<T>, CompileError> {
        let field = resolve_field(call.target(), fields)?;

        match call.op() {
            CallOp::Contains => text_match(call, field, MatchKind::Contains),
            CallOp::NotContains => Ok(text_match(call, field, MatchKind::Contains)?.not()),
            CallOp::StartsWith => text_match(call, field, MatchKind::StartsWith),
            CallOp::EndsWith => text_match(call, field, MatchKind::EndsWith),
            CallOp::In => {
                let values = self.list_values(call, &field)?;
                Ok(any_of(values.into_iter().map(|v| equals(&field, v, false))))
            }
            CallOp::NotIn => {
                let values = self.list_values(call, &field)?;
                Ok(all_of(values.into_iter().map(|v| equals(&field, v, true))))
            }
            CallOp::Between => {
                check_ordering(CallOp::Between, CompareOp::Gte, &field)?;
                let [min, max] = call.arguments() else {
                    return Err(CompileError::structural("two bounds", "call"));
                };
                let min = bound(call.op(), &field, min)?;
                let max = bound(call.op(), &field, max)?;
                let lower = Predicate::Compare {
                    left: field.clone(),
                    op: CompareOp::Gte,
                    right: Operand::Value(min),
                };
                let upper = Predicate::Compare {
                    left: field,
                    op: CompareOp::Lte,
                    right: Operand::Value(max),
                };
                Ok(lower.and(upper))
            }
            CallOp::ContainsAny => {
                require_text(call.op(), &field)?;
                self.limits.check_list(call.arguments().len())?;
                let needles = call
                    .arguments()
                    .iter()
                    .map(|arg| text_argument(call.op(), &field, arg))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(any_of(needles.into_iter().map(|needle| Predicate::Match {
                    field: field.clone(),
                    kind: MatchKind::Contains,
                    needle,
                })))
            }
        }
    }

    /// Literal arguments of `In`/`NotIn`, coerced to the target's type.
    fn list_values<T>(&self, call: &Call, field: &Field<T>) -> Result<Vec<Value>, CompileError> {
        self.limits.check_list(call.arguments().len())?;
        call.arguments()
            .iter()
            .map(|arg| match arg.ungrouped() {
                FilterNode::Literal { value } => field.coerce(value),
                other => Err(CompileError::structural("literal", other.kind())),
            })
            .collect()
    }
}

impl<T> FilterCompiler<T> for RelationalCompiler {
    type Output = Predicate<T>;

    fn compile(&self, node: &FilterNode, fields: &FieldMap<T>) -> Result<Predicate<T>, CompileError> {
        RelationalCompiler::compile(self, node, fields)
    }
}

/// The node must be a (possibly grouped) filterable field.
fn resolve_field<T>(node: &FilterNode, fields: &FieldMap<T>) -> Result<Field<T>, CompileError> {
    match node.ungrouped() {
        FilterNode::Field { name } => Ok(fields.resolve(name, Capability::Filter)?.clone()),
        other => Err(CompileError::structural("field", other.kind())),
    }
}

fn check_ordering<T>(
    op: impl Into<Operator>,
    cmp: CompareOp,
    field: &Field<T>,
) -> Result<(), CompileError> {
    if cmp.is_ordering() && field.value_type() == ValueType::Bool {
        return Err(CompileError::unsupported(op, field.value_type()));
    }
    Ok(())
}

fn require_text<T>(op: CallOp, field: &Field<T>) -> Result<(), CompileError> {
    if field.value_type() != ValueType::Text {
        return Err(CompileError::unsupported(op, field.value_type()));
    }
    Ok(())
}

/// A non-null text literal argument.
fn text_argument<T>(op: CallOp, field: &Field<T>, arg: &FilterNode) -> Result<String, CompileError> {
    match arg.ungrouped() {
        FilterNode::Literal {
            value: Value::Text(s),
        } => Ok(s.clone()),
        FilterNode::Literal { value: Value::Null } => Err(CompileError::unsupported(op, "null")),
        FilterNode::Literal { value } => Err(CompileError::TypeMismatch {
            field: field.name().to_string(),
            expected: ValueType::Text,
            actual: value.value_type().unwrap_or(ValueType::Text),
        }),
        other => Err(CompileError::structural("literal", other.kind())),
    }
}

fn text_match<T>(call: &Call, field: Field<T>, kind: MatchKind) -> Result<Predicate<T>, CompileError> {
    require_text(call.op(), &field)?;
    let [arg] = call.arguments() else {
        return Err(CompileError::structural("one argument", "call"));
    };
    let needle = text_argument(call.op(), &field, arg)?;
    Ok(Predicate::Match {
        field,
        kind,
        needle,
    })
}

/// A non-null range bound coerced to the target's type.
fn bound<T>(op: CallOp, field: &Field<T>, arg: &FilterNode) -> Result<Value, CompileError> {
    match arg.ungrouped() {
        FilterNode::Literal { value: Value::Null } => Err(CompileError::unsupported(op, "null")),
        FilterNode::Literal { value } => field.coerce(value),
        other => Err(CompileError::structural("literal", other.kind())),
    }
}

/// `field = value`, or `field != value` when `negated`; null values become null tests.
fn equals<T>(field: &Field<T>, value: Value, negated: bool) -> Predicate<T> {
    if value.is_null() {
        return Predicate::IsNull {
            field: field.clone(),
            negated,
        };
    }
    Predicate::Compare {
        left: field.clone(),
        op: if negated { CompareOp::Ne } else { CompareOp::Eq },
        right: Operand::Value(value),
    }
}

/// OR of all predicates; an empty list matches nothing.
fn any_of<T>(predicates: impl IntoIterator<Item = Predicate<T>>) -> Predicate<T> {
    predicates
        .into_iter()
        .reduce(Predicate::or)
        .unwrap_or(Predicate::Const(false))
}

/// AND of all predicates; an empty list matches everything.
fn all_of<T>(predicates: impl IntoIterator<Item = Predicate<T>>) -> Predicate<T> {
    predicates
        .into_iter()
        .reduce(Predicate::and)
        .unwrap_or(Predicate::Const(true))
}
