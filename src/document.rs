//! Document filter compiler.
//!
//! Produces MongoDB-style filter documents. Compared to the relational
//! backend this one is stricter about shape: comparisons take a bare
//! `Field` on the left and a bare `Literal` on the right, and every field
//! needs an explicit document property mapping. Text matching compiles to
//! case-insensitive regular expressions built from escaped user text only.

use crate::ast::{Call, FilterNode};
use crate::config::CompilerLimits;
use crate::error::{Capability, CompileError};
use crate::field_map::{Field, FieldMap};
use crate::operator::{BinaryOp, CallOp, CompareOp, UnaryOp};
use crate::value::{Value, ValueType};
use crate::FilterCompiler;
use serde::Serialize;
use serde_json::{json, Map, Value as Json};
use std::fmt;
use tracing::debug;

const REGEX_OPTIONS: &str = "i";

/// Compiled filter document, ready to hand to the store's driver.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FilterDocument(Json);

impl FilterDocument {
    pub fn as_json(&self) -> &Json {
        &self.0
    }

    pub fn into_json(self) -> Json {
        self.0
    }
}

impl fmt::Display for FilterDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct DocumentCompiler {
    limits: CompilerLimits,
}

impl DocumentCompiler {
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
    ) -> Result<FilterDocument, CompileError> {
        let depth = self.limits.check_depth(node)?;
        let document = self.compile_node(node, fields)?;
        debug!(depth, "compiled document filter");
        Ok(FilterDocument(document))
    }

    fn compile_node<T>(&self, node: &FilterNode, fields: &FieldMap<T>) -> Result<Json, CompileError> {
        match node {
            FilterNode::Binary { op, left, right } => match op {
                BinaryOp::And => Ok(combine(
                    "$and",
                    self.compile_node(left, fields)?,
                    self.compile_node(right, fields)?,
                )),
                BinaryOp::Or => Ok(combine(
                    "$or",
                    self.compile_node(left, fields)?,
                    self.compile_node(right, fields)?,
                )),
                BinaryOp::Equal => compile_comparison(*op, CompareOp::Eq, left, right, fields),
                BinaryOp::NotEqual => compile_comparison(*op, CompareOp::Ne, left, right, fields),
                BinaryOp::GreaterThan => {
                    compile_comparison(*op, CompareOp::Gt, left, right, fields)
                }
                BinaryOp::GreaterThanOrEqual => {
                    compile_comparison(*op, CompareOp::Gte, left, right, fields)
                }
                BinaryOp::LessThan => compile_comparison(*op, CompareOp::Lt, left, right, fields),
                BinaryOp::LessThanOrEqual => {
                    compile_comparison(*op, CompareOp::Lte, left, right, fields)
                }
            },
            FilterNode::Unary { op, operand } => match op {
                UnaryOp::Not => Ok(json!({ "$nor": [self.compile_node(operand, fields)?] })),
                // No dedicated null operator in the store; compare against null instead
                UnaryOp::IsNull => {
                    let (_, property) = bare_field(operand, fields)?;
                    Ok(field_filter(property, json!({ "$eq": null })))
                }
                UnaryOp::NotNull => {
                    let (_, property) = bare_field(operand, fields)?;
                    Ok(field_filter(property, json!({ "$ne": null })))
                }
            },
            FilterNode::Call(call) => self.compile_call(call, fields),
            FilterNode::Field { .. } => {
                let (field, property) = bare_field(node, fields)?;
                if field.value_type() != ValueType::Bool {
                    return Err(CompileError::structural("boolean expression", "field"));
                }
                Ok(field_filter(property, json!({ "$eq": true })))
            }
            FilterNode::Literal { value } => match value {
                Value::Bool(b) => Ok(json!({ "$expr": b })),
                _ => Err(CompileError::structural("boolean expression", "literal")),
            },
            FilterNode::Group { inner } => self.compile_node(inner, fields),
        }
    }

    fn compile_call<T>(&self, call: &Call, fields: &FieldMap<T>) -> Result<Json, CompileError> {
        let (field, property) = bare_field(call.target(), fields)?;

        match call.op() {
            CallOp::Contains => {
                let needle = single_text(call, field)?;
                Ok(field_filter(property, regex(&regex::escape(&needle))))
            }
            CallOp::NotContains => {
                let needle = single_text(call, field)?;
                Ok(field_filter(
                    property,
                    json!({ "$not": regex(&regex::escape(&needle)) }),
                ))
            }
            CallOp::StartsWith => {
                let needle = single_text(call, field)?;
                Ok(field_filter(
                    property,
                    regex(&format!("^{}", regex::escape(&needle))),
                ))
            }
            CallOp::EndsWith => {
                let needle = single_text(call, field)?;
                Ok(field_filter(
                    property,
                    regex(&format!("{}$", regex::escape(&needle))),
                ))
            }
            CallOp::In => {
                let values = self.list_values(call, field)?;
                Ok(field_filter(property, json!({ "$in": values })))
            }
            CallOp::NotIn => {
                let values = self.list_values(call, field)?;
                Ok(field_filter(property, json!({ "$nin": values })))
            }
            CallOp::Between => {
                if field.value_type() == ValueType::Bool {
                    return Err(CompileError::unsupported(call.op(), field.value_type()));
                }
                let [min, max] = call.arguments() else {
                    return Err(CompileError::structural("two bounds", "call"));
                };
                let min = bound(call.op(), field, min)?;
                let max = bound(call.op(), field, max)?;
                Ok(json!({
                    "$and": [
                        field_filter(property, json!({ "$gte": min })),
                        field_filter(property, json!({ "$lte": max })),
                    ]
                }))
            }
            CallOp::ContainsAny => {
                require_text(call.op(), field)?;
                self.limits.check_list(call.arguments().len())?;
                let clauses = call
                    .arguments()
                    .iter()
                    .map(|arg| {
                        let needle = text_literal(call.op(), field, arg)?;
                        Ok(field_filter(property, regex(&regex::escape(&needle))))
                    })
                    .collect::<Result<Vec<_>, CompileError>>()?;
                if clauses.is_empty() {
                    return Ok(match_nothing());
                }
                Ok(json!({ "$or": clauses }))
            }
        }
    }

    fn list_values<T>(&self, call: &Call, field: &Field<T>) -> Result<Vec<Json>, CompileError> {
        self.limits.check_list(call.arguments().len())?;
        call.arguments()
            .iter()
            .map(|arg| Ok(field.coerce(literal(arg)?)?.to_json()))
            .collect()
    }
}

impl<T> FilterCompiler<T> for DocumentCompiler {
    type Output = FilterDocument;

    fn compile(&self, node: &FilterNode, fields: &FieldMap<T>) -> Result<FilterDocument, CompileError> {
        DocumentCompiler::compile(self, node, fields)
    }
}

fn compile_comparison<T>(
    op: BinaryOp,
    cmp: CompareOp,
    left: &FilterNode,
    right: &FilterNode,
    fields: &FieldMap<T>,
) -> Result<Json, CompileError> {
    let (field, property) = bare_field(left, fields)?;
    let value = literal(right)?;

    if value.is_null() {
        if !field.is_nullable() {
            return Err(CompileError::NullNotAllowed(field.name().to_string()));
        }
        return match cmp {
            CompareOp::Eq => Ok(field_filter(property, json!({ "$eq": null }))),
            CompareOp::Ne => Ok(field_filter(property, json!({ "$ne": null }))),
            _ => Err(CompileError::unsupported(op, "null")),
        };
    }
    if cmp.is_ordering() && field.value_type() == ValueType::Bool {
        return Err(CompileError::unsupported(op, field.value_type()));
    }

    let value = field.coerce(value)?;
    let mut condition = Map::new();
    condition.insert(query_operator(cmp).to_string(), value.to_json());
    Ok(field_filter(property, Json::Object(condition)))
}

fn query_operator(cmp: CompareOp) -> &'static str {
    match cmp {
        CompareOp::Eq => "$eq",
        CompareOp::Ne => "$ne",
        CompareOp::Gt => "$gt",
        CompareOp::Gte => "$gte",
        CompareOp::Lt => "$lt",
        CompareOp::Lte => "$lte",
    }
}

/// The node must be exactly a `Field` with a document property mapping.
fn bare_field<'a, T>(
    node: &FilterNode,
    fields: &'a FieldMap<T>,
) -> Result<(&'a Field<T>, &'a str), CompileError> {
    match node {
        FilterNode::Field { name } => {
            let field = fields.resolve(name, Capability::Filter)?;
            Ok((field, field.require_property()?))
        }
        other => Err(CompileError::structural("field", other.kind())),
    }
}

/// The node must be exactly a `Literal`.
fn literal(node: &FilterNode) -> Result<&Value, CompileError> {
    match node {
        FilterNode::Literal { value } => Ok(value),
        other => Err(CompileError::structural("literal", other.kind())),
    }
}

fn require_text<T>(op: CallOp, field: &Field<T>) -> Result<(), CompileError> {
    if field.value_type() != ValueType::Text {
        return Err(CompileError::unsupported(op, field.value_type()));
    }
    Ok(())
}

fn text_literal<T>(op: CallOp, field: &Field<T>, arg: &FilterNode) -> Result<String, CompileError> {
    match literal(arg)? {
        Value::Text(s) => Ok(s.clone()),
        Value::Null => Err(CompileError::unsupported(op, "null")),
        other => Err(CompileError::TypeMismatch {
            field: field.name().to_string(),
            expected: ValueType::Text,
            actual: other.value_type().unwrap_or(ValueType::Text),
        }),
    }
}

fn single_text<T>(call: &Call, field: &Field<T>) -> Result<String, CompileError> {
    require_text(call.op(), field)?;
    let [arg] = call.arguments() else {
        return Err(CompileError::structural("one argument", "call"));
    };
    text_literal(call.op(), field, arg)
}

fn bound<T>(op: CallOp, field: &Field<T>, arg: &FilterNode) -> Result<Json, CompileError> {
    let value = literal(arg)?;
    if value.is_null() {
        return Err(CompileError::unsupported(op, "null"));
    }
    Ok(field.coerce(value)?.to_json())
}

fn field_filter(property: &str, condition: Json) -> Json {
    let mut map = Map::new();
    map.insert(property.to_string(), condition);
    Json::Object(map)
}

/// `pattern` must already be escaped.
fn regex(pattern: &str) -> Json {
    json!({ "$regex": pattern, "$options": REGEX_OPTIONS })
}

fn match_nothing() -> Json {
    json!({ "$expr": false })
}

/// Joins two documents under `op`, splicing in children that already use it.
fn combine(op: &str, left: Json, right: Json) -> Json {
    let mut clauses = Vec::new();
    for doc in [left, right] {
        match doc {
            Json::Object(mut map) if map.len() == 1 && map.get(op).is_some_and(Json::is_array) => {
                if let Some(Json::Array(items)) = map.remove(op) {
                    clauses.extend(items);
                }
            }
            other => clauses.push(other),
        }
    }
    field_filter(op, Json::Array(clauses))
}
