use crate::operator::Operator;
use crate::value::ValueType;
use std::fmt;
use thiserror::Error;

/// Capability a field must carry to take part in an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Filter,
    Sort,
    Select,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Capability::Filter => "filterable",
            Capability::Sort => "sortable",
            Capability::Select => "selectable",
        })
    }
}

/// Every way a filter, sort or projection can fail to compile. All of
/// these are caller errors and surface before any query runs.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error("field `{0}` not found")]
    FieldNotFound(String),

    #[error("field `{field}` is not {capability}")]
    MissingCapability { field: String, capability: Capability },

    #[error("field `{field}` has no {backend} mapping")]
    UnmappedField { field: String, backend: &'static str },

    #[error("operator `{operator}` is not supported for type `{ty}`")]
    UnsupportedOperator { operator: Operator, ty: String },

    #[error("field `{field}` is {expected}, cannot use a {actual} value")]
    TypeMismatch {
        field: String,
        expected: ValueType,
        actual: ValueType,
    },

    #[error("field `{0}` is not nullable and cannot be compared with null")]
    NullNotAllowed(String),

    #[error("expected {expected}, found {actual}")]
    Structural {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("sort token `{0}` looks like a filter expression; pass conditions through the filter parameter, not the sort parameter")]
    SortSyntax(String),

    #[error("sort specification contains an empty token")]
    EmptySortToken,

    #[error("sort specification is empty")]
    EmptySortSpec,

    #[error("projection requires an explicit, non-empty field list")]
    EmptyProjection,

    #[error("projection field list contains an empty name")]
    EmptyProjectionField,

    #[error("fields cannot be projected: {}", .0.join(", "))]
    UnprojectableFields(Vec<String>),

    #[error("value of field `{field}` does not fit output member `{member}` without loss")]
    LossyConversion { field: String, member: String },

    #[error("{what} exceeds the configured limit of {limit}")]
    LimitExceeded { what: &'static str, limit: usize },
}

impl CompileError {
    pub(crate) fn unsupported(operator: impl Into<Operator>, ty: impl fmt::Display) -> Self {
        CompileError::UnsupportedOperator {
            operator: operator.into(),
            ty: ty.to_string(),
        }
    }

    pub(crate) fn structural(expected: &'static str, actual: &'static str) -> Self {
        CompileError::Structural { expected, actual }
    }
}
