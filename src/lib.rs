//! Query filter compilation for the asset and user management backend.
//!
//! A [`FilterNode`] tree is compiled against a per-record-type [`FieldMap`]
//! into either a relational [`Predicate`] (rendered through sea-query) or a
//! [`FilterDocument`] for a document store. [`SortCompiler`] and
//! [`ProjectionCompiler`] handle the `sort` and `fields` query parameters.
//! All compilers are pure: they never perform I/O or keep state between
//! calls, and a `FieldMap` can be shared freely across threads.

pub mod ast;
pub mod config;
pub mod document;
pub mod error;
pub mod field_map;
pub mod operator;
pub mod predicate;
pub mod projection;
pub mod relational;
pub mod sort;
pub mod value;

pub use ast::{ArityError, Call, FilterNode};
pub use config::{CompilerConfig, CompilerLimits, ConfigError};
pub use document::{DocumentCompiler, FilterDocument};
pub use error::{Capability, CompileError};
pub use field_map::{Capabilities, Field, FieldMap, FieldMapError};
pub use operator::{BinaryOp, CallOp, CompareOp, Operator, UnaryOp};
pub use predicate::{ColumnName, Predicate, TableName};
pub use projection::{Member, OutputShape, Projection, ProjectionCompiler};
pub use relational::RelationalCompiler;
pub use sort::{Direction, SortCompiler, SortKey, SortPlan};
pub use value::{FieldType, FromValue, OrderKey, Value, ValueType};

/// A filter backend: turns a filter tree into something its store can run.
///
/// Implementations must handle every operator explicitly and fail closed
/// on anything they cannot express.
pub trait FilterCompiler<T> {
    type Output;

    fn compile(&self, node: &FilterNode, fields: &FieldMap<T>) -> Result<Self::Output, CompileError>;
}
