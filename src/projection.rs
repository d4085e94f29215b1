//! Field projection onto a statically declared output shape.
//!
//! The output type `O` describes its members once, in an [`OutputShape`]
//! table of typed setters. Compiling a requested field list checks every
//! name against both the [`FieldMap`] and the shape up front; there is no
//! "select everything" fallback.

use crate::error::{Capability, CompileError};
use crate::field_map::{Field, FieldMap, FieldMapError};
use crate::predicate::ColumnName;
use crate::value::{FieldType, FromValue, Value, ValueType};
use sea_query::SelectStatement;
use serde_json::{Map, Value as Json};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Writes a value into an output record; returns `false` if it does not fit.
type Setter<O> = Arc<dyn Fn(&mut O, Value) -> bool + Send + Sync>;

/// One writable member of an output shape.
pub struct Member<O> {
    name: String,
    value_type: ValueType,
    nullable: bool,
    setter: Setter<O>,
}

impl<O: 'static> Member<O> {
    pub fn new<V, F>(name: impl Into<String>, setter: F) -> Self
    where
        V: FieldType + FromValue + 'static,
        F: Fn(&mut O, V) + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            value_type: V::VALUE_TYPE,
            nullable: V::NULLABLE,
            setter: Arc::new(move |out: &mut O, value: Value| match V::from_value(value) {
                Some(v) => {
                    setter(out, v);
                    true
                }
                None => false,
            }),
        }
    }
}

impl<O> Member<O> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    /// Whether every value of `field` can be stored here.
    fn accepts<T>(&self, field: &Field<T>) -> bool {
        field.value_type().widens_to(self.value_type) && (self.nullable || !field.is_nullable())
    }
}

impl<O> Clone for Member<O> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            value_type: self.value_type,
            nullable: self.nullable,
            setter: Arc::clone(&self.setter),
        }
    }
}

impl<O> fmt::Debug for Member<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Member")
            .field("name", &self.name)
            .field("value_type", &self.value_type)
            .field("nullable", &self.nullable)
            .finish_non_exhaustive()
    }
}

/// Member table for output type `O`, matched case-insensitively.
pub struct OutputShape<O> {
    members: Vec<Member<O>>,
    index: HashMap<String, usize>,
}

impl<O> OutputShape<O> {
    pub fn new() -> Self {
        Self {
            members: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn register(&mut self, member: Member<O>) -> Result<&mut Self, FieldMapError> {
        if member.name.trim().is_empty() {
            return Err(FieldMapError::EmptyName);
        }
        let key = member.name.to_lowercase();
        if self.index.contains_key(&key) {
            return Err(FieldMapError::Duplicate(member.name));
        }
        self.index.insert(key, self.members.len());
        self.members.push(member);
        Ok(self)
    }

    pub fn with(mut self, member: Member<O>) -> Result<Self, FieldMapError> {
        self.register(member)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&Member<O>> {
        self.index
            .get(&name.to_lowercase())
            .map(|&idx| &self.members[idx])
    }
}

impl<O> Default for OutputShape<O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O> fmt::Debug for OutputShape<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.members.iter()).finish()
    }
}

struct Binding<T, O> {
    field: Field<T>,
    member: Member<O>,
}

/// Compiled field-copy initializer from `T` to `O`.
pub struct Projection<T, O> {
    bindings: Vec<Binding<T, O>>,
}

impl<T, O> Projection<T, O> {
    /// Projected field names in request order.
    pub fn field_names(&self) -> Vec<&str> {
        self.bindings.iter().map(|b| b.field.name()).collect()
    }

    /// Builds an `O` holding only the projected members; the rest keep
    /// their default values.
    pub fn project(&self, record: &T) -> Result<O, CompileError>
    where
        O: Default,
    {
        let mut out = O::default();
        for binding in &self.bindings {
            let lossy = || CompileError::LossyConversion {
                field: binding.field.name().to_string(),
                member: binding.member.name.clone(),
            };
            let value = binding
                .field
                .read(record)
                .coerce_to(binding.member.value_type)
                .ok_or_else(lossy)?;
            if !(binding.member.setter)(&mut out, value) {
                return Err(lossy());
            }
        }
        Ok(out)
    }

    pub fn project_all<'a>(&self, records: impl IntoIterator<Item = &'a T>) -> Result<Vec<O>, CompileError>
    where
        T: 'a,
        O: Default,
    {
        records.into_iter().map(|r| self.project(r)).collect()
    }

    /// Replaces the statement's column list with the projected columns.
    pub fn apply_to<'a>(&self, select: &'a mut SelectStatement) -> &'a mut SelectStatement {
        select.clear_selects();
        select.columns(
            self.bindings
                .iter()
                .map(|b| ColumnName(b.field.column_name().to_string())),
        )
    }

    /// `{property: 1, ...}` projection document.
    pub fn to_document(&self) -> Result<Json, CompileError> {
        let mut document = Map::new();
        for binding in &self.bindings {
            document.insert(binding.field.require_property()?.to_string(), Json::from(1));
        }
        Ok(Json::Object(document))
    }
}

impl<T, O> fmt::Debug for Projection<T, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Projection").field(&self.field_names()).finish()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProjectionCompiler;

impl ProjectionCompiler {
    pub fn new() -> Self {
        Self
    }

    /// Compiles an explicit field list. Every name must be selectable in
    /// `fields` and have a compatible member in `shape`; all offending names
    /// are reported together.
    pub fn compile<T, O, S>(
        &self,
        requested: &[S],
        fields: &FieldMap<T>,
        shape: &OutputShape<O>,
    ) -> Result<Projection<T, O>, CompileError>
    where
        S: AsRef<str>,
    {
        if requested.is_empty() {
            return Err(CompileError::EmptyProjection);
        }

        let mut seen = HashSet::new();
        let mut rejected = Vec::new();
        let mut bindings = Vec::with_capacity(requested.len());
        for name in requested {
            let name = name.as_ref().trim();
            if name.is_empty() {
                return Err(CompileError::EmptyProjectionField);
            }
            if !seen.insert(name.to_lowercase()) {
                continue;
            }
            let field = fields
                .try_get(name)
                .filter(|f| f.caps().allows(Capability::Select));
            let member = shape.get(name);
            match (field, member) {
                (Some(field), Some(member)) if member.accepts(field) => bindings.push(Binding {
                    field: field.clone(),
                    member: member.clone(),
                }),
                _ => rejected.push(name.to_string()),
            }
        }

        if !rejected.is_empty() {
            return Err(CompileError::UnprojectableFields(rejected));
        }
        debug!(fields = bindings.len(), "compiled projection");
        Ok(Projection { bindings })
    }

    /// Compiles the comma-separated `fields` query parameter. An absent or
    /// blank parameter is an error, never "select all".
    pub fn compile_param<T, O>(
        &self,
        param: Option<&str>,
        fields: &FieldMap<T>,
        shape: &OutputShape<O>,
    ) -> Result<Projection<T, O>, CompileError> {
        let requested: Vec<&str> = match param {
            Some(p) if !p.trim().is_empty() => p.split(',').collect(),
            _ => return Err(CompileError::EmptyProjection),
        };
        self.compile(&requested, fields, shape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field_map::Capabilities;
    use crate::predicate::TableName;
    use sea_query::{Asterisk, PostgresQueryBuilder, Query};

    struct User {
        login: String,
        email: Option<String>,
        quota: i64,
        password_hash: String,
    }

    #[derive(Debug, Default, PartialEq)]
    struct UserSummary {
        login: String,
        email: Option<String>,
        quota: Option<f64>,
    }

    #[derive(Debug, Default, PartialEq)]
    struct NarrowQuota {
        quota: i32,
    }

    fn user() -> User {
        User {
            login: "mkoch".into(),
            email: Some("m@example.com".into()),
            quota: 250,
            password_hash: "x".into(),
        }
    }

    fn user_fields() -> FieldMap<User> {
        FieldMap::new()
            .with(Field::new("login", |u: &User| u.login.clone()).stored_as("login"))
            .unwrap()
            .with(Field::new("email", |u: &User| u.email.clone()).column("email_address"))
            .unwrap()
            .with(Field::new("quota", |u: &User| u.quota).stored_as("quota"))
            .unwrap()
            .with(
                Field::new("passwordHash", |u: &User| u.password_hash.clone())
                    .capabilities(Capabilities::FILTER),
            )
            .unwrap()
    }

    fn summary_shape() -> OutputShape<UserSummary> {
        OutputShape::new()
            .with(Member::new("login", |s: &mut UserSummary, v: String| s.login = v))
            .unwrap()
            .with(Member::new("email", |s: &mut UserSummary, v: Option<String>| s.email = v))
            .unwrap()
            .with(Member::new("quota", |s: &mut UserSummary, v: Option<f64>| s.quota = v))
            .unwrap()
    }

    #[test]
    fn test_projection_copies_only_requested_members() {
        let projection = ProjectionCompiler::new()
            .compile(&["login"], &user_fields(), &summary_shape())
            .unwrap();
        let out = projection.project(&user()).unwrap();
        assert_eq!(
            out,
            UserSummary {
                login: "mkoch".into(),
                email: None,
                quota: None,
            }
        );
    }

    #[test]
    fn test_int_widens_into_float_member() {
        let projection = ProjectionCompiler::new()
            .compile(&["quota", "email"], &user_fields(), &summary_shape())
            .unwrap();
        let out = projection.project(&user()).unwrap();
        assert_eq!(out.quota, Some(250.0));
        assert_eq!(out.email.as_deref(), Some("m@example.com"));
    }

    #[test]
    fn test_empty_list_is_an_error() {
        let empty: [&str; 0] = [];
        assert_eq!(
            ProjectionCompiler::new()
                .compile(&empty, &user_fields(), &summary_shape())
                .unwrap_err(),
            CompileError::EmptyProjection
        );
        assert_eq!(
            ProjectionCompiler::new()
                .compile_param(None, &user_fields(), &summary_shape())
                .unwrap_err(),
            CompileError::EmptyProjection
        );
        assert_eq!(
            ProjectionCompiler::new()
                .compile_param(Some(" "), &user_fields(), &summary_shape())
                .unwrap_err(),
            CompileError::EmptyProjection
        );
        assert_eq!(
            ProjectionCompiler::new()
                .compile(&["login", " ", "email"], &user_fields(), &summary_shape())
                .unwrap_err(),
            CompileError::EmptyProjectionField
        );
    }

    #[test]
    fn test_all_bad_fields_are_reported() {
        let err = ProjectionCompiler::new()
            .compile(
                &["login", "passwordHash", "nope"],
                &user_fields(),
                &summary_shape(),
            )
            .unwrap_err();
        assert_eq!(
            err,
            CompileError::UnprojectableFields(vec!["passwordHash".into(), "nope".into()])
        );
    }

    #[test]
    fn test_nullable_source_needs_nullable_member() {
        let shape = OutputShape::new()
            .with(Member::new("email", |s: &mut UserSummary, v: String| s.login = v))
            .unwrap();
        let err = ProjectionCompiler::new()
            .compile(&["email"], &user_fields(), &shape)
            .unwrap_err();
        assert_eq!(err, CompileError::UnprojectableFields(vec!["email".into()]));
    }

    #[test]
    fn test_narrowing_fails_closed() {
        let shape = OutputShape::new()
            .with(Member::new("quota", |s: &mut NarrowQuota, v: i32| s.quota = v))
            .unwrap();
        let projection = ProjectionCompiler::new()
            .compile(&["quota"], &user_fields(), &shape)
            .unwrap();
        assert_eq!(projection.project(&user()).unwrap(), NarrowQuota { quota: 250 });

        let big = User {
            quota: i64::from(i32::MAX) + 1,
            ..user()
        };
        assert_eq!(
            projection.project(&big).unwrap_err(),
            CompileError::LossyConversion {
                field: "quota".into(),
                member: "quota".into(),
            }
        );
    }

    #[test]
    fn test_param_parsing_and_dedup() {
        let projection = ProjectionCompiler::new()
            .compile_param(Some("login, LOGIN ,quota"), &user_fields(), &summary_shape())
            .unwrap();
        assert_eq!(projection.field_names(), vec!["login", "quota"]);
    }

    #[test]
    fn test_select_columns_and_document() {
        let projection = ProjectionCompiler::new()
            .compile(&["login", "email"], &user_fields(), &summary_shape())
            .unwrap();
        let mut select = Query::select();
        select.column(Asterisk).from(TableName("users".into()));
        projection.apply_to(&mut select);
        assert_eq!(
            select.to_string(PostgresQueryBuilder),
            r#"SELECT "login", "email_address" FROM "users""#
        );

        assert!(matches!(
            projection.to_document(),
            Err(CompileError::UnmappedField { .. })
        ));
        let mapped = ProjectionCompiler::new()
            .compile(&["login", "quota"], &user_fields(), &summary_shape())
            .unwrap();
        assert_eq!(mapped.to_document().unwrap().to_string(), r#"{"login":1,"quota":1}"#);
    }
}
