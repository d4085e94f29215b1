//! Multi-key sort compiler for the compact `sort` query parameter.
//!
//! The parameter is a comma-separated token list such as
//! `-createdAt,name`; a leading `-` sorts that key descending. Keys apply in
//! order, each one breaking ties left by the keys before it.

use crate::config::CompilerLimits;
use crate::error::{Capability, CompileError};
use crate::field_map::{Field, FieldMap};
use crate::predicate::ColumnName;
use crate::value::OrderKey;
use sea_query::{NullOrdering, Order, SelectStatement};
use serde_json::{Map, Value as Json};
use std::cmp::Ordering;
use std::fmt;
use tracing::{debug, warn};

/// Characters that only make sense in a filter expression.
const FILTER_SYNTAX: &[char] = &[' ', '(', '@'];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

pub struct SortKey<T> {
    field: Field<T>,
    direction: Direction,
}

impl<T> SortKey<T> {
    pub fn field(&self) -> &Field<T> {
        &self.field
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    fn compare(&self, a: &T, b: &T) -> Ordering {
        let ordering = OrderKey(self.field.read(a)).cmp(&OrderKey(self.field.read(b)));
        match self.direction {
            Direction::Ascending => ordering,
            Direction::Descending => ordering.reverse(),
        }
    }
}

impl<T> fmt::Debug for SortKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = match self.direction {
            Direction::Ascending => "",
            Direction::Descending => "-",
        };
        write!(f, "{}{}", sign, self.field.name())
    }
}

/// Ordered list of sort keys.
pub struct SortPlan<T> {
    keys: Vec<SortKey<T>>,
}

impl<T> SortPlan<T> {
    pub fn keys(&self) -> &[SortKey<T>] {
        &self.keys
    }

    /// Lexicographic comparison over all keys.
    pub fn compare(&self, a: &T, b: &T) -> Ordering {
        self.keys
            .iter()
            .map(|key| key.compare(a, b))
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
    }

    /// Stable in-place sort.
    pub fn sort(&self, records: &mut [T]) {
        records.sort_by(|a, b| self.compare(a, b));
    }

    /// Appends `ORDER BY` clauses. Nulls come first ascending and last
    /// descending, the same as the in-process order.
    pub fn apply_to<'a>(&self, select: &'a mut SelectStatement) -> &'a mut SelectStatement {
        for key in &self.keys {
            let column = ColumnName(key.field.column_name().to_string());
            match key.direction {
                Direction::Ascending => {
                    select.order_by_with_nulls(column, Order::Asc, NullOrdering::First)
                }
                Direction::Descending => {
                    select.order_by_with_nulls(column, Order::Desc, NullOrdering::Last)
                }
            };
        }
        select
    }

    /// Ordered `{property: 1 | -1}` sort document.
    pub fn to_document(&self) -> Result<Json, CompileError> {
        let mut document = Map::new();
        for key in &self.keys {
            let direction = match key.direction {
                Direction::Ascending => 1,
                Direction::Descending => -1,
            };
            document.insert(key.field.require_property()?.to_string(), Json::from(direction));
        }
        Ok(Json::Object(document))
    }
}

impl<T> fmt::Debug for SortPlan<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.keys.iter()).finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SortCompiler {
    limits: CompilerLimits,
}

impl SortCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(limits: CompilerLimits) -> Self {
        Self { limits }
    }

    pub fn compile<T>(&self, spec: &str, fields: &FieldMap<T>) -> Result<SortPlan<T>, CompileError> {
        if spec.trim().is_empty() {
            return Err(CompileError::EmptySortSpec);
        }

        let tokens: Vec<&str> = spec.split(',').map(str::trim).collect();
        self.limits.check_sort_keys(tokens.len())?;

        let mut keys = Vec::with_capacity(tokens.len());
        for token in tokens {
            if token.contains(FILTER_SYNTAX) {
                warn!(token, "rejected filter syntax in sort parameter");
                return Err(CompileError::SortSyntax(token.to_string()));
            }
            let (name, direction) = match token.strip_prefix('-') {
                Some(rest) => (rest, Direction::Descending),
                None => (token, Direction::Ascending),
            };
            if name.is_empty() {
                return Err(CompileError::EmptySortToken);
            }
            let field = fields.resolve(name, Capability::Sort)?.clone();
            keys.push(SortKey { field, direction });
        }

        debug!(keys = keys.len(), "compiled sort specification");
        Ok(SortPlan { keys })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field_map::Capabilities;
    use crate::predicate::TableName;
    use sea_query::{Asterisk, PostgresQueryBuilder, Query};

    #[derive(Debug, Clone, PartialEq)]
    struct Row {
        created_at: i64,
        name: String,
        site: Option<String>,
    }

    fn row(created_at: i64, name: &str, site: Option<&str>) -> Row {
        Row {
            created_at,
            name: name.into(),
            site: site.map(str::to_string),
        }
    }

    fn row_fields() -> FieldMap<Row> {
        FieldMap::new()
            .with(
                Field::new("createdAt", |r: &Row| r.created_at)
                    .column("created_at")
                    .property("created"),
            )
            .unwrap()
            .with(Field::new("name", |r: &Row| r.name.clone()).property("name"))
            .unwrap()
            .with(Field::new("site", |r: &Row| r.site.clone()))
            .unwrap()
            .with(
                Field::new("notes", |r: &Row| r.name.clone())
                    .capabilities(Capabilities::FILTER | Capabilities::SELECT),
            )
            .unwrap()
    }

    #[test]
    fn test_multi_key_order() {
        let plan = SortCompiler::new().compile("-createdAt,name", &row_fields()).unwrap();
        let mut rows = vec![row(1, "b", None), row(2, "a", None), row(1, "a", None)];
        plan.sort(&mut rows);
        assert_eq!(
            rows,
            vec![row(2, "a", None), row(1, "a", None), row(1, "b", None)]
        );
    }

    #[test]
    fn test_nulls_sort_first_ascending() {
        let plan = SortCompiler::new().compile("site", &row_fields()).unwrap();
        let mut rows = vec![row(1, "a", Some("b")), row(2, "b", None), row(3, "c", Some("a"))];
        plan.sort(&mut rows);
        let order: Vec<i64> = rows.iter().map(|r| r.created_at).collect();
        assert_eq!(order, vec![2, 3, 1]);

        let plan = SortCompiler::new().compile("-site", &row_fields()).unwrap();
        plan.sort(&mut rows);
        let order: Vec<i64> = rows.iter().map(|r| r.created_at).collect();
        assert_eq!(order, vec![1, 3, 2]);
    }

    #[test]
    fn test_tokens_are_trimmed_and_case_insensitive() {
        let plan = SortCompiler::new().compile(" -CREATEDAT , Name ", &row_fields()).unwrap();
        assert_eq!(format!("{:?}", plan), "[-createdAt, name]");
        assert_eq!(plan.keys()[0].direction(), Direction::Descending);
        assert_eq!(plan.keys()[1].field().name(), "name");
    }

    #[test]
    fn test_filter_syntax_is_rejected() {
        for spec in ["name eq 'x'", "contains(name)", "@createdAt"] {
            let err = SortCompiler::new().compile(spec, &row_fields()).unwrap_err();
            assert!(matches!(err, CompileError::SortSyntax(_)), "{spec}");
            assert!(err.to_string().contains("filter parameter"));
        }
    }

    #[test]
    fn test_empty_tokens_rejected() {
        let compiler = SortCompiler::new();
        assert_eq!(
            compiler.compile("name,,createdAt", &row_fields()).unwrap_err(),
            CompileError::EmptySortToken
        );
        assert_eq!(
            compiler.compile("-", &row_fields()).unwrap_err(),
            CompileError::EmptySortToken
        );
        assert_eq!(
            compiler.compile("  ", &row_fields()).unwrap_err(),
            CompileError::EmptySortSpec
        );
    }

    #[test]
    fn test_field_must_be_sortable() {
        let compiler = SortCompiler::new();
        assert_eq!(
            compiler.compile("notes", &row_fields()).unwrap_err(),
            CompileError::MissingCapability {
                field: "notes".into(),
                capability: Capability::Sort,
            }
        );
        assert_eq!(
            compiler.compile("-doesNotExist", &row_fields()).unwrap_err(),
            CompileError::FieldNotFound("doesNotExist".into())
        );
    }

    #[test]
    fn test_key_limit() {
        let compiler = SortCompiler::with_limits(CompilerLimits {
            max_sort_keys: 1,
            ..Default::default()
        });
        assert!(matches!(
            compiler.compile("name,createdAt", &row_fields()),
            Err(CompileError::LimitExceeded { .. })
        ));
    }

    #[test]
    fn test_order_by_clause() {
        let plan = SortCompiler::new().compile("-createdAt,name", &row_fields()).unwrap();
        let mut select = Query::select();
        select.column(Asterisk).from(TableName("rows".into()));
        plan.apply_to(&mut select);
        let sql = select.to_string(PostgresQueryBuilder);
        assert!(sql.ends_with(r#"ORDER BY "created_at" DESC NULLS LAST, "name" ASC NULLS FIRST"#));
    }

    #[test]
    fn test_sort_document_keeps_key_order() {
        let plan = SortCompiler::new().compile("name,-createdAt", &row_fields()).unwrap();
        let doc = plan.to_document().unwrap();
        assert_eq!(doc.to_string(), r#"{"name":1,"created":-1}"#);

        let unmapped = SortCompiler::new().compile("site", &row_fields()).unwrap();
        assert!(matches!(
            unmapped.to_document(),
            Err(CompileError::UnmappedField { .. })
        ));
    }
}
