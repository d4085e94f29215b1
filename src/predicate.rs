//! Relational predicate produced by [`crate::relational::RelationalCompiler`].
//!
//! A [`Predicate`] is a lowered boolean tree over resolved fields. It renders
//! to a sea-query [`SimpleExpr`] for push-down to a SQL engine and can also
//! be evaluated directly against a record. Both paths use two-valued logic:
//! comparisons over nullable columns carry explicit `IS [NOT] NULL` guards so
//! that `NOT` never meets an unknown.

use crate::field_map::Field;
use crate::operator::CompareOp;
use crate::value::Value;
use sea_query::{Expr, Func, Iden, LikeExpr, SimpleExpr};
use std::cmp::Ordering;
use std::fmt;

/// Table identifier for sea-query
#[derive(Debug, Clone)]
pub struct TableName(pub String);

impl Iden for TableName {
    fn unquoted(&self, s: &mut dyn std::fmt::Write) {
        write!(s, "{}", self.0).unwrap();
    }
}

/// Column identifier wrapper
#[derive(Debug, Clone)]
pub struct ColumnName(pub String);

impl Iden for ColumnName {
    fn unquoted(&self, s: &mut dyn std::fmt::Write) {
        write!(s, "{}", self.0).unwrap();
    }
}

/// Escape character declared on every generated LIKE.
pub const LIKE_ESCAPE: char = '\\';

/// Substring test flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Contains,
    StartsWith,
    EndsWith,
}

/// Right-hand side of a comparison.
pub enum Operand<T> {
    /// Non-null literal already coerced to the left field's type
    Value(Value),
    Field(Field<T>),
}

/// Compiled boolean tree over records of type `T`.
pub enum Predicate<T> {
    Const(bool),
    Compare {
        left: Field<T>,
        op: CompareOp,
        right: Operand<T>,
    },
    IsNull {
        field: Field<T>,
        negated: bool,
    },
    /// Case-insensitive substring test; false on null
    Match {
        field: Field<T>,
        kind: MatchKind,
        needle: String,
    },
    And(Box<Predicate<T>>, Box<Predicate<T>>),
    Or(Box<Predicate<T>>, Box<Predicate<T>>),
    Not(Box<Predicate<T>>),
}

impl<T> Clone for Operand<T> {
    fn clone(&self) -> Self {
        match self {
            Operand::Value(v) => Operand::Value(v.clone()),
            Operand::Field(f) => Operand::Field(f.clone()),
        }
    }
}

impl<T> fmt::Debug for Operand<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Value(v) => write!(f, "{}", v),
            Operand::Field(field) => write!(f, "{}", field.name()),
        }
    }
}

impl<T> Clone for Predicate<T> {
    fn clone(&self) -> Self {
        match self {
            Predicate::Const(b) => Predicate::Const(*b),
            Predicate::Compare { left, op, right } => Predicate::Compare {
                left: left.clone(),
                op: *op,
                right: right.clone(),
            },
            Predicate::IsNull { field, negated } => Predicate::IsNull {
                field: field.clone(),
                negated: *negated,
            },
            Predicate::Match {
                field,
                kind,
                needle,
            } => Predicate::Match {
                field: field.clone(),
                kind: *kind,
                needle: needle.clone(),
            },
            Predicate::And(l, r) => Predicate::And(l.clone(), r.clone()),
            Predicate::Or(l, r) => Predicate::Or(l.clone(), r.clone()),
            Predicate::Not(inner) => Predicate::Not(inner.clone()),
        }
    }
}

/// Prints the predicate in infix form, e.g. `(cost >= 10 AND NOT name IS NULL)`.
impl<T> fmt::Debug for Predicate<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Const(b) => write!(f, "{}", b),
            Predicate::Compare { left, op, right } => {
                write!(f, "{} {} {:?}", left.name(), op.symbol(), right)
            }
            Predicate::IsNull { field, negated } => {
                let test = if *negated { "IS NOT NULL" } else { "IS NULL" };
                write!(f, "{} {}", field.name(), test)
            }
            Predicate::Match {
                field,
                kind,
                needle,
            } => write!(f, "{}.{:?}({:?})", field.name(), kind, needle),
            Predicate::And(l, r) => write!(f, "({:?} AND {:?})", l, r),
            Predicate::Or(l, r) => write!(f, "({:?} OR {:?})", l, r),
            Predicate::Not(inner) => write!(f, "NOT {:?}", inner),
        }
    }
}

impl<T> Predicate<T> {
    pub fn and(self, other: Predicate<T>) -> Self {
        Predicate::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Predicate<T>) -> Self {
        Predicate::Or(Box::new(self), Box::new(other))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Predicate::Not(Box::new(self))
    }

    /// Evaluates the predicate in-process.
    pub fn matches(&self, record: &T) -> bool {
        match self {
            Predicate::Const(b) => *b,
            Predicate::Compare { left, op, right } => {
                let lhs = left.read(record);
                let rhs = match right {
                    Operand::Value(v) => v.clone(),
                    Operand::Field(f) => f.read(record),
                };
                compare_values(&lhs, *op, &rhs)
            }
            Predicate::IsNull { field, negated } => field.read(record).is_null() != *negated,
            Predicate::Match {
                field,
                kind,
                needle,
            } => match field.read(record) {
                Value::Text(text) => {
                    let haystack = fold_case(&text);
                    let needle = fold_case(needle);
                    match kind {
                        MatchKind::Contains => haystack.contains(&needle),
                        MatchKind::StartsWith => haystack.starts_with(&needle),
                        MatchKind::EndsWith => haystack.ends_with(&needle),
                    }
                }
                _ => false,
            },
            Predicate::And(l, r) => l.matches(record) && r.matches(record),
            Predicate::Or(l, r) => l.matches(record) || r.matches(record),
            Predicate::Not(inner) => !inner.matches(record),
        }
    }

    /// Keeps the records the predicate accepts.
    pub fn filter<'a>(&'a self, records: impl IntoIterator<Item = &'a T>) -> Vec<&'a T>
    where
        T: 'a,
    {
        records.into_iter().filter(|r| self.matches(r)).collect()
    }

    /// Renders the predicate as a sea-query condition.
    pub fn to_condition(&self) -> SimpleExpr {
        match self {
            Predicate::Const(b) => Expr::val(*b).into(),
            Predicate::Compare { left, op, right } => render_compare(left, *op, right),
            Predicate::IsNull { field, negated } => {
                let col = Expr::col(column(field));
                if *negated {
                    col.is_not_null()
                } else {
                    col.is_null()
                }
            }
            Predicate::Match {
                field,
                kind,
                needle,
            } => {
                let escaped = escape_like(&fold_case(needle));
                let pattern = match kind {
                    MatchKind::Contains => format!("%{}%", escaped),
                    MatchKind::StartsWith => format!("{}%", escaped),
                    MatchKind::EndsWith => format!("%{}", escaped),
                };
                // null guard, then a case-folded LIKE
                Expr::col(column(field)).is_not_null().and(
                    Expr::expr(Func::lower(Expr::col(column(field))))
                        .like(LikeExpr::new(pattern).escape(LIKE_ESCAPE)),
                )
            }
            Predicate::And(l, r) => l.to_condition().and(r.to_condition()),
            Predicate::Or(l, r) => l.to_condition().or(r.to_condition()),
            Predicate::Not(inner) => inner.to_condition().not(),
        }
    }
}

/// Null-aware comparison matching the SQL rendering.
fn compare_values(lhs: &Value, op: CompareOp, rhs: &Value) -> bool {
    match (lhs.is_null(), rhs.is_null()) {
        (true, true) => op == CompareOp::Eq,
        (true, false) | (false, true) => op == CompareOp::Ne,
        (false, false) => match lhs.compare(rhs) {
            Some(ordering) => match op {
                CompareOp::Eq => ordering == Ordering::Equal,
                CompareOp::Ne => ordering != Ordering::Equal,
                CompareOp::Gt => ordering == Ordering::Greater,
                CompareOp::Gte => ordering != Ordering::Less,
                CompareOp::Lt => ordering == Ordering::Less,
                CompareOp::Lte => ordering != Ordering::Greater,
            },
            None => op == CompareOp::Ne,
        },
    }
}

fn render_compare<T>(left: &Field<T>, op: CompareOp, right: &Operand<T>) -> SimpleExpr {
    let lhs = Expr::col(column(left));
    let rhs = match right {
        Operand::Value(v) => sql_value(v),
        Operand::Field(f) => Expr::col(column(f)).into(),
    };

    let mut guards = Vec::new();
    if left.is_nullable() {
        guards.push(column(left));
    }
    if let Operand::Field(f) = right {
        if f.is_nullable() {
            guards.push(column(f));
        }
    }
    if guards.is_empty() {
        return match op {
            CompareOp::Eq => lhs.eq(rhs),
            CompareOp::Ne => lhs.ne(rhs),
            CompareOp::Gt => lhs.gt(rhs),
            CompareOp::Gte => lhs.gte(rhs),
            CompareOp::Lt => lhs.lt(rhs),
            CompareOp::Lte => lhs.lte(rhs),
        };
    }

    let base = match op {
        CompareOp::Eq | CompareOp::Ne => lhs.eq(rhs),
        CompareOp::Gt => lhs.gt(rhs),
        CompareOp::Gte => lhs.gte(rhs),
        CompareOp::Lt => lhs.lt(rhs),
        CompareOp::Lte => lhs.lte(rhs),
    };
    // false rather than unknown wherever a side is null
    let mut guarded = guards
        .into_iter()
        .fold(base, |acc, col| acc.and(Expr::col(col).is_not_null()));

    if let Operand::Field(rf) = right {
        if !op.is_ordering() && left.is_nullable() && rf.is_nullable() {
            guarded = guarded.or(Expr::col(column(left))
                .is_null()
                .and(Expr::col(column(rf)).is_null()));
        }
    }

    if op == CompareOp::Ne {
        guarded.not()
    } else {
        guarded
    }
}

fn column<T>(field: &Field<T>) -> ColumnName {
    ColumnName(field.column_name().to_string())
}

fn sql_value(value: &Value) -> SimpleExpr {
    match value {
        Value::Null => Expr::val(Option::<bool>::None).into(),
        Value::Bool(b) => Expr::val(*b).into(),
        Value::Int(i) => Expr::val(*i).into(),
        Value::Float(x) => Expr::val(*x).into(),
        Value::Text(s) => Expr::val(s.clone()).into(),
        Value::Timestamp(ts) => Expr::val(*ts).into(),
    }
}

/// Lower-cases one character at a time, the way SQL `LOWER()` does;
/// `str::to_lowercase` would apply context rules such as final sigma.
fn fold_case(text: &str) -> String {
    text.chars().flat_map(char::to_lowercase).collect()
}

/// Escapes LIKE wildcards so user text only ever matches itself.
pub fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | LIKE_ESCAPE) {
            escaped.push(LIKE_ESCAPE);
        }
        escaped.push(c);
    }
    escaped
}
