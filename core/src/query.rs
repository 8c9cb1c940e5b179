//! Engine-agnostic query expressions.
//!
//! A [`QueryExpression`] describes a SELECT, INSERT, UPDATE, or DELETE
//! against one table or view: the projected fields, a predicate tree, the
//! value map for writes, and ordering/paging. Storage backends compile it
//! to their own SQL dialect.
//!
//! # Example
//!
//! ```
//! use relstore_core::{Expr, QueryExpression, QueryKind, Value};
//!
//! let query = QueryExpression::select("people")
//!     .field(Expr::field("id"))
//!     .field(Expr::field("name"))
//!     .filter(Expr::field("age").gt(Value::from(30)))
//!     .order_by(Expr::field("name"), false)
//!     .limit(10);
//!
//! assert_eq!(query.kind, QueryKind::Select);
//! assert_eq!(query.fields.len(), 2);
//! assert_eq!(query.limit, Some(10));
//! ```

use crate::value::Value;

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
}

/// A node of an expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A column reference, optionally qualified by table.
    Field {
        table: Option<String>,
        name: String,
    },
    /// A literal value.
    Value(Value),
    /// A positional `?` parameter bound at execution time.
    Placeholder,
    /// A binary comparison.
    Compare {
        op: CompareOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Membership test against a list.
    In { expr: Box<Expr>, list: Vec<Expr> },
    /// Logical conjunction of all operands.
    And(Vec<Expr>),
    /// Logical disjunction of all operands.
    Or(Vec<Expr>),
    /// Logical negation.
    Not(Box<Expr>),
    /// A named function call (aggregate or scalar).
    Function { name: String, args: Vec<Expr> },
}

impl Expr {
    /// An unqualified column reference.
    pub fn field(name: impl Into<String>) -> Self {
        Expr::Field {
            table: None,
            name: name.into(),
        }
    }

    /// A table-qualified column reference.
    pub fn qualified(table: impl Into<String>, name: impl Into<String>) -> Self {
        Expr::Field {
            table: Some(table.into()),
            name: name.into(),
        }
    }

    /// A literal value.
    pub fn value(value: impl Into<Value>) -> Self {
        Expr::Value(value.into())
    }

    /// A function call.
    pub fn function(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Function {
            name: name.into(),
            args,
        }
    }

    /// `COUNT(expr)`.
    pub fn count(expr: Expr) -> Self {
        Expr::function("count", vec![expr])
    }

    fn compare(self, op: CompareOp, right: impl Into<Expr>) -> Self {
        Expr::Compare {
            op,
            left: Box::new(self),
            right: Box::new(right.into()),
        }
    }

    pub fn eq(self, right: impl Into<Expr>) -> Self {
        self.compare(CompareOp::Eq, right)
    }

    pub fn ne(self, right: impl Into<Expr>) -> Self {
        self.compare(CompareOp::Ne, right)
    }

    pub fn lt(self, right: impl Into<Expr>) -> Self {
        self.compare(CompareOp::Lt, right)
    }

    pub fn le(self, right: impl Into<Expr>) -> Self {
        self.compare(CompareOp::Le, right)
    }

    pub fn gt(self, right: impl Into<Expr>) -> Self {
        self.compare(CompareOp::Gt, right)
    }

    pub fn ge(self, right: impl Into<Expr>) -> Self {
        self.compare(CompareOp::Ge, right)
    }

    pub fn like(self, pattern: impl Into<Expr>) -> Self {
        self.compare(CompareOp::Like, pattern)
    }

    /// `self IN (list...)`.
    pub fn in_list(self, list: Vec<Expr>) -> Self {
        Expr::In {
            expr: Box::new(self),
            list,
        }
    }

    /// `self AND other`, flattening nested conjunctions.
    pub fn and(self, other: Expr) -> Self {
        match self {
            Expr::And(mut operands) => {
                operands.push(other);
                Expr::And(operands)
            }
            left => Expr::And(vec![left, other]),
        }
    }

    /// `self OR other`, flattening nested disjunctions.
    pub fn or(self, other: Expr) -> Self {
        match self {
            Expr::Or(mut operands) => {
                operands.push(other);
                Expr::Or(operands)
            }
            left => Expr::Or(vec![left, other]),
        }
    }

    /// `NOT self`.
    pub fn negate(self) -> Self {
        Expr::Not(Box::new(self))
    }
}

impl From<Value> for Expr {
    fn from(value: Value) -> Self {
        Expr::Value(value)
    }
}

/// A projected field with an optional alias.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectField {
    pub expr: Expr,
    pub alias: Option<String>,
}

/// An ordering term.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub expr: Expr,
    pub descending: bool,
}

/// Statement kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Select,
    Insert,
    Update,
    Delete,
}

/// An abstract query against a single table or view.
///
/// `table` is optional so that incomplete expressions can be represented;
/// formatters reject a query without a target.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryExpression {
    pub kind: QueryKind,
    pub table: Option<String>,
    /// Projected fields (SELECT only); empty means `*`.
    pub fields: Vec<SelectField>,
    pub filter: Option<Expr>,
    /// Column/value pairs for INSERT and UPDATE, in column order.
    pub values: Vec<(String, Expr)>,
    pub order_by: Vec<OrderBy>,
    pub group_by: Vec<Expr>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub distinct: bool,
}

impl QueryExpression {
    /// Creates an empty expression of the given kind with no target.
    pub fn new(kind: QueryKind) -> Self {
        Self {
            kind,
            table: None,
            fields: Vec::new(),
            filter: None,
            values: Vec::new(),
            order_by: Vec::new(),
            group_by: Vec::new(),
            limit: None,
            offset: None,
            distinct: false,
        }
    }

    fn targeting(kind: QueryKind, table: impl Into<String>) -> Self {
        let mut query = Self::new(kind);
        query.table = Some(table.into());
        query
    }

    pub fn select(table: impl Into<String>) -> Self {
        Self::targeting(QueryKind::Select, table)
    }

    pub fn insert(table: impl Into<String>) -> Self {
        Self::targeting(QueryKind::Insert, table)
    }

    pub fn update(table: impl Into<String>) -> Self {
        Self::targeting(QueryKind::Update, table)
    }

    pub fn delete(table: impl Into<String>) -> Self {
        Self::targeting(QueryKind::Delete, table)
    }

    /// Adds a projected field.
    pub fn field(mut self, expr: Expr) -> Self {
        self.fields.push(SelectField { expr, alias: None });
        self
    }

    /// Adds a projected field with an alias.
    pub fn field_as(mut self, expr: Expr, alias: impl Into<String>) -> Self {
        self.fields.push(SelectField {
            expr,
            alias: Some(alias.into()),
        });
        self
    }

    /// Sets the predicate, AND-ing with any existing one.
    pub fn filter(mut self, predicate: Expr) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
        self
    }

    /// Sets a column value for INSERT/UPDATE.
    pub fn set(mut self, column: impl Into<String>, value: impl Into<Expr>) -> Self {
        self.values.push((column.into(), value.into()));
        self
    }

    pub fn order_by(mut self, expr: Expr, descending: bool) -> Self {
        self.order_by.push(OrderBy { expr, descending });
        self
    }

    pub fn group_by(mut self, expr: Expr) -> Self {
        self.group_by.push(expr);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_accumulates_conjunction() {
        let query = QueryExpression::select("t")
            .filter(Expr::field("a").eq(Value::from(1)))
            .filter(Expr::field("b").eq(Value::from(2)))
            .filter(Expr::field("c").eq(Value::from(3)));
        match query.filter {
            Some(Expr::And(operands)) => assert_eq!(operands.len(), 3),
            other => panic!("expected conjunction, got {other:?}"),
        }
    }

    #[test]
    fn test_new_has_no_target() {
        let query = QueryExpression::new(QueryKind::Delete);
        assert!(query.table.is_none());
        assert!(query.values.is_empty());
    }
}
