//! SQLite dialect formatting for query expressions.
//!
//! [`Formatter`] compiles a [`QueryExpression`] into SQLite SQL text. It
//! quotes identifiers with double quotes, renders literals with SQLite
//! escaping rules, interpolates bound values for statements that need them
//! inlined, and expands `%f` / `%t` field templates used by migration DDL.
//!
//! The formatter holds no state; constructing one per call is free.
//!
//! # Example
//!
//! ```
//! use relstore_core::{Expr, QueryExpression, Value};
//! use relstore_sqlite::Formatter;
//!
//! let query = QueryExpression::select("people")
//!     .field(Expr::field("name"))
//!     .filter(Expr::field("name").like(Value::from("O'%")))
//!     .limit(5);
//!
//! let sql = Formatter::new().format(&query).unwrap();
//! assert_eq!(
//!     sql,
//!     r#"SELECT "name" FROM "people" WHERE "name" LIKE 'O''%' LIMIT 5"#
//! );
//! ```

use relstore_core::{
    CompareOp, Expr, FieldDefinition, QueryExpression, QueryKind, SelectField, Value,
};
use thiserror::Error;

use crate::types::map_type;

/// Errors raised while compiling a query expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    /// The query names no target table or view.
    #[error("{0} query is missing its target table")]
    MissingTable(&'static str),
    /// An INSERT or UPDATE has no column values.
    #[error("{0} query has no values")]
    MissingValues(&'static str),
    /// An `IN` expression has an empty list.
    #[error("IN expression requires at least one value")]
    EmptyInList,
    /// An `AND`/`OR` expression has no operands.
    #[error("{0} expression requires at least one operand")]
    EmptyOperands(&'static str),
    /// A function name is not part of the dialect.
    #[error("unrecognized expression function: {0}")]
    UnknownFunction(String),
    /// A function was called with the wrong number of arguments.
    #[error("function {name} does not accept {count} argument(s)")]
    ArgumentCount { name: String, count: usize },
    /// A view definition is not a SELECT.
    #[error("views can only be defined by SELECT queries")]
    InvalidViewQuery,
    /// A `?` placeholder has no corresponding value.
    #[error("no value supplied for parameter {0}")]
    MissingParameter(usize),
}

type Result<T> = std::result::Result<T, FormatError>;

fn kind_name(kind: QueryKind) -> &'static str {
    match kind {
        QueryKind::Select => "SELECT",
        QueryKind::Insert => "INSERT",
        QueryKind::Update => "UPDATE",
        QueryKind::Delete => "DELETE",
    }
}

/// Stateless SQLite SQL formatter.
#[derive(Debug, Clone, Copy, Default)]
pub struct Formatter;

impl Formatter {
    /// Creates a formatter.
    pub fn new() -> Self {
        Self
    }

    /// Quotes an identifier.
    ///
    /// Dotted names are quoted part by part and `*` passes through.
    ///
    /// # Examples
    ///
    /// ```
    /// use relstore_sqlite::Formatter;
    ///
    /// let f = Formatter::new();
    /// assert_eq!(f.escape_name("people"), r#""people""#);
    /// assert_eq!(f.escape_name("p.name"), r#""p"."name""#);
    /// assert_eq!(f.escape_name(r#"odd"name"#), r#""odd""name""#);
    /// ```
    pub fn escape_name(&self, name: &str) -> String {
        name.split('.')
            .map(|part| {
                if part == "*" {
                    part.to_string()
                } else {
                    format!("\"{}\"", part.replace('"', "\"\""))
                }
            })
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Renders a value as a SQL literal.
    ///
    /// # Examples
    ///
    /// ```
    /// use relstore_core::Value;
    /// use relstore_sqlite::Formatter;
    ///
    /// let f = Formatter::new();
    /// assert_eq!(f.escape(&Value::Null), "NULL");
    /// assert_eq!(f.escape(&Value::Bool(true)), "1");
    /// assert_eq!(f.escape(&Value::from("it's")), "'it''s'");
    /// assert_eq!(f.escape(&Value::Blob(vec![0xde, 0xad])), "X'DEAD'");
    /// ```
    pub fn escape(&self, value: &Value) -> String {
        match value {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => String::from(if *b { "1" } else { "0" }),
            Value::Integer(i) => i.to_string(),
            Value::Real(f) if f.is_nan() => "NULL".to_string(),
            Value::Real(f) if f.is_infinite() => {
                String::from(if *f > 0.0 { "9e999" } else { "-9e999" })
            }
            Value::Real(f) => format!("{f:?}"),
            Value::Text(s) => quote_text(s),
            Value::Blob(bytes) => {
                let hex: String = bytes.iter().map(|b| format!("{b:02X}")).collect();
                format!("X'{hex}'")
            }
            Value::DateTime(dt) => {
                quote_text(&dt.format("%Y-%m-%d %H:%M:%S%.3f%:z").to_string())
            }
        }
    }

    /// Compiles a query expression into SQL.
    ///
    /// # Errors
    ///
    /// Returns [`FormatError::MissingTable`] when the query has no target,
    /// [`FormatError::MissingValues`] for an INSERT/UPDATE without values,
    /// and expression errors from [`format_expr`](Self::format_expr).
    pub fn format(&self, query: &QueryExpression) -> Result<String> {
        let table = query
            .table
            .as_deref()
            .ok_or(FormatError::MissingTable(kind_name(query.kind)))?;
        match query.kind {
            QueryKind::Select => self.format_select(table, query),
            QueryKind::Insert => self.format_insert(table, query),
            QueryKind::Update => self.format_update(table, query),
            QueryKind::Delete => self.format_delete(table, query),
        }
    }

    fn format_select(&self, table: &str, query: &QueryExpression) -> Result<String> {
        let mut sql = String::from("SELECT ");
        if query.distinct {
            sql.push_str("DISTINCT ");
        }
        if query.fields.is_empty() {
            sql.push('*');
        } else {
            let fields = query
                .fields
                .iter()
                .map(|field| self.format_select_field(field))
                .collect::<Result<Vec<_>>>()?;
            sql.push_str(&fields.join(", "));
        }
        sql.push_str(" FROM ");
        sql.push_str(&self.escape_name(table));
        self.push_where(&mut sql, query)?;

        if !query.group_by.is_empty() {
            let terms = query
                .group_by
                .iter()
                .map(|expr| self.format_expr(expr))
                .collect::<Result<Vec<_>>>()?;
            sql.push_str(" GROUP BY ");
            sql.push_str(&terms.join(", "));
        }
        if !query.order_by.is_empty() {
            let terms = query
                .order_by
                .iter()
                .map(|order| {
                    let expr = self.format_expr(&order.expr)?;
                    Ok(if order.descending {
                        format!("{expr} DESC")
                    } else {
                        format!("{expr} ASC")
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            sql.push_str(" ORDER BY ");
            sql.push_str(&terms.join(", "));
        }
        match (query.limit, query.offset) {
            (Some(limit), Some(offset)) => sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}")),
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {limit}")),
            // SQLite only accepts OFFSET after a LIMIT clause.
            (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {offset}")),
            (None, None) => {}
        }
        Ok(sql)
    }

    fn format_select_field(&self, field: &SelectField) -> Result<String> {
        let expr = self.format_expr(&field.expr)?;
        Ok(match &field.alias {
            Some(alias) => format!("{expr} AS {}", self.escape_name(alias)),
            None => expr,
        })
    }

    fn format_insert(&self, table: &str, query: &QueryExpression) -> Result<String> {
        if query.values.is_empty() {
            return Err(FormatError::MissingValues("INSERT"));
        }
        let mut columns = Vec::with_capacity(query.values.len());
        let mut values = Vec::with_capacity(query.values.len());
        for (column, value) in &query.values {
            columns.push(self.escape_name(column));
            values.push(self.format_expr(value)?);
        }
        Ok(format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.escape_name(table),
            columns.join(", "),
            values.join(", ")
        ))
    }

    fn format_update(&self, table: &str, query: &QueryExpression) -> Result<String> {
        if query.values.is_empty() {
            return Err(FormatError::MissingValues("UPDATE"));
        }
        let assignments = query
            .values
            .iter()
            .map(|(column, value)| {
                Ok(format!("{} = {}", self.escape_name(column), self.format_expr(value)?))
            })
            .collect::<Result<Vec<_>>>()?;
        let mut sql = format!(
            "UPDATE {} SET {}",
            self.escape_name(table),
            assignments.join(", ")
        );
        self.push_where(&mut sql, query)?;
        Ok(sql)
    }

    fn format_delete(&self, table: &str, query: &QueryExpression) -> Result<String> {
        let mut sql = format!("DELETE FROM {}", self.escape_name(table));
        self.push_where(&mut sql, query)?;
        Ok(sql)
    }

    fn push_where(&self, sql: &mut String, query: &QueryExpression) -> Result<()> {
        if let Some(filter) = &query.filter {
            sql.push_str(" WHERE ");
            sql.push_str(&self.format_expr(filter)?);
        }
        Ok(())
    }

    /// Compiles a single expression node.
    ///
    /// # Errors
    ///
    /// Returns [`FormatError::UnknownFunction`] for a function outside the
    /// dialect, and [`FormatError::EmptyInList`] /
    /// [`FormatError::EmptyOperands`] for empty lists.
    pub fn format_expr(&self, expr: &Expr) -> Result<String> {
        match expr {
            Expr::Field { table, name } => Ok(match table {
                Some(table) => format!("{}.{}", self.escape_name(table), self.escape_name(name)),
                None => self.escape_name(name),
            }),
            Expr::Value(value) => Ok(self.escape(value)),
            Expr::Placeholder => Ok("?".to_string()),
            Expr::Compare { op, left, right } => {
                let lhs = self.format_operand(left)?;
                match (op, right.as_ref()) {
                    (CompareOp::Eq, Expr::Value(Value::Null)) => Ok(format!("{lhs} IS NULL")),
                    (CompareOp::Ne, Expr::Value(Value::Null)) => Ok(format!("{lhs} IS NOT NULL")),
                    _ => {
                        let rhs = self.format_operand(right)?;
                        Ok(format!("{lhs} {} {rhs}", compare_operator(*op)))
                    }
                }
            }
            Expr::In { expr, list } => {
                if list.is_empty() {
                    return Err(FormatError::EmptyInList);
                }
                let items = list
                    .iter()
                    .map(|item| self.format_expr(item))
                    .collect::<Result<Vec<_>>>()?;
                Ok(format!("{} IN ({})", self.format_operand(expr)?, items.join(", ")))
            }
            Expr::And(operands) => self.format_logical("AND", operands),
            Expr::Or(operands) => self.format_logical("OR", operands),
            Expr::Not(inner) => Ok(format!("NOT ({})", self.format_expr(inner)?)),
            Expr::Function { name, args } => self.format_function(name, args),
        }
    }

    fn format_operand(&self, expr: &Expr) -> Result<String> {
        let sql = self.format_expr(expr)?;
        Ok(match expr {
            Expr::Compare { .. } | Expr::In { .. } | Expr::And(_) | Expr::Or(_) | Expr::Not(_) => {
                format!("({sql})")
            }
            _ => sql,
        })
    }

    fn format_logical(&self, keyword: &'static str, operands: &[Expr]) -> Result<String> {
        if operands.is_empty() {
            return Err(FormatError::EmptyOperands(keyword));
        }
        let parts = operands
            .iter()
            .map(|operand| match operand {
                Expr::And(_) | Expr::Or(_) => Ok(format!("({})", self.format_expr(operand)?)),
                _ => self.format_expr(operand),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(parts.join(&format!(" {keyword} ")))
    }

    fn format_function(&self, name: &str, args: &[Expr]) -> Result<String> {
        let lower = name.to_ascii_lowercase();
        let (sql_name, min, max) = match lower.as_str() {
            "count" => ("COUNT", 0, 1),
            "sum" => ("SUM", 1, 1),
            "min" => ("MIN", 1, 1),
            "max" => ("MAX", 1, 1),
            "avg" => ("AVG", 1, 1),
            "lower" => ("LOWER", 1, 1),
            "upper" => ("UPPER", 1, 1),
            "length" => ("LENGTH", 1, 1),
            "trim" => ("TRIM", 1, 1),
            "abs" => ("ABS", 1, 1),
            "round" => ("ROUND", 1, 2),
            "coalesce" => ("COALESCE", 1, usize::MAX),
            _ => return Err(FormatError::UnknownFunction(name.to_string())),
        };
        if args.len() < min || args.len() > max {
            return Err(FormatError::ArgumentCount {
                name: name.to_string(),
                count: args.len(),
            });
        }
        if args.is_empty() {
            return Ok(format!("{sql_name}(*)"));
        }
        let rendered = args
            .iter()
            .map(|arg| self.format_expr(arg))
            .collect::<Result<Vec<_>>>()?;
        Ok(format!("{sql_name}({})", rendered.join(", ")))
    }

    /// Inlines bound values into `?` placeholders.
    ///
    /// Placeholders inside string literals and quoted identifiers are left
    /// untouched. Surplus values are ignored.
    ///
    /// # Examples
    ///
    /// ```
    /// use relstore_core::Value;
    /// use relstore_sqlite::Formatter;
    ///
    /// let sql = Formatter::new()
    ///     .prepare("SELECT * FROM t WHERE a = ? AND b = '?'", &[Value::from("x")])
    ///     .unwrap();
    /// assert_eq!(sql, "SELECT * FROM t WHERE a = 'x' AND b = '?'");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`FormatError::MissingParameter`] when there are more
    /// placeholders than values.
    pub fn prepare(&self, sql: &str, values: &[Value]) -> Result<String> {
        let mut out = String::with_capacity(sql.len());
        let mut quote: Option<char> = None;
        let mut next = 0;
        for c in sql.chars() {
            match quote {
                Some(q) => {
                    // A doubled quote closes and reopens, which leaves the state unchanged.
                    if c == q {
                        quote = None;
                    }
                    out.push(c);
                }
                None => match c {
                    '\'' | '"' => {
                        quote = Some(c);
                        out.push(c);
                    }
                    '?' => {
                        let value = values
                            .get(next)
                            .ok_or(FormatError::MissingParameter(next + 1))?;
                        out.push_str(&self.escape(value));
                        next += 1;
                    }
                    _ => out.push(c),
                },
            }
        }
        Ok(out)
    }

    /// Expands a field template.
    ///
    /// `%f` becomes the field name (with embedded double quotes doubled, so
    /// it can sit inside a quoted identifier) and `%t` becomes the mapped
    /// column type. `%%` is a literal percent sign.
    ///
    /// # Examples
    ///
    /// ```
    /// use relstore_core::{FieldDefinition, LogicalType};
    /// use relstore_sqlite::Formatter;
    ///
    /// let field = FieldDefinition::new("email", LogicalType::Text).with_size(255);
    /// let sql = Formatter::new().format_field(r#"ALTER TABLE "users" ADD COLUMN "%f" %t"#, &field);
    /// assert_eq!(sql, r#"ALTER TABLE "users" ADD COLUMN "email" TEXT(255,0) NULL"#);
    /// ```
    pub fn format_field(&self, template: &str, field: &FieldDefinition) -> String {
        let mut out = String::with_capacity(template.len() + field.name.len());
        let mut chars = template.chars().peekable();
        while let Some(c) = chars.next() {
            if c != '%' {
                out.push(c);
                continue;
            }
            match chars.peek() {
                Some('f') => {
                    chars.next();
                    out.push_str(&field.name.replace('"', "\"\""));
                }
                Some('t') => {
                    chars.next();
                    out.push_str(&map_type(field));
                }
                Some('%') => {
                    chars.next();
                    out.push('%');
                }
                _ => out.push('%'),
            }
        }
        out
    }

    /// Renders `CREATE VIEW` for a SELECT query.
    ///
    /// # Errors
    ///
    /// Returns [`FormatError::InvalidViewQuery`] when the query is not a SELECT.
    pub fn format_create_view(&self, name: &str, query: &QueryExpression) -> Result<String> {
        if query.kind != QueryKind::Select {
            return Err(FormatError::InvalidViewQuery);
        }
        Ok(format!(
            "CREATE VIEW {} AS {}",
            self.escape_name(name),
            self.format(query)?
        ))
    }
}

fn quote_text(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn compare_operator(op: CompareOp) -> &'static str {
    match op {
        CompareOp::Eq => "=",
        CompareOp::Ne => "<>",
        CompareOp::Lt => "<",
        CompareOp::Le => "<=",
        CompareOp::Gt => ">",
        CompareOp::Ge => ">=",
        CompareOp::Like => "LIKE",
    }
}
