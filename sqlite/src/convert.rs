//! Conversion between [`Value`] and SQLite storage values.
//!
//! Booleans are stored as integers and datetimes as the same text form the
//! formatter renders, so bound and inlined values compare equal in SQL.
//! Reading back yields the five SQLite storage classes only.

use relstore_core::{Row, Value};
use rusqlite::types::{Value as SqlValue, ValueRef};

use crate::format::Formatter;

/// Converts a [`Value`] into an owned SQLite value for parameter binding.
pub(crate) fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Integer(i) => SqlValue::Integer(*i),
        Value::Real(f) => SqlValue::Real(*f),
        Value::Text(s) => SqlValue::Text(s.clone()),
        Value::Blob(bytes) => SqlValue::Blob(bytes.clone()),
        Value::DateTime(dt) => {
            SqlValue::Text(dt.format("%Y-%m-%d %H:%M:%S%.3f%:z").to_string())
        }
    }
}

/// Converts a borrowed SQLite value into a [`Value`].
///
/// Text that is not valid UTF-8 is decoded lossily.
pub(crate) fn from_value_ref(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(f) => Value::Real(f),
        ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Blob(bytes.to_vec()),
    }
}

/// Builds a [`Row`] from a result row, dropping every null column.
///
/// When labels repeat, the rightmost column wins.
pub(crate) fn row_from_sqlite(row: &rusqlite::Row<'_>, names: &[String]) -> rusqlite::Result<Row> {
    let mut out = Row::new();
    for (index, name) in names.iter().enumerate() {
        out.push(name.clone(), from_value_ref(row.get_ref(index)?));
    }
    Ok(out.without_nulls())
}

/// Reads an integer column from a normalized row, treating absence as `None`.
pub(crate) fn row_i64(row: &Row, column: &str) -> Option<i64> {
    row.get(column).and_then(Value::as_i64)
}

/// Reads a text column from a normalized row, treating absence as `None`.
pub(crate) fn row_text(row: &Row, column: &str) -> Option<String> {
    match row.get(column) {
        Some(Value::Text(s)) => Some(s.clone()),
        Some(Value::Null) | None => None,
        Some(other) => Some(Formatter::new().escape(other)),
    }
}
