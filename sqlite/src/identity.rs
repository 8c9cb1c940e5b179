//! Identity ledger.
//!
//! Hands out increasing integer identities per `(entity, attribute)` pair,
//! stored in the `increment_id` table. The first request for a pair seeds
//! the counter from the largest value already present in the entity table.

use relstore_core::Value;
use tracing::debug;

use crate::adapter::SqliteAdapter;
use crate::convert::row_i64;
use crate::error::Result;
use crate::format::Formatter;

/// Name of the identity ledger table.
pub const IDENTITY_TABLE: &str = "increment_id";

const CREATE_IDENTITY_TABLE: &str = "CREATE TABLE increment_id(id INTEGER PRIMARY KEY AUTOINCREMENT, entity TEXT NOT NULL, attribute TEXT NOT NULL, value INTEGER)";

impl SqliteAdapter {
    /// Returns the next identity value for `attribute` of `entity`.
    ///
    /// # Examples
    ///
    /// ```
    /// use relstore_sqlite::{AdapterOptions, SqliteAdapter};
    ///
    /// let mut adapter = SqliteAdapter::new(AdapterOptions::memory());
    /// adapter.execute("CREATE TABLE orders (number INTEGER)", &[]).unwrap();
    /// adapter.execute("INSERT INTO orders VALUES (41)", &[]).unwrap();
    ///
    /// assert_eq!(adapter.select_identity("orders", "number").unwrap(), 42);
    /// assert_eq!(adapter.select_identity("orders", "number").unwrap(), 43);
    /// ```
    pub fn select_identity(&mut self, entity: &str, attribute: &str) -> Result<i64> {
        self.execute_in_transaction(|adapter| {
            if !adapter.table_exists(IDENTITY_TABLE)? {
                debug!("Creating identity ledger");
                adapter.execute(CREATE_IDENTITY_TABLE, &[])?;
            }

            let key = [Value::from(entity), Value::from(attribute)];
            let stored = adapter.query(
                "SELECT value FROM increment_id WHERE entity = ? AND attribute = ?",
                &key,
            )?;
            let next = match stored.first() {
                Some(row) => {
                    let next = row_i64(row, "value").unwrap_or(0) + 1;
                    adapter.execute(
                        "UPDATE increment_id SET value = ? WHERE entity = ? AND attribute = ?",
                        &[Value::from(next), Value::from(entity), Value::from(attribute)],
                    )?;
                    next
                }
                None => {
                    let next = adapter.current_max(entity, attribute)? + 1;
                    adapter.execute(
                        "INSERT INTO increment_id(entity, attribute, value) VALUES (?, ?, ?)",
                        &[Value::from(entity), Value::from(attribute), Value::from(next)],
                    )?;
                    next
                }
            };
            debug!(entity, attribute, value = next, "Selected identity");
            Ok(next)
        })
    }

    fn current_max(&mut self, entity: &str, attribute: &str) -> Result<i64> {
        if !self.table_exists(entity)? {
            return Ok(0);
        }
        let formatter = Formatter::new();
        let sql = format!(
            "SELECT MAX({}) AS value FROM {}",
            formatter.escape_name(attribute),
            formatter.escape_name(entity)
        );
        let rows = self.query(&sql, &[])?;
        Ok(rows.first().and_then(|row| row_i64(row, "value")).unwrap_or(0))
    }
}
