//! Connection lifecycle, statement execution, and transactions.
//!
//! [`SqliteAdapter`] owns a single SQLite connection. It opens lazily,
//! closes idempotently, dispatches read and write statements, and wraps
//! units of work in reentrant transactions.
//!
//! # Example
//!
//! ```
//! use relstore_core::Value;
//! use relstore_sqlite::{AdapterOptions, SqliteAdapter};
//!
//! let mut adapter = SqliteAdapter::new(AdapterOptions::memory());
//! adapter.execute("CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT)", &[]).unwrap();
//! adapter
//!     .execute("INSERT INTO notes (body) VALUES (?)", &[Value::Null])
//!     .unwrap();
//!
//! let rows = adapter.execute("SELECT id, body FROM notes", &[]).unwrap().into_rows();
//! assert_eq!(rows.len(), 1);
//! assert!(rows[0].get("body").is_none()); // null columns are dropped
//! ```

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use relstore_core::{QueryExpression, Row, Value};
use rusqlite::{Connection, params_from_iter};
use tracing::{debug, error, warn};

use crate::config::AdapterOptions;
use crate::convert::{row_from_sqlite, to_sql_value};
use crate::error::{AdapterError, Result};
use crate::format::{FormatError, Formatter};

/// Anything the adapter can turn into SQL text: raw SQL or a query expression.
pub trait Statement {
    /// Renders the statement as SQLite SQL.
    fn to_sql(&self, formatter: &Formatter) -> std::result::Result<String, FormatError>;
}

impl Statement for str {
    fn to_sql(&self, _formatter: &Formatter) -> std::result::Result<String, FormatError> {
        Ok(self.to_string())
    }
}

impl Statement for String {
    fn to_sql(&self, _formatter: &Formatter) -> std::result::Result<String, FormatError> {
        Ok(self.clone())
    }
}

impl Statement for QueryExpression {
    fn to_sql(&self, formatter: &Formatter) -> std::result::Result<String, FormatError> {
        formatter.format(self)
    }
}

/// Result of [`SqliteAdapter::execute`].
#[derive(Debug, Clone, PartialEq)]
pub enum ExecuteResult {
    /// Rows returned by a read statement. Null columns are absent.
    Rows(Vec<Row>),
    /// Outcome of a write statement.
    Affected {
        /// Number of rows changed.
        changes: usize,
        /// Row id of the most recent successful insert on the connection.
        last_insert_id: i64,
    },
}

impl ExecuteResult {
    /// Returns the rows of a read, or an empty vector for a write.
    pub fn into_rows(self) -> Vec<Row> {
        match self {
            ExecuteResult::Rows(rows) => rows,
            ExecuteResult::Affected { .. } => Vec::new(),
        }
    }

    /// Returns the number of rows changed by a write, or 0 for a read.
    pub fn changes(&self) -> usize {
        match self {
            ExecuteResult::Rows(_) => 0,
            ExecuteResult::Affected { changes, .. } => *changes,
        }
    }
}

type StatementListener = Arc<dyn Fn(&str) + Send + Sync>;

/// SQLite storage adapter over a single connection.
///
/// The connection opens on first use (or explicitly via [`open`](Self::open))
/// and is never shared. Transaction state and the migrations-ledger check are
/// kept per instance.
pub struct SqliteAdapter {
    options: AdapterOptions,
    conn: Option<Connection>,
    transaction_active: bool,
    pub(crate) ledger_ready: bool,
    listener: Option<StatementListener>,
}

impl fmt::Debug for SqliteAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteAdapter")
            .field("options", &self.options)
            .field("open", &self.conn.is_some())
            .field("transaction_active", &self.transaction_active)
            .field("ledger_ready", &self.ledger_ready)
            .finish()
    }
}

impl SqliteAdapter {
    /// Creates an adapter. No connection is opened yet.
    pub fn new(options: AdapterOptions) -> Self {
        Self {
            options,
            conn: None,
            transaction_active: false,
            ledger_ready: false,
            listener: None,
        }
    }

    /// Returns the adapter options.
    pub fn options(&self) -> &AdapterOptions {
        &self.options
    }

    /// Registers a callback invoked with each SQL text right before it runs.
    pub fn on_statement(&mut self, listener: impl Fn(&str) + Send + Sync + 'static) {
        self.listener = Some(Arc::new(listener));
    }

    /// Opens the connection if it is not open yet.
    ///
    /// The database file is created when absent. On failure no handle is
    /// kept, so a later call retries from scratch.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Connection`] if SQLite cannot open the file.
    pub fn open(&mut self) -> Result<()> {
        self.connection().map(|_| ())
    }

    /// Returns whether a connection is currently held.
    pub fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    /// Closes the connection if one is open.
    ///
    /// Close failures are logged and swallowed.
    pub fn close(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        self.transaction_active = false;
        self.ledger_ready = false;
        if let Err((_conn, err)) = conn.close() {
            warn!(database = %self.options.database, error = %err, "Failed to close database connection");
        } else {
            debug!(database = %self.options.database, "Closed database connection");
        }
    }

    fn connection(&mut self) -> Result<&Connection> {
        let conn = match self.conn.take() {
            Some(conn) => conn,
            None => {
                let database = &self.options.database;
                let opened = if self.options.is_memory() {
                    Connection::open_in_memory()
                } else {
                    Connection::open(database)
                };
                let conn = opened.map_err(|source| AdapterError::Connection {
                    database: database.clone(),
                    source,
                })?;
                debug!(database = %database, "Opened database connection");
                conn
            }
        };
        let conn: &Connection = self.conn.insert(conn);
        Ok(conn)
    }

    /// Executes a statement with positional `?` values.
    ///
    /// Statements starting with `SELECT` or `PRAGMA` (case-insensitive) are
    /// reads and return [`ExecuteResult::Rows`]; everything else is a write.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Format`] if a query expression cannot be
    /// compiled and [`AdapterError::Execution`] if SQLite rejects the
    /// statement. The failing SQL is logged before the error is returned.
    pub fn execute<S>(&mut self, statement: &S, values: &[Value]) -> Result<ExecuteResult>
    where
        S: Statement + ?Sized,
    {
        let sql = statement.to_sql(&Formatter::new())?;
        self.run(&sql, values)
    }

    /// Executes a read and returns its rows.
    pub(crate) fn query(&mut self, sql: &str, values: &[Value]) -> Result<Vec<Row>> {
        self.run(sql, values).map(ExecuteResult::into_rows)
    }

    fn run(&mut self, sql: &str, values: &[Value]) -> Result<ExecuteResult> {
        let listener = self.listener.clone();
        let conn = self.connection()?;
        if let Some(listener) = listener {
            listener(sql);
        }
        debug!(sql, params = values.len(), "Executing statement");

        let params = params_from_iter(values.iter().map(to_sql_value));
        let result = if is_read(sql) {
            query_rows(conn, sql, params).map(ExecuteResult::Rows)
        } else {
            conn.execute(sql, params).map(|changes| ExecuteResult::Affected {
                changes,
                last_insert_id: conn.last_insert_rowid(),
            })
        };

        result.map_err(|source| {
            error!(sql, error = %source, "Statement failed");
            AdapterError::Execution {
                sql: sql.to_string(),
                source,
            }
        })
    }

    /// Inlines values into `?` placeholders, escaping each by type.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Format`] when there are fewer values than
    /// placeholders.
    pub fn prepare(&self, template: &str, values: &[Value]) -> Result<String> {
        Ok(Formatter::new().prepare(template, values)?)
    }

    /// Returns whether this instance has a transaction outstanding.
    pub fn in_transaction(&self) -> bool {
        self.transaction_active
    }

    /// Runs `work` inside a transaction.
    ///
    /// When a transaction is already active on this instance, `work` joins it
    /// and no nested `BEGIN` is issued; the outermost call alone commits or
    /// rolls back. A rollback failure is logged and the original error is
    /// returned. If `work` panics, the transaction is rolled back and the
    /// panic resumes, leaving the adapter usable.
    ///
    /// # Examples
    ///
    /// ```
    /// use relstore_sqlite::{AdapterOptions, SqliteAdapter};
    ///
    /// let mut adapter = SqliteAdapter::new(AdapterOptions::memory());
    /// adapter.execute("CREATE TABLE t (x INTEGER)", &[]).unwrap();
    ///
    /// let result = adapter.execute_in_transaction(|a| {
    ///     a.execute("INSERT INTO t VALUES (1)", &[])?;
    ///     a.execute("INSERT INTO missing VALUES (2)", &[])
    /// });
    /// assert!(result.is_err());
    ///
    /// let rows = adapter.execute("SELECT * FROM t", &[]).unwrap().into_rows();
    /// assert!(rows.is_empty());
    /// ```
    pub fn execute_in_transaction<T, F>(&mut self, work: F) -> Result<T>
    where
        F: FnOnce(&mut SqliteAdapter) -> Result<T>,
    {
        if self.transaction_active {
            return work(self);
        }

        self.run("BEGIN TRANSACTION", &[])?;
        self.transaction_active = true;

        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| work(&mut *self))) {
            Ok(outcome) => outcome,
            Err(payload) => {
                self.transaction_active = false;
                self.rollback();
                panic::resume_unwind(payload);
            }
        };

        match outcome {
            Ok(value) => {
                let committed = self.run("COMMIT", &[]);
                self.transaction_active = false;
                match committed {
                    Ok(_) => Ok(value),
                    Err(err) => {
                        self.rollback();
                        Err(err)
                    }
                }
            }
            Err(err) => {
                self.transaction_active = false;
                self.rollback();
                Err(err)
            }
        }
    }

    fn rollback(&mut self) {
        // DDL inside the transaction is undone, so cached schema facts are stale.
        self.ledger_ready = false;
        if let Err(err) = self.run("ROLLBACK", &[]) {
            warn!(error = %err, "Rollback failed");
        }
    }
}

fn is_read(sql: &str) -> bool {
    let head = sql.trim_start();
    ["SELECT", "PRAGMA"].iter().any(|keyword| {
        head.get(..keyword.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(keyword))
    })
}

fn query_rows<P: rusqlite::Params>(conn: &Connection, sql: &str, params: P) -> rusqlite::Result<Vec<Row>> {
    let mut stmt = conn.prepare(sql)?;
    let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let rows = stmt
        .query_map(params, |row| row_from_sqlite(row, &names))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recording_adapter() -> (SqliteAdapter, Arc<Mutex<Vec<String>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut adapter = SqliteAdapter::new(AdapterOptions::memory());
        let sink = Arc::clone(&log);
        adapter.on_statement(move |sql| sink.lock().unwrap().push(sql.to_string()));
        (adapter, log)
    }

    fn count(log: &Arc<Mutex<Vec<String>>>, statement: &str) -> usize {
        log.lock().unwrap().iter().filter(|s| s.as_str() == statement).count()
    }

    #[test]
    fn test_is_read() {
        assert!(is_read("SELECT 1"));
        assert!(is_read("  select * from t"));
        assert!(is_read("pragma table_info(t)"));
        assert!(!is_read("INSERT INTO t VALUES (1)"));
        assert!(!is_read("SEL"));
        assert!(!is_read(""));
    }

    #[test]
    fn test_open_and_close_are_idempotent() {
        let mut adapter = SqliteAdapter::new(AdapterOptions::memory());
        assert!(!adapter.is_open());
        adapter.open().unwrap();
        adapter.open().unwrap();
        assert!(adapter.is_open());
        adapter.close();
        adapter.close();
        assert!(!adapter.is_open());
    }

    #[test]
    fn test_open_failure_keeps_no_handle() {
        let mut adapter = SqliteAdapter::new(AdapterOptions::new("/nonexistent-dir/sub/db.sqlite"));
        let err = adapter.open().unwrap_err();
        assert!(matches!(err, AdapterError::Connection { .. }));
        assert!(!adapter.is_open());
    }

    #[test]
    fn test_execute_opens_lazily_and_reports_writes() {
        let mut adapter = SqliteAdapter::new(AdapterOptions::memory());
        adapter.execute("CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT)", &[]).unwrap();
        assert!(adapter.is_open());
        let result = adapter
            .execute("INSERT INTO t (v) VALUES (?)", &[Value::from("a")])
            .unwrap();
        assert_eq!(
            result,
            ExecuteResult::Affected {
                changes: 1,
                last_insert_id: 1
            }
        );
    }

    #[test]
    fn test_execute_error_carries_sql() {
        let mut adapter = SqliteAdapter::new(AdapterOptions::memory());
        let err = adapter.execute("SELECT * FROM nowhere", &[]).unwrap_err();
        match err {
            AdapterError::Execution { sql, .. } => assert_eq!(sql, "SELECT * FROM nowhere"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_execute_query_expression() {
        use relstore_core::{Expr, QueryExpression};

        let mut adapter = SqliteAdapter::new(AdapterOptions::memory());
        adapter.execute("CREATE TABLE t (a INTEGER, b TEXT)", &[]).unwrap();
        let insert = QueryExpression::insert("t")
            .set("a", Expr::Placeholder)
            .set("b", Expr::Placeholder);
        adapter.execute(&insert, &[Value::from(1), Value::Null]).unwrap();
        adapter.execute(&insert, &[Value::from(2), Value::from("two")]).unwrap();

        let select = QueryExpression::select("t").order_by(Expr::field("a"), false);
        let rows = adapter.execute(&select, &[]).unwrap().into_rows();
        assert_eq!(rows.len(), 2);
        assert!(!rows[0].contains_key("b"));
        assert_eq!(rows[1].get("b"), Some(&Value::from("two")));
    }

    #[test]
    fn test_format_error_surfaces() {
        let mut adapter = SqliteAdapter::new(AdapterOptions::memory());
        let query = QueryExpression::new(relstore_core::QueryKind::Select);
        let err = adapter.execute(&query, &[]).unwrap_err();
        assert!(matches!(err, AdapterError::Format(FormatError::MissingTable(_))));
    }

    #[test]
    fn test_prepare_inlines_values() {
        let adapter = SqliteAdapter::new(AdapterOptions::memory());
        let sql = adapter
            .prepare("DELETE FROM t WHERE a = ? AND b = ?", &[Value::from(1), Value::from("x")])
            .unwrap();
        assert_eq!(sql, "DELETE FROM t WHERE a = 1 AND b = 'x'");
        assert!(!adapter.is_open());
    }

    #[test]
    fn test_transaction_commits() {
        let (mut adapter, log) = recording_adapter();
        adapter.execute("CREATE TABLE t (x INTEGER)", &[]).unwrap();
        adapter
            .execute_in_transaction(|a| {
                assert!(a.in_transaction());
                a.execute("INSERT INTO t VALUES (1)", &[])
            })
            .unwrap();
        assert!(!adapter.in_transaction());
        assert_eq!(count(&log, "BEGIN TRANSACTION"), 1);
        assert_eq!(count(&log, "COMMIT"), 1);
        assert_eq!(count(&log, "ROLLBACK"), 0);
    }

    #[test]
    fn test_nested_transaction_joins_and_rolls_back_once() {
        let (mut adapter, log) = recording_adapter();
        adapter.execute("CREATE TABLE t (x INTEGER)", &[]).unwrap();

        let result: Result<()> = adapter.execute_in_transaction(|outer| {
            outer.execute("INSERT INTO t VALUES (1)", &[])?;
            outer.execute_in_transaction(|inner| {
                inner.execute("INSERT INTO t VALUES (2)", &[])?;
                inner.execute("INSERT INTO missing VALUES (3)", &[])?;
                Ok(())
            })
        });

        assert!(result.is_err());
        assert!(!adapter.in_transaction());
        assert_eq!(count(&log, "BEGIN TRANSACTION"), 1);
        assert_eq!(count(&log, "ROLLBACK"), 1);
        assert_eq!(count(&log, "COMMIT"), 0);

        let rows = adapter.execute("SELECT * FROM t", &[]).unwrap().into_rows();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_panic_in_work_rolls_back_and_resets_state() {
        let (mut adapter, log) = recording_adapter();
        adapter.execute("CREATE TABLE t (a INTEGER)", &[]).unwrap();

        let caught = panic::catch_unwind(AssertUnwindSafe(|| {
            adapter
                .execute_in_transaction(|a| -> Result<()> {
                    a.execute("INSERT INTO t VALUES (1)", &[])?;
                    panic!("work failed");
                })
                .ok();
        }));
        assert!(caught.is_err());
        assert!(!adapter.in_transaction());
        assert_eq!(count(&log, "ROLLBACK"), 1);

        adapter
            .execute_in_transaction(|a| a.execute("INSERT INTO t VALUES (2)", &[]))
            .unwrap();
        assert_eq!(count(&log, "BEGIN TRANSACTION"), 2);
        let rows = adapter.execute("SELECT a FROM t", &[]).unwrap().into_rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("a"), Some(&Value::Integer(2)));
    }

    #[test]
    fn test_rollback_failure_keeps_original_error() {
        let (mut adapter, log) = recording_adapter();
        let result: Result<()> = adapter.execute_in_transaction(|a| {
            // Ending the transaction early makes the coordinator's ROLLBACK fail.
            a.execute("COMMIT", &[])?;
            Err(AdapterError::InvalidDescriptor("boom".into()))
        });
        match result {
            Err(AdapterError::InvalidDescriptor(msg)) => assert_eq!(msg, "boom"),
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(count(&log, "ROLLBACK"), 1);
        assert!(!adapter.in_transaction());
    }
}
