//! Live schema introspection and table, view, and index handles.
//!
//! Everything here reads SQLite's own catalog (`sqlite_master` and the
//! `table_info` / `index_list` / `index_info` pragmas) on every call. The
//! only cached facts are the per-handle index list and the adapter's
//! migrations-ledger flag.

use std::sync::LazyLock;

use regex::Regex;
use relstore_core::{
    FieldDefinition, INITIAL_VERSION, IndexDescriptor, QueryExpression, Value, compare_versions,
};
use tracing::debug;

use crate::adapter::SqliteAdapter;
use crate::convert::{row_i64, row_text};
use crate::error::{AdapterError, Result};
use crate::format::Formatter;

/// Name of the migrations ledger table.
pub const MIGRATIONS_TABLE: &str = "migrations";

pub(crate) const CREATE_MIGRATIONS_TABLE: &str = "CREATE TABLE migrations(id INTEGER PRIMARY KEY AUTOINCREMENT, appliesTo TEXT NOT NULL, model TEXT NULL, description TEXT, version TEXT NOT NULL)";

static SIZED_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*\w+\s*\(\s*(\d+)\s*(?:,\s*(\d+)\s*)?\)").expect("static regex must compile")
});

/// Metadata of a live column, as reported by `PRAGMA table_info`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMetadata {
    pub name: String,
    /// Zero-based position in the table.
    pub ordinal: i64,
    /// Declared type text, e.g. `TEXT(100,0)`.
    pub type_text: String,
    pub nullable: bool,
    pub primary: bool,
    /// Size parsed from the declared type, when positive.
    pub size: Option<u32>,
    /// Scale parsed from the declared type, when positive.
    pub scale: Option<u32>,
    pub default_value: Option<String>,
}

impl ColumnMetadata {
    /// Declared type plus nullability, in the same form
    /// [`map_type`](crate::map_type) produces for non-primary fields.
    pub fn declared_type(&self) -> String {
        let suffix = if self.nullable { "NULL" } else { "NOT NULL" };
        format!("{} {suffix}", self.type_text.to_uppercase())
    }
}

/// Parses `(size,scale)` out of a declared type, dropping zero captures.
fn parse_size_scale(type_text: &str) -> (Option<u32>, Option<u32>) {
    let Some(caps) = SIZED_TYPE.captures(type_text) else {
        return (None, None);
    };
    let positive = |index: usize| {
        caps.get(index)
            .and_then(|m| m.as_str().parse::<u32>().ok())
            .filter(|v| *v > 0)
    };
    (positive(1), positive(2))
}

impl SqliteAdapter {
    fn object_exists(&mut self, name: &str, kind: &str) -> Result<bool> {
        let rows = self.query(
            "SELECT COUNT(*) AS count FROM sqlite_master WHERE name = ? AND type = ?",
            &[Value::from(name), Value::from(kind)],
        )?;
        Ok(rows.first().and_then(|row| row_i64(row, "count")).unwrap_or(0) > 0)
    }

    /// Returns whether a table exists.
    pub fn table_exists(&mut self, name: &str) -> Result<bool> {
        self.object_exists(name, "table")
    }

    /// Returns whether a view exists.
    pub fn view_exists(&mut self, name: &str) -> Result<bool> {
        self.object_exists(name, "view")
    }

    /// Lists the live columns of a table in ordinal order.
    ///
    /// Returns an empty list for a table that does not exist.
    pub fn columns(&mut self, table: &str) -> Result<Vec<ColumnMetadata>> {
        let sql = format!("PRAGMA table_info({})", Formatter::new().escape_name(table));
        let rows = self.query(&sql, &[])?;
        Ok(rows
            .iter()
            .map(|row| {
                let type_text = row_text(row, "type").unwrap_or_default();
                let (size, scale) = parse_size_scale(&type_text);
                ColumnMetadata {
                    name: row_text(row, "name").unwrap_or_default(),
                    ordinal: row_i64(row, "cid").unwrap_or_default(),
                    nullable: row_i64(row, "notnull").unwrap_or(0) == 0,
                    primary: row_i64(row, "pk").unwrap_or(0) > 0,
                    default_value: row_text(row, "dflt_value"),
                    type_text,
                    size,
                    scale,
                }
            })
            .collect())
    }

    /// Returns the greatest version applied to `table`, or `"0.0"`.
    pub fn version(&mut self, table: &str) -> Result<String> {
        if !self.ledger_exists()? {
            return Ok(INITIAL_VERSION.to_string());
        }
        let rows = self.query(
            "SELECT version FROM migrations WHERE appliesTo = ?",
            &[Value::from(table)],
        )?;
        Ok(rows
            .iter()
            .filter_map(|row| row_text(row, "version"))
            .max_by(|a, b| compare_versions(a, b))
            .unwrap_or_else(|| INITIAL_VERSION.to_string()))
    }

    fn ledger_exists(&mut self) -> Result<bool> {
        if self.ledger_ready {
            return Ok(true);
        }
        let exists = self.table_exists(MIGRATIONS_TABLE)?;
        self.ledger_ready = exists;
        Ok(exists)
    }

    /// Creates the migrations ledger unless this instance already saw it.
    pub(crate) fn ensure_ledger(&mut self) -> Result<()> {
        if !self.ledger_exists()? {
            debug!("Creating migrations ledger");
            self.execute(CREATE_MIGRATIONS_TABLE, &[])?;
            self.ledger_ready = true;
        }
        Ok(())
    }

    /// Lists user-created indexes of a table, bypassing any handle cache.
    pub(crate) fn list_indexes(&mut self, table: &str) -> Result<Vec<IndexDescriptor>> {
        let formatter = Formatter::new();
        let sql = format!("PRAGMA index_list({})", formatter.escape_name(table));
        let names: Vec<String> = self
            .query(&sql, &[])?
            .iter()
            .filter(|row| row_text(row, "origin").as_deref() == Some("c"))
            .filter_map(|row| row_text(row, "name"))
            .collect();

        let mut indexes = Vec::with_capacity(names.len());
        for name in names {
            let sql = format!("PRAGMA index_info({})", formatter.escape_name(&name));
            let mut columns: Vec<(i64, String)> = self
                .query(&sql, &[])?
                .iter()
                .filter_map(|row| Some((row_i64(row, "seqno")?, row_text(row, "name")?)))
                .collect();
            columns.sort_by_key(|(seqno, _)| *seqno);
            indexes.push(IndexDescriptor {
                name,
                columns: columns.into_iter().map(|(_, column)| column).collect(),
            });
        }
        Ok(indexes)
    }

    /// Returns a handle to a table.
    pub fn table(&mut self, name: impl Into<String>) -> TableHandle<'_> {
        TableHandle {
            adapter: self,
            name: name.into(),
        }
    }

    /// Returns a handle to a view.
    pub fn view(&mut self, name: impl Into<String>) -> ViewHandle<'_> {
        ViewHandle {
            adapter: self,
            name: name.into(),
        }
    }

    /// Returns a handle to the indexes of a table.
    ///
    /// The index list is fetched once per handle and reused until the handle
    /// creates or drops an index.
    pub fn indexes(&mut self, table: impl Into<String>) -> IndexHandle<'_> {
        IndexHandle {
            adapter: self,
            table: table.into(),
            cache: None,
        }
    }
}

/// Handle to a table.
///
/// # Examples
///
/// ```
/// use relstore_core::{FieldDefinition, LogicalType};
/// use relstore_sqlite::{AdapterOptions, SqliteAdapter};
///
/// let mut adapter = SqliteAdapter::new(AdapterOptions::memory());
/// let mut people = adapter.table("people");
/// assert!(!people.exists().unwrap());
///
/// people
///     .create(&[
///         FieldDefinition::new("id", LogicalType::Counter),
///         FieldDefinition::new("name", LogicalType::Text).with_size(50),
///     ])
///     .unwrap();
/// assert!(people.exists().unwrap());
/// assert_eq!(people.version().unwrap(), "0.0");
///
/// let columns = people.columns().unwrap();
/// assert_eq!(columns[1].type_text, "TEXT(50,0)");
/// assert_eq!(columns[1].size, Some(50));
/// assert_eq!(columns[1].scale, None);
/// ```
pub struct TableHandle<'a> {
    adapter: &'a mut SqliteAdapter,
    name: String,
}

impl TableHandle<'_> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn exists(&mut self) -> Result<bool> {
        self.adapter.table_exists(&self.name)
    }

    pub fn version(&mut self) -> Result<String> {
        self.adapter.version(&self.name)
    }

    pub fn columns(&mut self) -> Result<Vec<ColumnMetadata>> {
        self.adapter.columns(&self.name)
    }

    /// Creates the table from field definitions.
    ///
    /// To-many placeholders are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::InvalidDescriptor`] when no field would become
    /// a column.
    pub fn create(&mut self, fields: &[FieldDefinition]) -> Result<()> {
        let formatter = Formatter::new();
        let columns: Vec<String> = fields
            .iter()
            .filter(|field| !field.many)
            .map(|field| formatter.format_field("\"%f\" %t", field))
            .collect();
        if columns.is_empty() {
            return Err(AdapterError::InvalidDescriptor(format!(
                "table '{}' has no columns to create",
                self.name
            )));
        }
        let sql = format!(
            "CREATE TABLE {} ({})",
            formatter.escape_name(&self.name),
            columns.join(", ")
        );
        self.adapter.execute(&sql, &[])?;
        Ok(())
    }

    /// Adds one column per field, in order, stopping at the first failure.
    ///
    /// Returns the number of columns added.
    pub fn add_columns(&mut self, fields: &[FieldDefinition]) -> Result<usize> {
        let formatter = Formatter::new();
        let template = format!(
            "ALTER TABLE {} ADD COLUMN \"%f\" %t",
            formatter.escape_name(&self.name).replace('%', "%%")
        );
        let mut added = 0;
        for field in fields.iter().filter(|field| !field.many) {
            let sql = formatter.format_field(&template, field);
            self.adapter.execute(&sql, &[])?;
            added += 1;
        }
        Ok(added)
    }

    /// Drops the table if it exists.
    pub fn drop(&mut self) -> Result<()> {
        let sql = format!("DROP TABLE IF EXISTS {}", Formatter::new().escape_name(&self.name));
        self.adapter.execute(&sql, &[])?;
        Ok(())
    }
}

/// Handle to a view.
pub struct ViewHandle<'a> {
    adapter: &'a mut SqliteAdapter,
    name: String,
}

impl ViewHandle<'_> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn exists(&mut self) -> Result<bool> {
        self.adapter.view_exists(&self.name)
    }

    /// Creates (or replaces) the view from a SELECT query, in one transaction.
    pub fn create(&mut self, query: &QueryExpression) -> Result<()> {
        let formatter = Formatter::new();
        let create = formatter.format_create_view(&self.name, query)?;
        let drop = format!("DROP VIEW IF EXISTS {}", formatter.escape_name(&self.name));
        self.adapter.execute_in_transaction(|adapter| {
            adapter.execute(&drop, &[])?;
            adapter.execute(&create, &[])?;
            Ok(())
        })
    }

    /// Drops the view if it exists.
    pub fn drop(&mut self) -> Result<()> {
        let sql = format!("DROP VIEW IF EXISTS {}", Formatter::new().escape_name(&self.name));
        self.adapter.execute(&sql, &[])?;
        Ok(())
    }
}

/// Handle to the indexes of one table.
pub struct IndexHandle<'a> {
    adapter: &'a mut SqliteAdapter,
    table: String,
    cache: Option<Vec<IndexDescriptor>>,
}

impl IndexHandle<'_> {
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Lists user-created indexes, fetching them on first use.
    pub fn list(&mut self) -> Result<&[IndexDescriptor]> {
        let indexes = match self.cache.take() {
            Some(indexes) => indexes,
            None => self.adapter.list_indexes(&self.table)?,
        };
        let list: &[IndexDescriptor] = self.cache.insert(indexes);
        Ok(list)
    }

    /// Creates an index, dropping a same-named one first.
    pub fn create(&mut self, name: &str, columns: &[String]) -> Result<()> {
        let exists = self.list()?.iter().any(|index| index.name == name);
        if exists {
            self.drop(name)?;
        }
        let formatter = Formatter::new();
        let columns: Vec<String> = columns.iter().map(|c| formatter.escape_name(c)).collect();
        let sql = format!(
            "CREATE INDEX {} ON {} ({})",
            formatter.escape_name(name),
            formatter.escape_name(&self.table),
            columns.join(", ")
        );
        self.cache = None;
        self.adapter.execute(&sql, &[])?;
        Ok(())
    }

    /// Drops an index if it exists.
    pub fn drop(&mut self, name: &str) -> Result<()> {
        let sql = format!("DROP INDEX IF EXISTS {}", Formatter::new().escape_name(name));
        self.cache = None;
        self.adapter.execute(&sql, &[])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AdapterOptions;
    use relstore_core::{Expr, LogicalType};

    fn adapter() -> SqliteAdapter {
        SqliteAdapter::new(AdapterOptions::memory())
    }

    #[test]
    fn test_parse_size_scale() {
        assert_eq!(parse_size_scale("TEXT(100,0)"), (Some(100), None));
        assert_eq!(parse_size_scale("NUMERIC(19,4)"), (Some(19), Some(4)));
        assert_eq!(parse_size_scale("VARCHAR(20)"), (Some(20), None));
        assert_eq!(parse_size_scale("INTEGER"), (None, None));
        assert_eq!(parse_size_scale(""), (None, None));
    }

    #[test]
    fn test_declared_type() {
        let column = ColumnMetadata {
            name: "a".into(),
            ordinal: 0,
            type_text: "text(10,0)".into(),
            nullable: false,
            primary: false,
            size: Some(10),
            scale: None,
            default_value: None,
        };
        assert_eq!(column.declared_type(), "TEXT(10,0) NOT NULL");
    }

    #[test]
    fn test_columns_metadata() {
        let mut adapter = adapter();
        adapter
            .execute(
                "CREATE TABLE t (id INTEGER PRIMARY KEY, price NUMERIC(19,4) NOT NULL, note TEXT DEFAULT 'n/a')",
                &[],
            )
            .unwrap();
        let columns = adapter.columns("t").unwrap();
        assert_eq!(columns.len(), 3);
        assert!(columns[0].primary);
        assert_eq!(columns[1].ordinal, 1);
        assert!(!columns[1].nullable);
        assert_eq!((columns[1].size, columns[1].scale), (Some(19), Some(4)));
        assert!(columns[2].nullable);
        assert_eq!(columns[2].default_value.as_deref(), Some("'n/a'"));
        assert!(adapter.columns("missing").unwrap().is_empty());
    }

    #[test]
    fn test_exists_distinguishes_tables_and_views() {
        let mut adapter = adapter();
        adapter.execute("CREATE TABLE t (a INTEGER)", &[]).unwrap();
        adapter.execute("CREATE VIEW v AS SELECT a FROM t", &[]).unwrap();
        assert!(adapter.table_exists("t").unwrap());
        assert!(!adapter.table_exists("v").unwrap());
        assert!(adapter.view_exists("v").unwrap());
        assert!(!adapter.view_exists("t").unwrap());
    }

    #[test]
    fn test_version_without_ledger() {
        let mut adapter = adapter();
        assert_eq!(adapter.version("anything").unwrap(), "0.0");
    }

    #[test]
    fn test_version_uses_segment_order() {
        let mut adapter = adapter();
        adapter.ensure_ledger().unwrap();
        for version in ["1.9", "1.10", "1.2"] {
            adapter
                .execute(
                    "INSERT INTO migrations (appliesTo, version) VALUES ('t', ?)",
                    &[Value::from(version)],
                )
                .unwrap();
        }
        assert_eq!(adapter.version("t").unwrap(), "1.10");
        assert_eq!(adapter.version("other").unwrap(), "0.0");
    }

    #[test]
    fn test_table_create_add_drop() {
        let mut adapter = adapter();
        let mut table = adapter.table("people");
        table
            .create(&[
                FieldDefinition::new("id", LogicalType::Counter),
                FieldDefinition::new("friends", LogicalType::Integer).to_many(),
            ])
            .unwrap();
        let added = table
            .add_columns(&[FieldDefinition::new("email", LogicalType::Text).not_null()])
            .unwrap_err();
        // NOT NULL without a default cannot be added to an existing table.
        assert!(matches!(added, AdapterError::Execution { .. }));

        let added = table
            .add_columns(&[FieldDefinition::new("email", LogicalType::Text)])
            .unwrap();
        assert_eq!(added, 1);
        let names: Vec<String> = table.columns().unwrap().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["id", "email"]);

        table.drop().unwrap();
        assert!(!table.exists().unwrap());
        table.drop().unwrap();
    }

    #[test]
    fn test_table_create_requires_columns() {
        let mut adapter = adapter();
        let err = adapter
            .table("t")
            .create(&[FieldDefinition::new("x", LogicalType::Integer).to_many()])
            .unwrap_err();
        assert!(matches!(err, AdapterError::InvalidDescriptor(_)));
    }

    #[test]
    fn test_view_create_replaces() {
        let mut adapter = adapter();
        adapter.execute("CREATE TABLE t (a INTEGER, b TEXT)", &[]).unwrap();
        let mut view = adapter.view("v");
        view.create(&QueryExpression::select("t").field(Expr::field("a")))
            .unwrap();
        view.create(&QueryExpression::select("t").field(Expr::field("b")))
            .unwrap();
        assert!(view.exists().unwrap());
        let columns = adapter.columns("v").unwrap();
        assert_eq!(columns.len(), 1);
        assert_eq!(columns[0].name, "b");

        let mut view = adapter.view("v");
        view.drop().unwrap();
        assert!(!view.exists().unwrap());
    }

    #[test]
    fn test_index_list_excludes_automatic_indexes() {
        let mut adapter = adapter();
        adapter
            .execute("CREATE TABLE t (a TEXT UNIQUE, b INTEGER, c INTEGER)", &[])
            .unwrap();
        adapter.execute("CREATE INDEX idx_t_bc ON t (c, b)", &[]).unwrap();

        let mut indexes = adapter.indexes("t");
        let list = indexes.list().unwrap();
        assert_eq!(list, &[IndexDescriptor::new("idx_t_bc", ["c", "b"])]);
    }

    #[test]
    fn test_index_handle_memoizes_until_mutation() {
        let mut adapter = adapter();
        adapter.execute("CREATE TABLE t (a INTEGER, b INTEGER)", &[]).unwrap();

        let mut indexes = adapter.indexes("t");
        assert!(indexes.list().unwrap().is_empty());
        indexes.create("idx_a", &["a".to_string()]).unwrap();
        assert_eq!(indexes.list().unwrap().len(), 1);

        indexes.create("idx_a", &["a".to_string(), "b".to_string()]).unwrap();
        assert_eq!(
            indexes.list().unwrap(),
            &[IndexDescriptor::new("idx_a", ["a", "b"])]
        );

        indexes.drop("idx_a").unwrap();
        assert!(indexes.list().unwrap().is_empty());
    }
}
