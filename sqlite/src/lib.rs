//! SQLite storage adapter.
//!
//! This crate maps logical field types to SQLite column types, compiles
//! query expressions to SQL, runs statements over a single connection with
//! reentrant transactions, introspects the live schema, and reconciles
//! migration descriptors against it.
//!
//! # Architecture
//!
//! - **`types`** — logical-to-physical type mapping
//! - **`format`** — query-expression compilation, escaping, and templating
//! - **`adapter`** — connection lifecycle, statement execution, transactions
//! - **`schema`** — catalog introspection and table/view/index handles
//! - **`migration`** — descriptor reconciliation and the migrations ledger
//! - **`identity`** — per-entity identity counters
//!
//! # Quick start
//!
//! ```
//! use relstore_core::{Expr, FieldDefinition, LogicalType, MigrationDescriptor, QueryExpression, Value};
//! use relstore_sqlite::{AdapterOptions, SqliteAdapter};
//!
//! let mut adapter = SqliteAdapter::new(AdapterOptions::memory());
//!
//! let mut descriptor = MigrationDescriptor::new("people", "1.0")
//!     .adding(FieldDefinition::new("id", LogicalType::Counter))
//!     .adding(FieldDefinition::new("name", LogicalType::Text).with_size(100))
//!     .adding(FieldDefinition::new("nickname", LogicalType::Text));
//! adapter.migrate(&mut descriptor).unwrap();
//!
//! adapter
//!     .execute("INSERT INTO people (name) VALUES (?)", &[Value::from("Ada")])
//!     .unwrap();
//!
//! let query = QueryExpression::select("people").filter(Expr::field("name").eq(Value::from("Ada")));
//! let rows = adapter.execute(&query, &[]).unwrap().into_rows();
//! assert_eq!(rows.len(), 1);
//! // Null columns are absent from result rows.
//! assert!(!rows[0].contains_key("nickname"));
//! ```

mod adapter;
mod config;
mod convert;
mod error;
mod format;
mod identity;
mod migration;
mod schema;
mod types;

pub use adapter::{ExecuteResult, SqliteAdapter, Statement};
pub use config::{AdapterOptions, MEMORY_DATABASE};
pub use error::{AdapterError, Result};
pub use format::{FormatError, Formatter};
pub use identity::IDENTITY_TABLE;
pub use migration::{
    AlterationKind, AlterationPlan, MigrationOutcome, PendingAlteration, Rejection,
    RejectionReason, plan_alteration,
};
pub use schema::{ColumnMetadata, IndexHandle, MIGRATIONS_TABLE, TableHandle, ViewHandle};
pub use types::{COUNTER_TYPE, map_type};
