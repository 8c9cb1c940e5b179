//! Core data model for relational storage adapters.
//!
//! This crate defines the engine-agnostic types shared by storage backends:
//!
//! - [`LogicalType`] and [`FieldDefinition`] — declared fields, independent of
//!   physical column types.
//! - [`MigrationDescriptor`] and [`IndexDescriptor`] — a desired-schema delta
//!   for one table at one version.
//! - [`Value`] and [`Row`] — scalar values and result rows (a missing column
//!   means null).
//! - [`QueryExpression`] and [`Expr`] — abstract SELECT/INSERT/UPDATE/DELETE
//!   trees that backends compile to their SQL dialect.
//!
//! Validation ([`validate_descriptor`]) catches structural errors such as
//! duplicate fields and empty index definitions.
//!
//! # Example
//!
//! ```
//! use relstore_core::*;
//!
//! let descriptor = MigrationDescriptor::new("people", "1.0")
//!     .adding(FieldDefinition::new("id", LogicalType::Counter).primary_key())
//!     .adding(FieldDefinition::new("name", LogicalType::Text).with_size(100).not_null());
//! assert!(validate_descriptor(&descriptor).is_empty());
//!
//! let query = QueryExpression::select("people")
//!     .field(Expr::field("name"))
//!     .filter(Expr::field("id").eq(Value::from(1)));
//! assert_eq!(query.table.as_deref(), Some("people"));
//! ```

mod query;
mod types;
mod validate;
mod value;

pub use query::{CompareOp, Expr, OrderBy, QueryExpression, QueryKind, SelectField};
pub use types::*;
pub use validate::{ValidationError, validate_descriptor};
pub use value::{Row, Value};
