//! Error types for the SQLite adapter.
//!
//! Provides a unified error type covering connection, execution, formatting,
//! migration, and configuration failures.

use thiserror::Error;

use crate::format::FormatError;

/// Errors that can occur during adapter operations.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The database file could not be opened.
    #[error("failed to open database '{database}': {source}")]
    Connection {
        database: String,
        #[source]
        source: rusqlite::Error,
    },

    /// A statement failed. The SQL is logged before this error is returned.
    #[error("failed to execute '{sql}': {source}")]
    Execution {
        sql: String,
        #[source]
        source: rusqlite::Error,
    },

    /// A query expression could not be compiled to SQL.
    #[error("format error: {0}")]
    Format(#[from] FormatError),

    /// The requested alteration needs a full table rebuild, which is not supported.
    #[error("full table migration not implemented: table '{table}' requires rebuilding for columns [{}]", columns.join(", "))]
    UnsupportedMigration { table: String, columns: Vec<String> },

    /// The migration descriptor is structurally invalid.
    #[error("invalid migration descriptor: {0}")]
    InvalidDescriptor(String),

    /// Adapter options could not be loaded.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Convenience alias for results with [`AdapterError`].
pub type Result<T> = std::result::Result<T, AdapterError>;
