//! Adapter options.
//!
//! [`AdapterOptions`] names the database file the adapter opens. Options can
//! be built in code or loaded from a YAML or JSON file.
//!
//! # Example YAML
//!
//! ```yaml
//! database: data/app.db
//! ```

use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AdapterError, Result};

/// Database name that selects a private in-memory database.
pub const MEMORY_DATABASE: &str = ":memory:";

/// Options for [`SqliteAdapter`](crate::SqliteAdapter).
///
/// # Examples
///
/// ```
/// use relstore_sqlite::AdapterOptions;
///
/// let options = AdapterOptions::default();
/// assert!(options.is_memory());
///
/// let options = AdapterOptions::new("app.db");
/// assert_eq!(options.database, "app.db");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterOptions {
    /// Path of the database file, or `":memory:"`.
    #[serde(default = "default_database")]
    pub database: String,
}

fn default_database() -> String {
    MEMORY_DATABASE.to_string()
}

impl Default for AdapterOptions {
    fn default() -> Self {
        Self {
            database: default_database(),
        }
    }
}

impl AdapterOptions {
    /// Creates options for the given database path.
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
        }
    }

    /// Options for an in-memory database.
    pub fn memory() -> Self {
        Self::default()
    }

    /// Returns whether the options select an in-memory database.
    pub fn is_memory(&self) -> bool {
        self.database == MEMORY_DATABASE
    }

    /// Loads options from a YAML or JSON file (chosen by extension, YAML otherwise).
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Config`] if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| {
            AdapterError::Config(format!("failed to open '{}': {e}", path.display()))
        })?;
        let reader = BufReader::new(file);
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            serde_json::from_reader(reader).map_err(|e| {
                AdapterError::Config(format!("invalid JSON in '{}': {e}", path.display()))
            })
        } else {
            serde_yaml::from_reader(reader).map_err(|e| {
                AdapterError::Config(format!("invalid YAML in '{}': {e}", path.display()))
            })
        }
    }
}
