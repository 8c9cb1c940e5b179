//! Schema type definitions for logical table modeling.
//!
//! This module defines the declarative data model a caller uses to describe
//! the tables it wants: logical field types, field definitions, indexes, and
//! migration descriptors. The types serialize with [`serde`] using the same
//! camelCase wire names as hand-written descriptor files, so a descriptor
//! can be loaded from JSON or YAML and passed straight to a storage adapter.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Version reported for a table that has never been migrated.
pub const INITIAL_VERSION: &str = "0.0";

/// Abstract field type, independent of any physical storage representation.
///
/// Storage backends map each logical type to a concrete column type. Names
/// that are not recognized are preserved in [`LogicalType::Other`] so that
/// descriptors written for newer type sets still deserialize.
///
/// # Examples
///
/// ```
/// use relstore_core::LogicalType;
///
/// let ty: LogicalType = "Text".parse().unwrap();
/// assert_eq!(ty, LogicalType::Text);
///
/// let unknown: LogicalType = "Geometry".parse().unwrap();
/// assert_eq!(unknown, LogicalType::Other("Geometry".into()));
/// assert_eq!(unknown.to_string(), "Geometry");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LogicalType {
    Boolean,
    Byte,
    Number,
    Float,
    /// Auto-incrementing integer primary key.
    Counter,
    Currency,
    Decimal,
    Date,
    DateTime,
    Time,
    Long,
    Duration,
    Integer,
    #[allow(clippy::upper_case_acronyms)]
    URL,
    Text,
    Note,
    Image,
    Binary,
    Guid,
    Short,
    /// A type name this crate does not know about.
    Other(String),
}

impl LogicalType {
    /// Returns the canonical name of the type.
    pub fn as_str(&self) -> &str {
        match self {
            LogicalType::Boolean => "Boolean",
            LogicalType::Byte => "Byte",
            LogicalType::Number => "Number",
            LogicalType::Float => "Float",
            LogicalType::Counter => "Counter",
            LogicalType::Currency => "Currency",
            LogicalType::Decimal => "Decimal",
            LogicalType::Date => "Date",
            LogicalType::DateTime => "DateTime",
            LogicalType::Time => "Time",
            LogicalType::Long => "Long",
            LogicalType::Duration => "Duration",
            LogicalType::Integer => "Integer",
            LogicalType::URL => "URL",
            LogicalType::Text => "Text",
            LogicalType::Note => "Note",
            LogicalType::Image => "Image",
            LogicalType::Binary => "Binary",
            LogicalType::Guid => "Guid",
            LogicalType::Short => "Short",
            LogicalType::Other(name) => name,
        }
    }
}

impl FromStr for LogicalType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "Boolean" => LogicalType::Boolean,
            "Byte" => LogicalType::Byte,
            "Number" => LogicalType::Number,
            "Float" => LogicalType::Float,
            "Counter" => LogicalType::Counter,
            "Currency" => LogicalType::Currency,
            "Decimal" => LogicalType::Decimal,
            "Date" => LogicalType::Date,
            "DateTime" => LogicalType::DateTime,
            "Time" => LogicalType::Time,
            "Long" => LogicalType::Long,
            "Duration" => LogicalType::Duration,
            "Integer" => LogicalType::Integer,
            "URL" => LogicalType::URL,
            "Text" => LogicalType::Text,
            "Note" => LogicalType::Note,
            "Image" => LogicalType::Image,
            "Binary" => LogicalType::Binary,
            "Guid" => LogicalType::Guid,
            "Short" => LogicalType::Short,
            other => LogicalType::Other(other.to_string()),
        })
    }
}

impl From<String> for LogicalType {
    fn from(s: String) -> Self {
        match s.parse() {
            Ok(ty) => ty,
            Err(never) => match never {},
        }
    }
}

impl From<LogicalType> for String {
    fn from(ty: LogicalType) -> Self {
        ty.as_str().to_string()
    }
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared definition of a single table field.
///
/// Fields are nullable unless [`nullable`](Self::nullable) is explicitly
/// `Some(false)`. A field flagged [`many`](Self::many) is a to-many relation
/// placeholder: it exists in the logical model only and is never
/// materialized as a column.
///
/// # Examples
///
/// ```
/// use relstore_core::{FieldDefinition, LogicalType};
///
/// let id = FieldDefinition::new("id", LogicalType::Counter).primary_key();
/// assert!(id.primary);
///
/// let name = FieldDefinition::new("name", LogicalType::Text)
///     .with_size(100)
///     .not_null();
/// assert!(!name.is_nullable());
/// assert_eq!(name.size, Some(100));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    /// Column name.
    pub name: String,
    /// Logical type of the field.
    #[serde(rename = "type")]
    pub logical_type: LogicalType,
    /// Size (length or precision), if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,
    /// Scale for fixed-point types, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<u32>,
    /// Explicit nullability; `None` means nullable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nullable: Option<bool>,
    /// Whether the field is (part of) the primary key.
    #[serde(default)]
    pub primary: bool,
    /// Whether the field is a to-many relation placeholder.
    #[serde(default)]
    pub many: bool,
}

impl FieldDefinition {
    /// Creates a nullable, non-primary field.
    pub fn new(name: impl Into<String>, logical_type: LogicalType) -> Self {
        Self {
            name: name.into(),
            logical_type,
            size: None,
            scale: None,
            nullable: None,
            primary: false,
            many: false,
        }
    }

    /// Sets the size.
    pub fn with_size(mut self, size: u32) -> Self {
        self.size = Some(size);
        self
    }

    /// Sets the scale.
    pub fn with_scale(mut self, scale: u32) -> Self {
        self.scale = Some(scale);
        self
    }

    /// Marks the field as `NOT NULL`.
    pub fn not_null(mut self) -> Self {
        self.nullable = Some(false);
        self
    }

    /// Marks the field as part of the primary key.
    pub fn primary_key(mut self) -> Self {
        self.primary = true;
        self
    }

    /// Marks the field as a to-many relation placeholder.
    pub fn to_many(mut self) -> Self {
        self.many = true;
        self
    }

    /// Returns whether the field accepts nulls (absent means yes).
    pub fn is_nullable(&self) -> bool {
        self.nullable.unwrap_or(true)
    }
}

/// An index over one or more columns of a table.
///
/// Indexes are reconciled by name; two indexes with the same name are
/// considered identical when they cover the same *set* of columns.
///
/// # Examples
///
/// ```
/// use relstore_core::IndexDescriptor;
///
/// let a = IndexDescriptor::new("idx_people_name", ["last", "first"]);
/// let b = IndexDescriptor::new("idx_people_name", ["first", "last"]);
/// assert!(a.same_columns(&b));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    /// Index name.
    pub name: String,
    /// Indexed column names, in index order.
    pub columns: Vec<String>,
}

impl IndexDescriptor {
    /// Creates an index descriptor.
    pub fn new<I, S>(name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns whether both indexes cover the same set of columns, in any order.
    pub fn same_columns(&self, other: &IndexDescriptor) -> bool {
        let mut left: Vec<&str> = self.columns.iter().map(String::as_str).collect();
        let mut right: Vec<&str> = other.columns.iter().map(String::as_str).collect();
        left.sort_unstable();
        left.dedup();
        right.sort_unstable();
        right.dedup();
        left == right
    }
}

/// A column named for removal in a migration descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveField {
    pub name: String,
}

/// Desired-schema delta for one table at one version.
///
/// A descriptor is applied at most once per `(applies_to, version)`. When a
/// storage adapter finds the table already at or beyond `version`, it sets
/// [`updated`](Self::updated) and performs no DDL.
///
/// # Examples
///
/// ```
/// use relstore_core::{FieldDefinition, IndexDescriptor, LogicalType, MigrationDescriptor};
///
/// let descriptor = MigrationDescriptor::new("people", "1.0")
///     .adding(FieldDefinition::new("id", LogicalType::Counter).primary_key())
///     .adding(FieldDefinition::new("name", LogicalType::Text).with_size(100))
///     .with_index(IndexDescriptor::new("idx_people_name", ["name"]))
///     .with_model("Person");
///
/// assert_eq!(descriptor.add.len(), 2);
/// assert!(!descriptor.updated);
///
/// let json = r#"{"appliesTo": "people", "version": "1.0",
///     "add": [{"name": "id", "type": "Counter", "primary": true}]}"#;
/// let parsed: MigrationDescriptor = serde_json::from_str(json).unwrap();
/// assert_eq!(parsed.applies_to, "people");
/// assert_eq!(parsed.add[0].logical_type, LogicalType::Counter);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationDescriptor {
    /// Target table name.
    pub applies_to: String,
    /// Version string, compared segment-wise (e.g. `"1.0"` < `"1.10"`).
    pub version: String,
    /// Fields that should exist after the migration.
    #[serde(default)]
    pub add: Vec<FieldDefinition>,
    /// Fields whose definition changes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub change: Vec<FieldDefinition>,
    /// Fields requested for removal. Removal is advisory only.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remove: Vec<RemoveField>,
    /// Indexes that should exist after the migration.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indexes: Vec<IndexDescriptor>,
    /// Name of the logical model the table backs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Free-form description recorded in the migrations ledger.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Set by the adapter when the table was already at this version.
    #[serde(skip)]
    pub updated: bool,
}

impl MigrationDescriptor {
    /// Creates an empty descriptor for a table and version.
    pub fn new(applies_to: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            applies_to: applies_to.into(),
            version: version.into(),
            add: Vec::new(),
            change: Vec::new(),
            remove: Vec::new(),
            indexes: Vec::new(),
            model: None,
            description: None,
            updated: false,
        }
    }

    /// Appends a field to the `add` list.
    pub fn adding(mut self, field: FieldDefinition) -> Self {
        self.add.push(field);
        self
    }

    /// Appends a field to the `change` list.
    pub fn changing(mut self, field: FieldDefinition) -> Self {
        self.change.push(field);
        self
    }

    /// Appends a column name to the `remove` list.
    pub fn removing(mut self, name: impl Into<String>) -> Self {
        self.remove.push(RemoveField { name: name.into() });
        self
    }

    /// Appends an index.
    pub fn with_index(mut self, index: IndexDescriptor) -> Self {
        self.indexes.push(index);
        self
    }

    /// Sets the model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Compares two version strings segment by segment.
///
/// Segments are split on `.`; two numeric segments compare numerically,
/// anything else compares as text. A missing segment sorts before a present
/// one, so `"1.0" < "1.0.1"`.
///
/// # Examples
///
/// ```
/// use std::cmp::Ordering;
/// use relstore_core::compare_versions;
///
/// assert_eq!(compare_versions("1.0", "1.0"), Ordering::Equal);
/// assert_eq!(compare_versions("1.9", "1.10"), Ordering::Less);
/// assert_eq!(compare_versions("2.0", "10.0"), Ordering::Less);
/// assert_eq!(compare_versions("0.0", "1.0"), Ordering::Less);
/// ```
pub fn compare_versions(left: &str, right: &str) -> std::cmp::Ordering {
    let mut left_parts = left.trim().split('.');
    let mut right_parts = right.trim().split('.');
    loop {
        match (left_parts.next(), right_parts.next()) {
            (None, None) => return std::cmp::Ordering::Equal,
            (None, Some(_)) => return std::cmp::Ordering::Less,
            (Some(_), None) => return std::cmp::Ordering::Greater,
            (Some(l), Some(r)) => {
                let ordering = match (l.parse::<u64>(), r.parse::<u64>()) {
                    (Ok(l), Ok(r)) => l.cmp(&r),
                    _ => l.cmp(r),
                };
                if ordering != std::cmp::Ordering::Equal {
                    return ordering;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cmp::Ordering;

    #[test]
    fn test_logical_type_serde_round_names() {
        let json = serde_json::to_string(&LogicalType::URL).unwrap();
        assert_eq!(json, "\"URL\"");
        let ty: LogicalType = serde_json::from_str("\"DateTime\"").unwrap();
        assert_eq!(ty, LogicalType::DateTime);
        let other: LogicalType = serde_json::from_str("\"Textt\"").unwrap();
        assert_eq!(other, LogicalType::Other("Textt".to_string()));
    }

    #[test]
    fn test_field_nullable_default() {
        let field = FieldDefinition::new("a", LogicalType::Text);
        assert!(field.is_nullable());
        let field: FieldDefinition =
            serde_json::from_str(r#"{"name": "a", "type": "Text", "nullable": false}"#).unwrap();
        assert!(!field.is_nullable());
        assert!(!field.primary);
        assert!(!field.many);
    }

    #[test]
    fn test_descriptor_updated_is_not_deserialized() {
        let json = r#"{"appliesTo": "t", "version": "1.0", "updated": true}"#;
        let descriptor: MigrationDescriptor = serde_json::from_str(json).unwrap();
        assert!(!descriptor.updated);
        assert!(descriptor.add.is_empty());
        assert!(descriptor.remove.is_empty());
    }

    #[test]
    fn test_descriptor_remove_entries() {
        let json = r#"{"appliesTo": "t", "version": "2.0", "remove": [{"name": "legacy"}]}"#;
        let descriptor: MigrationDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(descriptor.remove, vec![RemoveField { name: "legacy".into() }]);
    }

    #[test]
    fn test_index_same_columns_differs() {
        let a = IndexDescriptor::new("i", ["a", "b"]);
        let b = IndexDescriptor::new("i", ["a", "c"]);
        assert!(!a.same_columns(&b));
    }

    #[test]
    fn test_compare_versions() {
        assert_eq!(compare_versions("1.0", "1.0.0"), Ordering::Less);
        assert_eq!(compare_versions("1.2", "1.1"), Ordering::Greater);
        assert_eq!(compare_versions("1.0-beta", "1.0-alpha"), Ordering::Greater);
        assert_eq!(compare_versions(INITIAL_VERSION, "0.1"), Ordering::Less);
    }
}
