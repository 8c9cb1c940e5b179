//! Migration descriptor validation.
//!
//! Catches structural mistakes in a [`MigrationDescriptor`] (empty names,
//! duplicate fields, empty indexes) before a storage adapter touches the
//! database.
//!
//! # Examples
//!
//! ```
//! use relstore_core::*;
//!
//! let descriptor = MigrationDescriptor::new("people", "1.0")
//!     .adding(FieldDefinition::new("id", LogicalType::Counter).primary_key());
//! assert!(validate_descriptor(&descriptor).is_empty());
//!
//! // Invalid: same field added twice
//! let bad = MigrationDescriptor::new("people", "1.0")
//!     .adding(FieldDefinition::new("id", LogicalType::Counter))
//!     .adding(FieldDefinition::new("id", LogicalType::Integer));
//! assert!(!validate_descriptor(&bad).is_empty());
//! ```

use std::collections::HashSet;

use thiserror::Error;

use crate::{FieldDefinition, MigrationDescriptor};

/// Descriptor validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// `appliesTo` is empty or whitespace-only.
    #[error("migration target table cannot be empty")]
    EmptyTableName,
    /// Version string is empty.
    #[error("migration version cannot be empty")]
    EmptyVersion,
    /// A field or removal entry has an empty name.
    #[error("field name cannot be empty")]
    EmptyFieldName,
    /// Two fields in the same list share a name.
    #[error("duplicate field in {list}: {name}")]
    DuplicateField { list: &'static str, name: String },
    /// An index declares no columns.
    #[error("index {0} has no columns")]
    EmptyIndex(String),
    /// Two indexes share a name.
    #[error("duplicate index: {0}")]
    DuplicateIndex(String),
}

/// Validates a migration descriptor, returning every problem found.
pub fn validate_descriptor(descriptor: &MigrationDescriptor) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if descriptor.applies_to.trim().is_empty() {
        errors.push(ValidationError::EmptyTableName);
    }
    if descriptor.version.trim().is_empty() {
        errors.push(ValidationError::EmptyVersion);
    }

    errors.extend(validate_fields("add", &descriptor.add));
    errors.extend(validate_fields("change", &descriptor.change));

    if descriptor.remove.iter().any(|r| r.name.trim().is_empty()) {
        errors.push(ValidationError::EmptyFieldName);
    }

    let mut seen_indexes = HashSet::new();
    for index in &descriptor.indexes {
        if index.columns.is_empty() {
            errors.push(ValidationError::EmptyIndex(index.name.clone()));
        }
        if !seen_indexes.insert(index.name.as_str()) {
            errors.push(ValidationError::DuplicateIndex(index.name.clone()));
        }
    }

    errors
}

fn validate_fields(list: &'static str, fields: &[FieldDefinition]) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();
    for field in fields {
        if field.name.trim().is_empty() {
            errors.push(ValidationError::EmptyFieldName);
            continue;
        }
        if !seen.insert(field.name.as_str()) {
            errors.push(ValidationError::DuplicateField {
                list,
                name: field.name.clone(),
            });
        }
    }
    errors
}
