//! Logical-to-physical column type mapping.
//!
//! [`map_type`] turns a [`FieldDefinition`] into the SQLite column type text
//! used in `CREATE TABLE` and `ALTER TABLE ... ADD COLUMN` statements,
//! including the nullability or primary-key suffix. The same text is compared
//! against introspected columns during migration, so the mapping must stay
//! stable across releases.

use relstore_core::{FieldDefinition, LogicalType};

/// Column definition used for [`LogicalType::Counter`] fields.
pub const COUNTER_TYPE: &str = "INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL";

const DEFAULT_CURRENCY_PRECISION: u32 = 19;
const DEFAULT_TIME_SIZE: u32 = 36;
const DEFAULT_DURATION_SIZE: u32 = 48;

/// Maps a field definition to its SQLite column type.
///
/// Never fails: a type name this crate does not recognize maps to `INTEGER`.
///
/// # Examples
///
/// ```
/// use relstore_core::{FieldDefinition, LogicalType};
/// use relstore_sqlite::map_type;
///
/// let name = FieldDefinition::new("name", LogicalType::Text).with_size(100).not_null();
/// assert_eq!(map_type(&name), "TEXT(100,0) NOT NULL");
///
/// let id = FieldDefinition::new("id", LogicalType::Guid).primary_key();
/// assert_eq!(map_type(&id), "TEXT(36,0) PRIMARY KEY NOT NULL");
///
/// let seq = FieldDefinition::new("id", LogicalType::Counter);
/// assert_eq!(map_type(&seq), "INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL");
/// ```
pub fn map_type(field: &FieldDefinition) -> String {
    let base = match &field.logical_type {
        LogicalType::Boolean | LogicalType::Byte => "INTEGER(1,0)".to_string(),
        LogicalType::Short => "INTEGER(2,0)".to_string(),
        LogicalType::Number | LogicalType::Float => "REAL".to_string(),
        LogicalType::Counter => return COUNTER_TYPE.to_string(),
        LogicalType::Currency => format!(
            "NUMERIC({},4)",
            field.size.unwrap_or(DEFAULT_CURRENCY_PRECISION)
        ),
        LogicalType::Decimal => match (field.size, field.scale) {
            (Some(size), Some(scale)) => format!("NUMERIC({size},{scale})"),
            _ => "NUMERIC".to_string(),
        },
        LogicalType::Date | LogicalType::DateTime | LogicalType::Long => "NUMERIC".to_string(),
        LogicalType::Time => sized_text(field.size, DEFAULT_TIME_SIZE),
        LogicalType::Duration => sized_text(field.size, DEFAULT_DURATION_SIZE),
        LogicalType::Integer => match field.size {
            Some(size) => format!("INTEGER({size},0)"),
            None => "INTEGER".to_string(),
        },
        LogicalType::URL | LogicalType::Text | LogicalType::Note => match field.size {
            Some(size) => format!("TEXT({size},0)"),
            None => "TEXT".to_string(),
        },
        LogicalType::Image | LogicalType::Binary => "BLOB".to_string(),
        LogicalType::Guid => "TEXT(36,0)".to_string(),
        LogicalType::Other(name) => {
            tracing::debug!(field = %field.name, logical_type = %name, "Unknown logical type mapped to INTEGER");
            "INTEGER".to_string()
        }
    };

    if field.primary {
        format!("{base} PRIMARY KEY NOT NULL")
    } else if field.is_nullable() {
        format!("{base} NULL")
    } else {
        format!("{base} NOT NULL")
    }
}

fn sized_text(size: Option<u32>, default: u32) -> String {
    match size {
        Some(size) if size > 0 => format!("TEXT({size},0)"),
        _ => format!("TEXT({default},0)"),
    }
}
