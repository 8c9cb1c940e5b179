//! Migration reconciliation.
//!
//! [`SqliteAdapter::migrate`] brings one table up to the state a
//! [`MigrationDescriptor`] describes and records the version in the
//! `migrations` ledger. Only additive changes are applied in place: a
//! descriptor that would need a column removed or retyped fails with
//! [`AdapterError::UnsupportedMigration`] before any DDL runs.
//!
//! The diff itself is the pure function [`plan_alteration`], so it can be
//! inspected or tested without a database.
//!
//! # Example
//!
//! ```
//! use relstore_core::{FieldDefinition, LogicalType, MigrationDescriptor};
//! use relstore_sqlite::{AdapterOptions, MigrationOutcome, SqliteAdapter};
//!
//! let mut adapter = SqliteAdapter::new(AdapterOptions::memory());
//! let mut descriptor = MigrationDescriptor::new("people", "1.0")
//!     .adding(FieldDefinition::new("id", LogicalType::Counter))
//!     .adding(FieldDefinition::new("name", LogicalType::Text).with_size(100));
//!
//! assert_eq!(adapter.migrate(&mut descriptor).unwrap(), MigrationOutcome::Created);
//! assert!(!descriptor.updated);
//!
//! assert_eq!(adapter.migrate(&mut descriptor).unwrap(), MigrationOutcome::AlreadyApplied);
//! assert!(descriptor.updated);
//! ```

use std::cmp::Ordering;

use relstore_core::{
    FieldDefinition, MigrationDescriptor, Value, compare_versions, validate_descriptor,
};
use tracing::{debug, info};

use crate::adapter::SqliteAdapter;
use crate::error::{AdapterError, Result};
use crate::schema::ColumnMetadata;
use crate::types::map_type;

/// Result of a successful [`SqliteAdapter::migrate`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// The table was already at or beyond the descriptor's version.
    AlreadyApplied,
    /// The table did not exist and was created.
    Created,
    /// Columns were added to an existing table.
    Altered { columns_added: usize },
    /// The table already matched the descriptor; only indexes and the ledger were touched.
    NoOp,
}

impl MigrationOutcome {
    /// Numeric status code: `-1` already applied, `1` created or altered, `2` no-op.
    pub fn code(&self) -> i32 {
        match self {
            MigrationOutcome::AlreadyApplied => -1,
            MigrationOutcome::Created | MigrationOutcome::Altered { .. } => 1,
            MigrationOutcome::NoOp => 2,
        }
    }

    /// Returns whether this call recorded a new ledger entry.
    pub fn is_applied(&self) -> bool {
        !matches!(self, MigrationOutcome::AlreadyApplied)
    }
}

impl std::fmt::Display for MigrationOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MigrationOutcome::AlreadyApplied => write!(f, "already applied"),
            MigrationOutcome::Created => write!(f, "created"),
            MigrationOutcome::Altered { columns_added } => {
                write!(f, "altered ({columns_added} column(s) added)")
            }
            MigrationOutcome::NoOp => write!(f, "no changes"),
        }
    }
}

/// A live column the descriptor wants removed or retyped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAlteration {
    /// Column name as the descriptor spells it.
    pub column: String,
    /// What would have to happen to the column.
    pub kind: AlterationKind,
}

/// Kind of change that needs a table rebuild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlterationKind {
    /// The column would be dropped.
    Remove,
    /// The column's declared type or nullability differs.
    ChangeType {
        /// Live declared type, e.g. `INTEGER NOT NULL`.
        from: String,
        /// Type the descriptor maps to.
        to: String,
    },
}

/// A descriptor entry that was ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /// Column name as the descriptor spells it.
    pub column: String,
    /// Why the entry was ignored.
    pub reason: RejectionReason,
}

/// Reason a descriptor entry was ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionReason {
    /// Primary-key columns are never removed or retyped.
    PrimaryKey,
    /// A removal named a column the table does not have.
    NotFound,
}

/// Diff between a descriptor and the live columns of an existing table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlterationPlan {
    /// Fields to add with `ALTER TABLE ... ADD COLUMN`, in order.
    pub to_create: Vec<FieldDefinition>,
    /// Changes that would need a table rebuild.
    pub to_alter: Vec<PendingAlteration>,
    /// Entries ignored without failing the migration.
    pub rejected: Vec<Rejection>,
}

impl AlterationPlan {
    /// Returns whether the plan can be applied with column additions alone.
    pub fn is_additive(&self) -> bool {
        self.to_alter.is_empty()
    }

    /// Names of the columns that need a rebuild.
    pub fn blocking_columns(&self) -> Vec<String> {
        self.to_alter.iter().map(|a| a.column.clone()).collect()
    }
}

/// Computes the alteration plan for an existing table.
///
/// Lists are processed remove, then change, then add. A changed field the
/// table does not have becomes an addition unless `add` already names it.
/// To-many placeholder fields never become columns and are skipped. Column
/// names match case-insensitively, as SQLite resolves them. Type text is
/// compared case-insensitively, including the nullability suffix.
///
/// # Examples
///
/// ```
/// use relstore_core::{FieldDefinition, LogicalType, MigrationDescriptor};
/// use relstore_sqlite::{ColumnMetadata, plan_alteration};
///
/// let live = vec![ColumnMetadata {
///     name: "name".into(),
///     ordinal: 0,
///     type_text: "TEXT(100,0)".into(),
///     nullable: true,
///     primary: false,
///     size: Some(100),
///     scale: None,
///     default_value: None,
/// }];
/// let descriptor = MigrationDescriptor::new("people", "1.1")
///     .adding(FieldDefinition::new("name", LogicalType::Text).with_size(100))
///     .adding(FieldDefinition::new("email", LogicalType::Text));
///
/// let plan = plan_alteration(&descriptor, &live);
/// assert!(plan.is_additive());
/// assert_eq!(plan.to_create.len(), 1);
/// assert_eq!(plan.to_create[0].name, "email");
/// ```
pub fn plan_alteration(descriptor: &MigrationDescriptor, live: &[ColumnMetadata]) -> AlterationPlan {
    let find = |name: &str| live.iter().find(|column| column.name.eq_ignore_ascii_case(name));
    let mut plan = AlterationPlan::default();

    for removal in &descriptor.remove {
        match find(&removal.name) {
            Some(column) if column.primary => plan.rejected.push(Rejection {
                column: removal.name.clone(),
                reason: RejectionReason::PrimaryKey,
            }),
            Some(_) => plan.to_alter.push(PendingAlteration {
                column: removal.name.clone(),
                kind: AlterationKind::Remove,
            }),
            None => plan.rejected.push(Rejection {
                column: removal.name.clone(),
                reason: RejectionReason::NotFound,
            }),
        }
    }

    let already_added = |name: &str| {
        descriptor
            .add
            .iter()
            .any(|field| field.name.eq_ignore_ascii_case(name))
    };
    for field in descriptor.change.iter().filter(|field| !field.many) {
        match find(&field.name) {
            None if already_added(&field.name) => {}
            None => plan.to_create.push(field.clone()),
            Some(column) => compare_column(&mut plan, field, column),
        }
    }

    for field in descriptor.add.iter().filter(|field| !field.many) {
        match find(&field.name) {
            None => plan.to_create.push(field.clone()),
            Some(column) => compare_column(&mut plan, field, column),
        }
    }

    plan
}

fn compare_column(plan: &mut AlterationPlan, field: &FieldDefinition, column: &ColumnMetadata) {
    if column.primary {
        plan.rejected.push(Rejection {
            column: field.name.clone(),
            reason: RejectionReason::PrimaryKey,
        });
        return;
    }
    let wanted = map_type(field);
    let current = column.declared_type();
    if !wanted.eq_ignore_ascii_case(&current) {
        plan.to_alter.push(PendingAlteration {
            column: field.name.clone(),
            kind: AlterationKind::ChangeType {
                from: current,
                to: wanted,
            },
        });
    }
}

impl SqliteAdapter {
    /// Applies a migration descriptor to its table, in one transaction.
    ///
    /// Sets `descriptor.updated` when the table was already at or beyond the
    /// descriptor's version, in which case no statement other than reads is
    /// issued.
    ///
    /// # Errors
    ///
    /// - [`AdapterError::InvalidDescriptor`] if the descriptor fails validation
    /// - [`AdapterError::UnsupportedMigration`] if the change is not additive
    /// - [`AdapterError::Execution`] if any statement fails
    pub fn migrate(&mut self, descriptor: &mut MigrationDescriptor) -> Result<MigrationOutcome> {
        let problems = validate_descriptor(descriptor);
        if !problems.is_empty() {
            let messages: Vec<String> = problems.iter().map(ToString::to_string).collect();
            return Err(AdapterError::InvalidDescriptor(messages.join("; ")));
        }

        let outcome = self.execute_in_transaction(|adapter| adapter.reconcile(descriptor))?;
        descriptor.updated = outcome == MigrationOutcome::AlreadyApplied;
        if outcome.is_applied() {
            info!(
                table = %descriptor.applies_to,
                version = %descriptor.version,
                outcome = %outcome,
                "Applied migration"
            );
        } else {
            debug!(
                table = %descriptor.applies_to,
                version = %descriptor.version,
                "Migration already applied"
            );
        }
        Ok(outcome)
    }

    fn reconcile(&mut self, descriptor: &MigrationDescriptor) -> Result<MigrationOutcome> {
        self.ensure_ledger()?;

        let table = descriptor.applies_to.as_str();
        let live_version = self.version(table)?;
        if compare_versions(&live_version, &descriptor.version) != Ordering::Less {
            return Ok(MigrationOutcome::AlreadyApplied);
        }

        let outcome = if self.table_exists(table)? {
            debug!(table, "Reconciling existing table");
            let live = self.columns(table)?;
            let plan = plan_alteration(descriptor, &live);
            for rejection in &plan.rejected {
                debug!(table, column = %rejection.column, reason = ?rejection.reason, "Ignoring field");
            }
            if !plan.is_additive() {
                return Err(AdapterError::UnsupportedMigration {
                    table: table.to_string(),
                    columns: plan.blocking_columns(),
                });
            }
            match self.table(table).add_columns(&plan.to_create)? {
                0 => MigrationOutcome::NoOp,
                columns_added => MigrationOutcome::Altered { columns_added },
            }
        } else {
            debug!(table, "Creating table");
            self.table(table).create(&descriptor.add)?;
            MigrationOutcome::Created
        };

        self.apply_indexes(descriptor)?;
        self.execute(
            "INSERT INTO migrations(appliesTo, model, version, description) VALUES (?, ?, ?, ?)",
            &[
                Value::from(table),
                Value::from(descriptor.model.clone()),
                Value::from(descriptor.version.as_str()),
                Value::from(descriptor.description.clone()),
            ],
        )?;
        Ok(outcome)
    }

    fn apply_indexes(&mut self, descriptor: &MigrationDescriptor) -> Result<()> {
        if descriptor.indexes.is_empty() {
            return Ok(());
        }
        let mut handle = self.indexes(descriptor.applies_to.as_str());
        for wanted in &descriptor.indexes {
            let unchanged = handle
                .list()?
                .iter()
                .any(|live| live.name == wanted.name && live.same_columns(wanted));
            if unchanged {
                continue;
            }
            debug!(index = %wanted.name, "Creating index");
            handle.create(&wanted.name, &wanted.columns)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relstore_core::LogicalType;

    fn column(name: &str, type_text: &str, nullable: bool, primary: bool) -> ColumnMetadata {
        ColumnMetadata {
            name: name.to_string(),
            ordinal: 0,
            type_text: type_text.to_string(),
            nullable,
            primary,
            size: None,
            scale: None,
            default_value: None,
        }
    }

    fn live() -> Vec<ColumnMetadata> {
        vec![
            column("id", "INTEGER", false, true),
            column("name", "TEXT(100,0)", true, false),
            column("age", "INTEGER", false, false),
        ]
    }

    #[test]
    fn test_outcome_codes() {
        assert_eq!(MigrationOutcome::AlreadyApplied.code(), -1);
        assert_eq!(MigrationOutcome::Created.code(), 1);
        assert_eq!(MigrationOutcome::Altered { columns_added: 2 }.code(), 1);
        assert_eq!(MigrationOutcome::NoOp.code(), 2);
        assert!(!MigrationOutcome::AlreadyApplied.is_applied());
        assert!(MigrationOutcome::NoOp.is_applied());
    }

    #[test]
    fn test_matching_fields_are_noop() {
        let descriptor = MigrationDescriptor::new("people", "2.0")
            .adding(FieldDefinition::new("id", LogicalType::Counter))
            .adding(FieldDefinition::new("name", LogicalType::Text).with_size(100))
            .adding(FieldDefinition::new("age", LogicalType::Integer).not_null());
        let plan = plan_alteration(&descriptor, &live());
        assert!(plan.is_additive());
        assert!(plan.to_create.is_empty());
        assert_eq!(
            plan.rejected,
            vec![Rejection {
                column: "id".into(),
                reason: RejectionReason::PrimaryKey
            }]
        );
    }

    #[test]
    fn test_type_comparison_ignores_case() {
        let live = vec![column("name", "text(100,0)", true, false)];
        let descriptor = MigrationDescriptor::new("people", "2.0")
            .adding(FieldDefinition::new("name", LogicalType::Text).with_size(100));
        assert_eq!(plan_alteration(&descriptor, &live), AlterationPlan::default());
    }

    #[test]
    fn test_type_mismatch_requires_rebuild() {
        let descriptor = MigrationDescriptor::new("people", "2.0")
            .adding(FieldDefinition::new("name", LogicalType::Text).with_size(200));
        let plan = plan_alteration(&descriptor, &live());
        assert!(!plan.is_additive());
        assert_eq!(
            plan.to_alter[0].kind,
            AlterationKind::ChangeType {
                from: "TEXT(100,0) NULL".into(),
                to: "TEXT(200,0) NULL".into()
            }
        );
        assert_eq!(plan.blocking_columns(), vec!["name"]);
    }

    #[test]
    fn test_nullability_change_requires_rebuild() {
        let descriptor = MigrationDescriptor::new("people", "2.0")
            .changing(FieldDefinition::new("age", LogicalType::Integer));
        let plan = plan_alteration(&descriptor, &live());
        assert_eq!(plan.blocking_columns(), vec!["age"]);
    }

    #[test]
    fn test_remove_classification() {
        let descriptor = MigrationDescriptor::new("people", "2.0")
            .removing("id")
            .removing("age")
            .removing("ghost");
        let plan = plan_alteration(&descriptor, &live());
        assert_eq!(
            plan.to_alter,
            vec![PendingAlteration {
                column: "age".into(),
                kind: AlterationKind::Remove
            }]
        );
        let reasons: Vec<RejectionReason> = plan.rejected.iter().map(|r| r.reason).collect();
        assert_eq!(
            reasons,
            vec![RejectionReason::PrimaryKey, RejectionReason::NotFound]
        );
    }

    #[test]
    fn test_change_of_missing_column_becomes_addition() {
        let descriptor = MigrationDescriptor::new("people", "2.0")
            .changing(FieldDefinition::new("email", LogicalType::Text))
            .changing(FieldDefinition::new("phone", LogicalType::Text))
            .adding(FieldDefinition::new("phone", LogicalType::Text));
        let plan = plan_alteration(&descriptor, &live());
        let names: Vec<&str> = plan.to_create.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["email", "phone"]);
    }

    #[test]
    fn test_column_names_match_ignoring_case() {
        let descriptor = MigrationDescriptor::new("people", "2.0")
            .adding(FieldDefinition::new("NAME", LogicalType::Text).with_size(100))
            .changing(FieldDefinition::new("Age", LogicalType::Text))
            .changing(FieldDefinition::new("Email", LogicalType::Text))
            .adding(FieldDefinition::new("email", LogicalType::Text))
            .removing("ID");
        let plan = plan_alteration(&descriptor, &live());
        assert_eq!(plan.blocking_columns(), vec!["Age"]);
        let names: Vec<&str> = plan.to_create.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["email"]);
        assert_eq!(plan.rejected[0].reason, RejectionReason::PrimaryKey);
    }

    #[test]
    fn test_re_adding_column_in_other_case_is_noop() {
        let mut adapter = SqliteAdapter::new(crate::config::AdapterOptions::memory());
        let mut first = MigrationDescriptor::new("t", "1.0")
            .adding(FieldDefinition::new("Email", LogicalType::Text));
        adapter.migrate(&mut first).unwrap();

        let mut second = MigrationDescriptor::new("t", "1.1")
            .adding(FieldDefinition::new("email", LogicalType::Text));
        assert_eq!(adapter.migrate(&mut second).unwrap(), MigrationOutcome::NoOp);
        assert_eq!(adapter.columns("t").unwrap().len(), 1);
    }

    #[test]
    fn test_change_of_primary_is_rejected() {
        let descriptor = MigrationDescriptor::new("people", "2.0")
            .changing(FieldDefinition::new("id", LogicalType::Guid));
        let plan = plan_alteration(&descriptor, &live());
        assert!(plan.is_additive());
        assert_eq!(plan.rejected.len(), 1);
    }

    #[test]
    fn test_to_many_fields_are_skipped() {
        let descriptor = MigrationDescriptor::new("people", "2.0")
            .adding(FieldDefinition::new("friends", LogicalType::Integer).to_many());
        assert_eq!(plan_alteration(&descriptor, &live()), AlterationPlan::default());
    }

    #[test]
    fn test_invalid_descriptor_rejected_before_io() {
        let mut adapter = SqliteAdapter::new(crate::config::AdapterOptions::new(
            "/nonexistent-dir/relstore/never.db",
        ));
        let mut descriptor = MigrationDescriptor::new("", "1.0");
        let err = adapter.migrate(&mut descriptor).unwrap_err();
        assert!(matches!(err, AdapterError::InvalidDescriptor(_)));
        assert!(!adapter.is_open());
    }

    #[test]
    fn test_noop_still_records_version() {
        let mut adapter = SqliteAdapter::new(crate::config::AdapterOptions::memory());
        let mut first = MigrationDescriptor::new("t", "1.0")
            .adding(FieldDefinition::new("a", LogicalType::Integer));
        adapter.migrate(&mut first).unwrap();

        let mut second = MigrationDescriptor::new("t", "1.1")
            .adding(FieldDefinition::new("a", LogicalType::Integer));
        assert_eq!(adapter.migrate(&mut second).unwrap(), MigrationOutcome::NoOp);
        assert_eq!(adapter.version("t").unwrap(), "1.1");
    }
}
