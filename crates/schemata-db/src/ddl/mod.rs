//! Pure DDL statement builders.
//!
//! Each builder collects a declarative description, validates it on
//! `build()`, and hands back the SQL statements produced by the target
//! [`Dialect`]. None of them touch a connection.

pub mod add_columns;
pub mod alter_columns;
pub mod column;
pub mod create_index;
pub mod create_table;
pub mod drop_index;
pub mod rebuild;

pub use add_columns::AddColumnsBuilder;
pub use alter_columns::AlterColumnsBuilder;
pub use column::{ColumnDefinition, ColumnType, DefaultValue, UUID_SIZE, UUID_VARCHAR_SIZE};
pub use create_index::CreateIndexBuilder;
pub use create_table::CreateTableBuilder;
pub use drop_index::DropIndexBuilder;
pub use rebuild::{ExistingColumn, ExistingIndex, TableDefinition, TableRebuildBuilder};

use schemata_common::{Error, Result};

use crate::dialect::Dialect;

/// Reject names the dialect could not represent: empty, containing control
/// characters, or longer than the product's identifier limit.
pub(crate) fn validate_identifier(dialect: Dialect, kind: &str, name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::Validation(format!("{kind} name must not be empty")));
    }
    if name.chars().any(char::is_control) {
        return Err(Error::Validation(format!(
            "{kind} name {name:?} contains control characters"
        )));
    }
    let max = dialect.max_identifier_length();
    if name.chars().count() > max {
        return Err(Error::Validation(format!(
            "{kind} name {name} exceeds {max} characters allowed by {dialect}"
        )));
    }
    Ok(())
}

/// Column names must be unique within one builder call.
pub(crate) fn reject_duplicate_columns<'a>(
    kind: &str,
    names: impl IntoIterator<Item = &'a str>,
) -> Result<()> {
    let mut seen = std::collections::HashSet::new();
    for name in names {
        if !seen.insert(name.to_ascii_lowercase()) {
            return Err(Error::Validation(format!(
                "{kind}: column {name} listed more than once"
            )));
        }
    }
    Ok(())
}
