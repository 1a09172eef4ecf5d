use chrono::{DateTime, Utc};
use schemata_common::Result;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::database::Database;
use crate::ddl::{ColumnDefinition, CreateTableBuilder};
use crate::dialect::Dialect;
use crate::step::MigrationVersion;

pub const LOCK_ROW_ID: i64 = 1;

/// One row of the schema history table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedMigrationRecord {
    pub version: MigrationVersion,
    pub description: String,
    pub applied_at: DateTime<Utc>,
}

impl AppliedMigrationRecord {
    pub fn now(version: MigrationVersion, description: impl Into<String>) -> Self {
        Self {
            version,
            description: description.into(),
            applied_at: Utc::now(),
        }
    }
}

/// Create the history table if it is missing.
pub fn ensure_history_table(db: &mut dyn Database, table: &str) -> Result<()> {
    if db.table_exists(table)? {
        return Ok(());
    }
    let statements = CreateTableBuilder::new(db.dialect(), table)
        .add_pk_column(ColumnDefinition::big_integer("version"))
        .add_column(ColumnDefinition::varchar("description", 255).not_null())
        .add_column(ColumnDefinition::varchar("applied_at", 40).not_null())
        .build()?;
    for sql in &statements {
        db.execute(sql)?;
    }
    info!("creating schema history table {table}");
    Ok(())
}

/// History row insert with literal values, for rendered scripts.
pub fn insert_sql(dialect: Dialect, table: &str, record: &AppliedMigrationRecord) -> String {
    format!(
        "INSERT INTO {} (version, description, applied_at) VALUES ({}, {}, {})",
        dialect.identifier(table),
        record.version,
        quote_literal(&record.description),
        quote_literal(&record.applied_at.to_rfc3339())
    )
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Create the single-row lock table if it is missing.
pub fn ensure_lock_table(db: &mut dyn Database, table: &str) -> Result<()> {
    if db.table_exists(table)? {
        return Ok(());
    }
    let statements = CreateTableBuilder::new(db.dialect(), table)
        .add_pk_column(ColumnDefinition::integer("id"))
        .add_column(ColumnDefinition::varchar("owner", 255).not_null())
        .add_column(ColumnDefinition::varchar("acquired_at", 40).not_null())
        .build()?;
    for sql in &statements {
        db.execute(sql)?;
    }
    Ok(())
}

/// Highest recorded version.
pub fn last_applied(records: &[AppliedMigrationRecord]) -> Option<MigrationVersion> {
    records.iter().map(|r| r.version).max()
}

pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| {
            // SQLite datetime('now') produces "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .map(|naive| naive.and_utc())
                .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
        })
}
