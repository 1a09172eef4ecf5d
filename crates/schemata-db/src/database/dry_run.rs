use std::collections::HashSet;

use schemata_common::{Error, Result};

use super::Database;
use crate::ddl::TableDefinition;
use crate::dialect::Dialect;
use crate::history::{AppliedMigrationRecord, insert_sql};

/// Records statements instead of executing them, including transaction
/// boundaries and history inserts, so the recording reads as a script.
/// Introspection is not available, so steps that need it fail with an
/// unsupported-operation error.
#[derive(Debug)]
pub struct DryRunDatabase {
    dialect: Dialect,
    statements: Vec<String>,
    tables: HashSet<String>,
    history: Vec<AppliedMigrationRecord>,
}

impl DryRunDatabase {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            statements: Vec::new(),
            tables: HashSet::new(),
            history: Vec::new(),
        }
    }

    /// Pretend `records` are already in the history table.
    pub fn with_applied(mut self, records: Vec<AppliedMigrationRecord>) -> Self {
        self.history = records;
        self
    }

    /// Treat `table` as existing.
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.tables.insert(table.into().to_ascii_lowercase());
        self
    }

    pub fn statements(&self) -> &[String] {
        &self.statements
    }

    pub fn take_statements(&mut self) -> Vec<String> {
        std::mem::take(&mut self.statements)
    }
}

impl Database for DryRunDatabase {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn execute(&mut self, sql: &str) -> Result<()> {
        self.statements.push(sql.to_string());
        Ok(())
    }

    fn begin(&mut self) -> Result<()> {
        self.statements
            .push(self.dialect.begin_transaction_sql().to_string());
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.statements.push("COMMIT".to_string());
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        Ok(())
    }

    fn table_exists(&mut self, table: &str) -> Result<bool> {
        Ok(self.tables.contains(&table.to_ascii_lowercase()))
    }

    fn table_definition(&mut self, _table: &str) -> Result<Option<TableDefinition>> {
        Err(Error::unsupported(
            self.dialect.id(),
            "table introspection during dry run",
        ))
    }

    fn applied_migrations(&mut self, _history_table: &str) -> Result<Vec<AppliedMigrationRecord>> {
        let mut records = self.history.clone();
        records.sort_by_key(|r| r.version);
        Ok(records)
    }

    fn record_migration(
        &mut self,
        history_table: &str,
        record: &AppliedMigrationRecord,
    ) -> Result<()> {
        self.statements
            .push(insert_sql(self.dialect, history_table, record));
        self.history.push(record.clone());
        Ok(())
    }

    fn try_acquire_lock(&mut self, _lock_table: &str, _owner: &str) -> Result<()> {
        Ok(())
    }

    fn release_lock(&mut self, _lock_table: &str) -> Result<()> {
        Ok(())
    }
}
