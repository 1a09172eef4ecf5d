//! The live database the engine migrates.
//!
//! [`SqliteDatabase`] executes against a rusqlite connection.
//! [`DryRunDatabase`] records statements for any dialect without executing
//! them, which is how the `plan` command previews a migration.

mod dry_run;
mod sqlite;

pub use dry_run::DryRunDatabase;
pub use sqlite::SqliteDatabase;

use schemata_common::Result;

use crate::ddl::TableDefinition;
use crate::dialect::Dialect;
use crate::history::AppliedMigrationRecord;

/// Connection handle plus the catalog queries the engine needs. Every method
/// takes `&mut self`: one caller owns the connection for a whole step.
pub trait Database {
    fn dialect(&self) -> Dialect;

    /// Execute a single statement with no result set.
    fn execute(&mut self, sql: &str) -> Result<()>;

    fn begin(&mut self) -> Result<()>;
    fn commit(&mut self) -> Result<()>;
    fn rollback(&mut self) -> Result<()>;

    fn table_exists(&mut self, table: &str) -> Result<bool>;

    /// Columns and indexes of `table`, or `None` if it does not exist.
    fn table_definition(&mut self, table: &str) -> Result<Option<TableDefinition>>;

    /// History rows ordered by version.
    fn applied_migrations(&mut self, history_table: &str) -> Result<Vec<AppliedMigrationRecord>>;

    fn record_migration(
        &mut self,
        history_table: &str,
        record: &AppliedMigrationRecord,
    ) -> Result<()>;

    /// Claim the single lock row. Fails with `Error::Locked` when another
    /// runner holds it.
    fn try_acquire_lock(&mut self, lock_table: &str, owner: &str) -> Result<()>;

    fn release_lock(&mut self, lock_table: &str) -> Result<()>;
}
