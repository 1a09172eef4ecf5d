//! Schema migration engine: dialect-aware DDL builders, migration steps and
//! the runner that applies them in version order.

pub mod catalog;
pub mod database;
pub mod ddl;
pub mod dialect;
pub mod history;
pub mod registry;
pub mod runner;
pub mod step;

pub use database::{Database, DryRunDatabase, SqliteDatabase};
pub use ddl::{
    AddColumnsBuilder, AlterColumnsBuilder, ColumnDefinition, ColumnType, CreateIndexBuilder,
    CreateTableBuilder, DefaultValue, DropIndexBuilder, TableRebuildBuilder, UUID_SIZE,
    UUID_VARCHAR_SIZE,
};
pub use dialect::Dialect;
pub use history::AppliedMigrationRecord;
pub use registry::{MigrationRegistry, RegisteredStep, RegistryBuilder};
pub use runner::{
    MigrationPlan, MigrationReport, MigrationRunner, MigrationStatus, PendingMigration, PlannedStep,
    run_pending_migrations,
};
pub use step::{FnStep, MigrationContext, MigrationStep, MigrationVersion, StepState};
