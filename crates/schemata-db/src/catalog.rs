//! Built-in migrations for the `events` table.

use schemata_common::Result;

use crate::ddl::{
    AddColumnsBuilder, AlterColumnsBuilder, ColumnDefinition, CreateIndexBuilder,
    CreateTableBuilder, UUID_SIZE, UUID_VARCHAR_SIZE,
};
use crate::registry::MigrationRegistry;
use crate::step::{MigrationContext, MigrationStep};

pub const EVENTS_TABLE: &str = "events";
pub const EVENTS_UUID_INDEX: &str = "events_uuid";

/// Registry with every built-in step.
pub fn builtin_registry() -> Result<MigrationRegistry> {
    MigrationRegistry::builder()
        .add(1u64, "create_events_table", CreateEventsTable)
        .add(2u64, "add_uuid_to_events", AddUuidToEvents)
        .add(3u64, "make_uuid_not_null_on_events", MakeUuidNotNullOnEvents)
        .build()
}

pub struct CreateEventsTable;

impl MigrationStep for CreateEventsTable {
    fn execute(&self, ctx: &mut MigrationContext<'_>) -> Result<()> {
        let dialect = ctx.dialect();
        let component_uuid = ColumnDefinition::varchar("component_uuid", UUID_VARCHAR_SIZE).not_null();

        ctx.execute(
            CreateTableBuilder::new(dialect, EVENTS_TABLE)
                .add_pk_column(ColumnDefinition::big_integer("id"))
                .add_column(ColumnDefinition::varchar("name", 400))
                .add_column(component_uuid.clone())
                .add_column(ColumnDefinition::varchar("category", 50))
                .add_column(ColumnDefinition::varchar("description", 4000))
                .add_column(ColumnDefinition::varchar("event_data", 4000))
                .add_column(ColumnDefinition::big_integer("event_date").not_null())
                .add_column(ColumnDefinition::big_integer("created_at").not_null())
                .build()?,
        )?;
        ctx.execute(
            CreateIndexBuilder::new(dialect)
                .table(EVENTS_TABLE)
                .name("events_component_uuid")
                .add_column(&component_uuid)
                .build()?,
        )
    }
}

/// Adds `events.uuid` as nullable so existing rows can be backfilled before
/// the constraint is tightened.
pub struct AddUuidToEvents;

impl MigrationStep for AddUuidToEvents {
    fn execute(&self, ctx: &mut MigrationContext<'_>) -> Result<()> {
        let statements = AddColumnsBuilder::new(ctx.dialect(), EVENTS_TABLE)
            .add_column(ColumnDefinition::varchar("uuid", UUID_SIZE))
            .build()?;
        ctx.execute(statements)
    }
}

/// Makes `events.uuid` mandatory and unique. Every row must already carry a
/// uuid; a NULL left behind makes the alter fail.
pub struct MakeUuidNotNullOnEvents;

impl MigrationStep for MakeUuidNotNullOnEvents {
    fn execute(&self, ctx: &mut MigrationContext<'_>) -> Result<()> {
        let dialect = ctx.dialect();
        let uuid = ColumnDefinition::varchar("uuid", UUID_SIZE).not_null();

        ctx.alter_columns(AlterColumnsBuilder::new(dialect, EVENTS_TABLE).update_column(uuid.clone()))?;
        ctx.execute(
            CreateIndexBuilder::new(dialect)
                .table(EVENTS_TABLE)
                .name(EVENTS_UUID_INDEX)
                .unique(true)
                .add_column(&uuid)
                .build()?,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{Database, DryRunDatabase};
    use crate::dialect::Dialect;

    fn render(step: &dyn MigrationStep, dialect: Dialect) -> Vec<String> {
        let mut db = DryRunDatabase::new(dialect);
        let mut ctx = MigrationContext::new(&mut db);
        step.execute(&mut ctx).unwrap();
        drop(ctx);
        db.take_statements()
    }

    #[test]
    fn builtin_versions_are_ordered() {
        let registry = builtin_registry().unwrap();
        let names: Vec<&str> = registry.steps().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "create_events_table",
                "add_uuid_to_events",
                "make_uuid_not_null_on_events"
            ]
        );
    }

    #[test]
    fn make_uuid_not_null_on_postgres() {
        assert_eq!(
            render(&MakeUuidNotNullOnEvents, Dialect::PostgreSql),
            vec![
                "ALTER TABLE events ALTER COLUMN uuid TYPE VARCHAR (40), ALTER COLUMN uuid SET NOT NULL",
                "CREATE UNIQUE INDEX events_uuid ON events (uuid)",
            ]
        );
    }

    #[test]
    fn make_uuid_not_null_alters_before_indexing_everywhere() {
        for dialect in [Dialect::H2, Dialect::PostgreSql, Dialect::MySql, Dialect::Oracle, Dialect::MsSql] {
            let sql = render(&MakeUuidNotNullOnEvents, dialect);
            assert!(sql.len() >= 2, "{dialect}: {sql:?}");
            assert!(sql[0].starts_with("ALTER TABLE events"), "{dialect}: {}", sql[0]);
            assert_eq!(sql.last().unwrap(), "CREATE UNIQUE INDEX events_uuid ON events (uuid)");
        }
    }

    #[test]
    fn sqlite_needs_the_live_table() {
        let mut db = DryRunDatabase::new(Dialect::Sqlite);
        let mut ctx = MigrationContext::new(&mut db);
        assert!(MakeUuidNotNullOnEvents.execute(&mut ctx).is_err());
        drop(ctx);
        assert!(db.statements().is_empty());
        assert!(!db.table_exists(EVENTS_TABLE).unwrap());
    }

    #[test]
    fn create_events_table_on_mysql_uses_innodb() {
        let sql = render(&CreateEventsTable, Dialect::MySql);
        assert!(sql[0].starts_with("CREATE TABLE events ("));
        assert!(sql[0].contains("ENGINE"));
        assert_eq!(sql[1], "CREATE INDEX events_component_uuid ON events (component_uuid)");
    }
}
