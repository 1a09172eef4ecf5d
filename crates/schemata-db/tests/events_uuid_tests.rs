use schemata_common::Error;
use schemata_db::catalog::{AddUuidToEvents, CreateEventsTable, MakeUuidNotNullOnEvents, builtin_registry};
use schemata_db::{
    Database, MigrationRegistry, MigrationRunner, MigrationVersion, SqliteDatabase, UUID_SIZE,
};

fn up_to_nullable_uuid() -> MigrationRegistry {
    MigrationRegistry::builder()
        .add(1u64, "create_events_table", CreateEventsTable)
        .add(2u64, "add_uuid_to_events", AddUuidToEvents)
        .build()
        .unwrap()
}

fn insert_event(db: &SqliteDatabase, id: i64, uuid: Option<&str>) -> rusqlite::Result<usize> {
    db.connection().execute(
        "INSERT INTO events (id, name, component_uuid, event_date, created_at, uuid)
         VALUES (?1, 'Version', 'ABCD', 1000, 1000, ?2)",
        rusqlite::params![id, uuid],
    )
}

/// Full-width uuid value, as the column is sized for.
fn uuid(n: u32) -> String {
    format!("AXe{n:037}")
}

fn populated() -> SqliteDatabase {
    let mut db = SqliteDatabase::in_memory().unwrap();
    MigrationRunner::new(up_to_nullable_uuid())
        .run_pending(&mut db)
        .unwrap();
    insert_event(&db, 1, Some(&uuid(1))).unwrap();
    insert_event(&db, 2, Some(&uuid(2))).unwrap();
    db
}

#[test]
fn uuid_becomes_mandatory_and_unique() {
    let mut db = populated();
    let report = MigrationRunner::new(builtin_registry().unwrap())
        .run_pending(&mut db)
        .unwrap();
    assert_eq!(report.applied, vec![MigrationVersion(3)]);

    let def = db.table_definition("events").unwrap().unwrap();
    let uuid_col = def.column("uuid").unwrap();
    assert!(uuid_col.not_null);
    assert_eq!(uuid_col.declared_type, "VARCHAR (40)");
    assert!(def.index("events_uuid").unwrap().unique);
    assert!(def.index("events_component_uuid").is_some());

    // rows survived the rebuild
    let count: i64 = db
        .connection()
        .query_row("SELECT count(*) FROM events", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 2);

    assert_eq!(uuid(3).len(), UUID_SIZE as usize);
    assert!(insert_event(&db, 3, None).is_err());
    assert!(insert_event(&db, 3, Some(&uuid(1))).is_err());
    insert_event(&db, 3, Some(&uuid(3))).unwrap();
}

#[test]
fn rebuild_keeps_rows_of_cascading_children() {
    let mut db = populated();
    db.execute(
        "CREATE TABLE event_links (id INTEGER PRIMARY KEY, event_id BIGINT NOT NULL REFERENCES events(id) ON DELETE CASCADE)",
    )
    .unwrap();
    db.execute("INSERT INTO event_links (id, event_id) VALUES (1, 1), (2, 2)")
        .unwrap();

    MigrationRunner::new(builtin_registry().unwrap())
        .run_pending(&mut db)
        .unwrap();

    let links: i64 = db
        .connection()
        .query_row("SELECT count(*) FROM event_links", [], |row| row.get(0))
        .unwrap();
    assert_eq!(links, 2);

    // enforcement is back on once the step committed
    assert!(
        db.execute("INSERT INTO event_links (id, event_id) VALUES (3, 99)")
            .is_err()
    );
    db.connection()
        .execute("DELETE FROM events WHERE id = 1", [])
        .unwrap();
    let links: i64 = db
        .connection()
        .query_row("SELECT count(*) FROM event_links", [], |row| row.get(0))
        .unwrap();
    assert_eq!(links, 1);
}

#[test]
fn null_uuid_left_behind_fails_the_step() {
    let mut db = populated();
    insert_event(&db, 3, None).unwrap();

    let err = MigrationRunner::new(builtin_registry().unwrap())
        .run_pending(&mut db)
        .unwrap_err();
    assert!(matches!(err, Error::StepFailed { version: 3, .. }));

    // the rebuild was rolled back: still nullable, no index, no history row
    let def = db.table_definition("events").unwrap().unwrap();
    assert!(!def.column("uuid").unwrap().not_null);
    assert!(def.index("events_uuid").is_none());
    assert!(!db.table_exists("events__rebuild").unwrap());
    let versions: Vec<u64> = db
        .applied_migrations("schema_migrations")
        .unwrap()
        .iter()
        .map(|r| r.version.as_u64())
        .collect();
    assert_eq!(versions, vec![1, 2]);
}

#[test]
fn reapplying_the_step_is_detected() {
    let mut db = populated();
    MigrationRunner::new(builtin_registry().unwrap())
        .run_pending(&mut db)
        .unwrap();

    let again = MigrationRegistry::builder()
        .add(1u64, "create_events_table", CreateEventsTable)
        .add(2u64, "add_uuid_to_events", AddUuidToEvents)
        .add(3u64, "make_uuid_not_null_on_events", MakeUuidNotNullOnEvents)
        .add(4u64, "make_uuid_not_null_again", MakeUuidNotNullOnEvents)
        .build()
        .unwrap();
    let err = MigrationRunner::new(again).run_pending(&mut db).unwrap_err();

    assert!(matches!(err, Error::StepFailed { version: 4, .. }));
    match err.root_cause() {
        Error::Execution { sql, message } => {
            assert!(sql.starts_with("CREATE UNIQUE INDEX events_uuid"));
            assert!(message.contains("already exists"), "{message}");
        }
        other => panic!("expected execution error, got {other:?}"),
    }

    // the repeated rebuild was rolled back with the failed index
    let def = db.table_definition("events").unwrap().unwrap();
    assert!(def.index("events_uuid").is_some());
    assert_eq!(
        db.applied_migrations("schema_migrations").unwrap().len(),
        3
    );
}
