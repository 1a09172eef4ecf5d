use std::path::Path;

use chrono::Utc;
use rusqlite::{Connection, ErrorCode, OptionalExtension, params};
use schemata_common::{Error, Result};
use tracing::{debug, info, warn};

use super::Database;
use crate::ddl::{ExistingColumn, ExistingIndex, TableDefinition};
use crate::dialect::Dialect;
use crate::history::{AppliedMigrationRecord, LOCK_ROW_ID, parse_datetime};
use crate::step::MigrationVersion;

/// [`Database`] backed by a rusqlite connection.
#[derive(Debug)]
pub struct SqliteDatabase {
    conn: Connection,
    in_transaction: bool,
    /// Foreign key enforcement was switched off by `begin` and is turned back
    /// on once the transaction ends.
    restore_foreign_keys: bool,
}

impl SqliteDatabase {
    pub fn open(db_path: &Path) -> Result<Self> {
        info!("opening database at {}", db_path.display());
        let conn = Connection::open(db_path)
            .map_err(|e| Error::Database(format!("failed to open database: {e}")))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(|e| Error::Database(format!("failed to set pragmas: {e}")))?;

        Ok(Self::from_connection(conn))
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Database(format!("failed to open in-memory database: {e}")))?;

        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(|e| Error::Database(format!("failed to set pragmas: {e}")))?;

        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn,
            in_transaction: false,
            restore_foreign_keys: false,
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn into_connection(self) -> Connection {
        self.conn
    }

    fn ident(&self, name: &str) -> String {
        Dialect::Sqlite.identifier(name)
    }

    fn current_lock_holder(&self, lock_table: &str) -> Result<Option<(String, String)>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT owner, acquired_at FROM {} WHERE id = ?1",
                    self.ident(lock_table)
                ),
                params![LOCK_ROW_ID],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(|e| Error::Database(format!("failed to read migration lock: {e}")))
    }

    fn foreign_keys_enabled(&self) -> Result<bool> {
        self.conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get::<_, i64>(0))
            .map(|flag| flag != 0)
            .map_err(|e| Error::Database(format!("failed to read foreign_keys pragma: {e}")))
    }

    fn set_foreign_keys(&self, enabled: bool) -> Result<()> {
        let sql = if enabled {
            "PRAGMA foreign_keys = ON"
        } else {
            "PRAGMA foreign_keys = OFF"
        };
        self.conn
            .execute_batch(sql)
            .map_err(|e| Error::Database(format!("failed to set foreign_keys pragma: {e}")))
    }

    /// First dangling reference left in the database, as `(table, rowid, parent)`.
    fn foreign_key_violation(&self) -> Result<Option<(String, Option<i64>, String)>> {
        self.conn
            .query_row("PRAGMA foreign_key_check", [], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })
            .optional()
            .map_err(|e| Error::execution("PRAGMA foreign_key_check", e))
    }

    fn finish_transaction(&mut self) -> Result<()> {
        self.in_transaction = false;
        if std::mem::take(&mut self.restore_foreign_keys) {
            self.set_foreign_keys(true)?;
        }
        Ok(())
    }
}

impl Database for SqliteDatabase {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn execute(&mut self, sql: &str) -> Result<()> {
        debug!("sqlite: {sql}");
        self.conn
            .execute_batch(sql)
            .map_err(|e| Error::execution(sql, e))
    }

    // `foreign_keys` cannot change inside a transaction, and a table rebuild
    // drops the original table, which would fire ON DELETE actions in child
    // tables. Enforcement is off for the duration of a step and the whole
    // database is checked before COMMIT instead.
    fn begin(&mut self) -> Result<()> {
        if self.in_transaction {
            return Err(Error::Database("transaction already open".into()));
        }
        let enforced = self.foreign_keys_enabled()?;
        if enforced {
            self.set_foreign_keys(false)?;
        }
        if let Err(e) = self.conn.execute_batch("BEGIN IMMEDIATE") {
            if enforced {
                self.set_foreign_keys(true)?;
            }
            return Err(Error::Database(format!("failed to begin transaction: {e}")));
        }
        self.in_transaction = true;
        self.restore_foreign_keys = enforced;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        if self.restore_foreign_keys {
            if let Some((table, rowid, parent)) = self.foreign_key_violation()? {
                let row = rowid.map_or_else(|| "a row".to_string(), |id| format!("row {id}"));
                return Err(Error::execution(
                    "PRAGMA foreign_key_check",
                    format!("foreign key violation: {row} of {table} references missing {parent}"),
                ));
            }
        }
        self.conn
            .execute_batch("COMMIT")
            .map_err(|e| Error::Database(format!("failed to commit transaction: {e}")))?;
        self.finish_transaction()
    }

    fn rollback(&mut self) -> Result<()> {
        if !self.in_transaction {
            return Ok(());
        }
        let result = self
            .conn
            .execute_batch("ROLLBACK")
            .map_err(|e| Error::Database(format!("failed to roll back transaction: {e}")));
        self.finish_transaction()?;
        result
    }

    fn table_exists(&mut self, table: &str) -> Result<bool> {
        self.conn
            .query_row(
                "SELECT count(*) > 0 FROM sqlite_master WHERE type='table' AND name=?1",
                params![table],
                |row| row.get(0),
            )
            .map_err(|e| Error::Database(format!("failed to check table {table}: {e}")))
    }

    fn table_definition(&mut self, table: &str) -> Result<Option<TableDefinition>> {
        let sql: Option<String> = self
            .conn
            .query_row(
                "SELECT sql FROM sqlite_master WHERE type='table' AND name=?1",
                params![table],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| Error::Database(format!("failed to read definition of {table}: {e}")))?;
        let Some(sql) = sql else {
            return Ok(None);
        };

        let mut stmt = self
            .conn
            .prepare(
                "SELECT name, type, \"notnull\", dflt_value
                 FROM pragma_table_info(?1)
                 ORDER BY cid",
            )
            .map_err(|e| Error::Database(format!("failed to prepare table_info query: {e}")))?;
        let columns = stmt
            .query_map(params![table], |row| {
                Ok(ExistingColumn {
                    name: row.get(0)?,
                    declared_type: row.get(1)?,
                    not_null: row.get::<_, i64>(2)? != 0,
                    default_sql: row.get(3)?,
                })
            })
            .map_err(|e| Error::Database(format!("failed to read columns of {table}: {e}")))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Database(format!("failed to read column row: {e}")))?;

        // Indexes without SQL back inline PRIMARY KEY / UNIQUE constraints and
        // come back with the table definition.
        let mut stmt = self
            .conn
            .prepare(
                "SELECT m.name, m.sql, il.\"unique\"
                 FROM sqlite_master m
                 JOIN pragma_index_list(?1) il ON il.name = m.name
                 WHERE m.type = 'index' AND m.tbl_name = ?1 AND m.sql IS NOT NULL
                 ORDER BY m.name",
            )
            .map_err(|e| Error::Database(format!("failed to prepare index query: {e}")))?;
        let indexes = stmt
            .query_map(params![table], |row| {
                Ok(ExistingIndex {
                    name: row.get(0)?,
                    sql: row.get(1)?,
                    unique: row.get::<_, i64>(2)? != 0,
                })
            })
            .map_err(|e| Error::Database(format!("failed to read indexes of {table}: {e}")))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Database(format!("failed to read index row: {e}")))?;

        let mut stmt = self
            .conn
            .prepare(
                "SELECT sql FROM sqlite_master
                 WHERE type = 'trigger' AND tbl_name = ?1 AND sql IS NOT NULL
                 ORDER BY name",
            )
            .map_err(|e| Error::Database(format!("failed to prepare trigger query: {e}")))?;
        let triggers = stmt
            .query_map(params![table], |row| row.get::<_, String>(0))
            .map_err(|e| Error::Database(format!("failed to read triggers of {table}: {e}")))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Database(format!("failed to read trigger row: {e}")))?;

        Ok(Some(TableDefinition {
            name: table.to_string(),
            sql,
            columns,
            indexes,
            triggers,
        }))
    }

    fn applied_migrations(&mut self, history_table: &str) -> Result<Vec<AppliedMigrationRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT version, description, applied_at FROM {} ORDER BY version ASC",
                self.ident(history_table)
            ))
            .map_err(|e| Error::Database(format!("failed to prepare history query: {e}")))?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .map_err(|e| Error::Database(format!("failed to query history: {e}")))?;

        let mut records = Vec::new();
        for row in rows {
            let (version, description, applied_at) =
                row.map_err(|e| Error::Database(format!("failed to read history row: {e}")))?;
            let version = u64::try_from(version).map_err(|_| {
                Error::ResumeInconsistency(format!(
                    "history table {history_table} holds negative version {version}"
                ))
            })?;
            records.push(AppliedMigrationRecord {
                version: MigrationVersion(version),
                description,
                applied_at: parse_datetime(&applied_at),
            });
        }
        Ok(records)
    }

    fn record_migration(
        &mut self,
        history_table: &str,
        record: &AppliedMigrationRecord,
    ) -> Result<()> {
        let version = i64::try_from(record.version.as_u64()).map_err(|_| {
            Error::Validation(format!("version {} does not fit in BIGINT", record.version))
        })?;
        let sql = format!(
            "INSERT INTO {} (version, description, applied_at) VALUES (?1, ?2, ?3)",
            self.ident(history_table)
        );
        self.conn
            .execute(
                &sql,
                params![version, record.description, record.applied_at.to_rfc3339()],
            )
            .map_err(|e| Error::execution(sql.as_str(), e))?;
        Ok(())
    }

    fn try_acquire_lock(&mut self, lock_table: &str, owner: &str) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} (id, owner, acquired_at) VALUES (?1, ?2, ?3)",
            self.ident(lock_table)
        );
        match self
            .conn
            .execute(&sql, params![LOCK_ROW_ID, owner, Utc::now().to_rfc3339()])
        {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                let holder = self.current_lock_holder(lock_table)?;
                let detail = match holder {
                    Some((owner, since)) => format!("held by {owner} since {since}"),
                    None => "held by another runner".to_string(),
                };
                warn!("migration lock unavailable: {detail}");
                Err(Error::Locked(detail))
            }
            Err(e) => Err(Error::execution(sql.as_str(), e)),
        }
    }

    fn release_lock(&mut self, lock_table: &str) -> Result<()> {
        let sql = format!("DELETE FROM {} WHERE id = ?1", self.ident(lock_table));
        self.conn
            .execute(&sql, params![LOCK_ROW_ID])
            .map_err(|e| Error::execution(sql.as_str(), e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{ensure_history_table, ensure_lock_table};

    #[test]
    fn table_definition_reports_columns_and_indexes() {
        let mut db = SqliteDatabase::in_memory().unwrap();
        db.execute(
            "CREATE TABLE events (id BIGINT NOT NULL, uuid VARCHAR (40) NULL, category VARCHAR (50) DEFAULT 'Other', PRIMARY KEY (id))",
        )
        .unwrap();
        db.execute("CREATE INDEX events_category ON events (category)").unwrap();

        let def = db.table_definition("events").unwrap().unwrap();
        assert_eq!(def.columns.len(), 3);
        assert!(def.sql.starts_with("CREATE TABLE events ("));
        assert!(def.column("id").unwrap().not_null);
        let uuid = def.column("uuid").unwrap();
        assert!(!uuid.not_null);
        assert_eq!(uuid.declared_type, "VARCHAR (40)");
        assert_eq!(def.column("category").unwrap().default_sql.as_deref(), Some("'Other'"));
        assert_eq!(def.indexes.len(), 1);
        assert_eq!(def.indexes[0].name, "events_category");
        assert!(!def.indexes[0].unique);

        assert!(db.table_definition("missing").unwrap().is_none());
    }

    #[test]
    fn history_round_trip() {
        let mut db = SqliteDatabase::in_memory().unwrap();
        ensure_history_table(&mut db, "schema_migrations").unwrap();
        assert!(db.applied_migrations("schema_migrations").unwrap().is_empty());

        db.record_migration(
            "schema_migrations",
            &AppliedMigrationRecord::now(MigrationVersion(2), "second"),
        )
        .unwrap();
        db.record_migration(
            "schema_migrations",
            &AppliedMigrationRecord::now(MigrationVersion(1), "first"),
        )
        .unwrap();

        let records = db.applied_migrations("schema_migrations").unwrap();
        let versions: Vec<u64> = records.iter().map(|r| r.version.as_u64()).collect();
        assert_eq!(versions, vec![1, 2]);
        assert_eq!(records[0].description, "first");
    }

    #[test]
    fn duplicate_history_version_is_rejected() {
        let mut db = SqliteDatabase::in_memory().unwrap();
        ensure_history_table(&mut db, "schema_migrations").unwrap();
        let record = AppliedMigrationRecord::now(MigrationVersion(1), "first");
        db.record_migration("schema_migrations", &record).unwrap();
        assert!(matches!(
            db.record_migration("schema_migrations", &record),
            Err(Error::Execution { .. })
        ));
    }

    #[test]
    fn rollback_discards_ddl() {
        let mut db = SqliteDatabase::in_memory().unwrap();
        db.begin().unwrap();
        db.execute("CREATE TABLE t (a INTEGER)").unwrap();
        db.rollback().unwrap();
        assert!(!db.table_exists("t").unwrap());

        // rollback without an open transaction is a no-op
        db.rollback().unwrap();
    }

    fn parent_and_child(db: &mut SqliteDatabase) {
        db.execute(
            "CREATE TABLE parent (id INTEGER PRIMARY KEY);
             CREATE TABLE child (id INTEGER PRIMARY KEY, parent_id INTEGER REFERENCES parent(id) ON DELETE CASCADE);
             INSERT INTO parent (id) VALUES (1);
             INSERT INTO child (id, parent_id) VALUES (10, 1);",
        )
        .unwrap();
    }

    #[test]
    fn dropping_a_parent_inside_a_step_keeps_child_rows() {
        let mut db = SqliteDatabase::in_memory().unwrap();
        parent_and_child(&mut db);

        db.begin().unwrap();
        db.execute(
            "CREATE TABLE parent_new (id INTEGER PRIMARY KEY);
             INSERT INTO parent_new (id) SELECT id FROM parent;
             DROP TABLE parent;
             ALTER TABLE parent_new RENAME TO parent;",
        )
        .unwrap();
        db.commit().unwrap();

        let children: i64 = db
            .connection()
            .query_row("SELECT count(*) FROM child", [], |row| row.get(0))
            .unwrap();
        assert_eq!(children, 1);
        assert!(db.foreign_keys_enabled().unwrap());
        assert!(db.execute("INSERT INTO child (id, parent_id) VALUES (11, 99)").is_err());
    }

    #[test]
    fn dangling_reference_fails_the_commit() {
        let mut db = SqliteDatabase::in_memory().unwrap();
        parent_and_child(&mut db);

        db.begin().unwrap();
        db.execute("INSERT INTO child (id, parent_id) VALUES (11, 99)").unwrap();
        let err = db.commit().unwrap_err();
        match err {
            Error::Execution { sql, message } => {
                assert_eq!(sql, "PRAGMA foreign_key_check");
                assert!(message.contains("child"), "{message}");
            }
            other => panic!("expected execution error, got {other:?}"),
        }

        db.rollback().unwrap();
        assert!(db.foreign_keys_enabled().unwrap());
        let children: i64 = db
            .connection()
            .query_row("SELECT count(*) FROM child", [], |row| row.get(0))
            .unwrap();
        assert_eq!(children, 1);
    }

    #[test]
    fn lock_is_exclusive_until_released() {
        let mut db = SqliteDatabase::in_memory().unwrap();
        ensure_lock_table(&mut db, "schema_migrations_lock").unwrap();

        db.try_acquire_lock("schema_migrations_lock", "runner-a").unwrap();
        let err = db
            .try_acquire_lock("schema_migrations_lock", "runner-b")
            .unwrap_err();
        assert!(matches!(err, Error::Locked(ref msg) if msg.contains("runner-a")));

        db.release_lock("schema_migrations_lock").unwrap();
        db.try_acquire_lock("schema_migrations_lock", "runner-b").unwrap();
    }

    #[test]
    fn failed_statement_reports_sql() {
        let mut db = SqliteDatabase::in_memory().unwrap();
        let err = db.execute("CREATE INDEX x ON missing (a)").unwrap_err();
        match err {
            Error::Execution { sql, .. } => assert_eq!(sql, "CREATE INDEX x ON missing (a)"),
            other => panic!("expected execution error, got {other:?}"),
        }
    }
}
