//! Applies pending steps in version order and records each one in the
//! history table.

use std::collections::HashSet;

use schemata_common::{DEFAULT_HISTORY_TABLE, DEFAULT_LOCK_TABLE, Error, Result};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::database::{Database, DryRunDatabase};
use crate::dialect::Dialect;
use crate::history::{
    AppliedMigrationRecord, ensure_history_table, ensure_lock_table, last_applied,
};
use crate::registry::{MigrationRegistry, RegisteredStep};
use crate::step::{MigrationContext, MigrationVersion, StepState};

/// Outcome of a successful `run_pending`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub previous_version: Option<MigrationVersion>,
    pub applied: Vec<MigrationVersion>,
    pub current_version: Option<MigrationVersion>,
}

impl MigrationReport {
    pub fn is_up_to_date(&self) -> bool {
        self.applied.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingMigration {
    pub version: MigrationVersion,
    pub name: String,
}

/// Applied and pending steps, without changing the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationStatus {
    pub current_version: Option<MigrationVersion>,
    pub applied: Vec<AppliedMigrationRecord>,
    pub pending: Vec<PendingMigration>,
}

/// Script the pending steps would run on one dialect. `setup` creates the
/// history table when it does not exist yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationPlan {
    pub dialect: Dialect,
    pub setup: Vec<String>,
    pub steps: Vec<PlannedStep>,
}

/// SQL a pending step would issue on a given dialect, with its transaction
/// boundaries and history insert. `error` is set when the step cannot be
/// previewed offline; planning stops there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedStep {
    pub version: MigrationVersion,
    pub name: String,
    pub statements: Vec<String>,
    pub error: Option<String>,
}

pub struct MigrationRunner {
    registry: MigrationRegistry,
    history_table: String,
    lock_table: String,
    lock: bool,
    owner: String,
}

impl MigrationRunner {
    pub fn new(registry: MigrationRegistry) -> Self {
        Self {
            registry,
            history_table: DEFAULT_HISTORY_TABLE.to_string(),
            lock_table: DEFAULT_LOCK_TABLE.to_string(),
            lock: true,
            owner: format!("schemata-{}-{}", std::process::id(), Uuid::new_v4()),
        }
    }

    pub fn with_history_table(mut self, table: impl Into<String>) -> Self {
        self.history_table = table.into();
        self
    }

    pub fn with_lock_table(mut self, table: impl Into<String>) -> Self {
        self.lock_table = table.into();
        self
    }

    /// Skip the advisory lock. Only safe when a single runner can exist.
    pub fn without_lock(mut self) -> Self {
        self.lock = false;
        self
    }

    pub fn registry(&self) -> &MigrationRegistry {
        &self.registry
    }

    pub fn history_table(&self) -> &str {
        &self.history_table
    }

    /// Apply every registered step above the last recorded version.
    pub fn run_pending(&self, db: &mut dyn Database) -> Result<MigrationReport> {
        if !self.lock {
            return self.run_unlocked(db);
        }

        ensure_lock_table(db, &self.lock_table)?;
        db.try_acquire_lock(&self.lock_table, &self.owner)?;
        let result = self.run_unlocked(db);
        match (db.release_lock(&self.lock_table), &result) {
            (Ok(()), _) => {}
            (Err(e), Ok(_)) => return Err(e),
            (Err(e), Err(_)) => warn!("failed to release migration lock: {e}"),
        }
        result
    }

    fn run_unlocked(&self, db: &mut dyn Database) -> Result<MigrationReport> {
        let dialect = db.dialect();
        ensure_history_table(db, &self.history_table)?;
        let applied = db.applied_migrations(&self.history_table)?;
        let previous_version = last_applied(&applied);
        let pending = self.pending_steps(&applied)?;

        if pending.is_empty() {
            info!(dialect = %dialect, "schema is up to date at version {}", display_version(previous_version));
            return Ok(MigrationReport {
                previous_version,
                applied: Vec::new(),
                current_version: previous_version,
            });
        }

        info!(
            dialect = %dialect,
            "{} pending migration(s) above version {}",
            pending.len(),
            display_version(previous_version)
        );

        let mut report = MigrationReport {
            previous_version,
            applied: Vec::new(),
            current_version: previous_version,
        };
        for step in pending {
            self.run_step(db, step)?;
            report.applied.push(step.version);
            report.current_version = Some(step.version);
        }
        Ok(report)
    }

    fn run_step(&self, db: &mut dyn Database, step: &RegisteredStep) -> Result<()> {
        let dialect = db.dialect();
        let state = StepState::Pending.transition(StepState::Running)?;
        info!(version = step.version.as_u64(), name = %step.name, dialect = %dialect, "applying migration");

        match self.apply(db, step) {
            Ok(executed) => {
                state.transition(StepState::Succeeded)?;
                info!(
                    version = step.version.as_u64(),
                    name = %step.name,
                    statements = executed,
                    "migration applied"
                );
                Ok(())
            }
            Err(source) => {
                state.transition(StepState::Failed)?;
                warn!(version = step.version.as_u64(), name = %step.name, "migration failed: {source}");
                if !dialect.supports_transactional_ddl() {
                    warn!(
                        version = step.version.as_u64(),
                        dialect = %dialect,
                        "{dialect} commits DDL implicitly; the step may be partially applied"
                    );
                }
                Err(Error::StepFailed {
                    version: step.version.as_u64(),
                    name: step.name.clone(),
                    source: Box::new(source),
                })
            }
        }
    }

    /// Execute the step and write its history row, inside one transaction
    /// when the dialect allows it. Returns the number of statements run.
    fn apply(&self, db: &mut dyn Database, step: &RegisteredStep) -> Result<usize> {
        let transactional = db.dialect().supports_transactional_ddl();
        if transactional {
            db.begin()?;
        }

        let result = self
            .execute_and_record(db, step)
            .and_then(|executed| {
                if transactional {
                    db.commit()?;
                }
                Ok(executed)
            });

        if result.is_err() && transactional {
            if let Err(e) = db.rollback() {
                warn!(version = step.version.as_u64(), "rollback failed: {e}");
            }
        }
        result
    }

    fn execute_and_record(&self, db: &mut dyn Database, step: &RegisteredStep) -> Result<usize> {
        let mut ctx = MigrationContext::new(db);
        step.step.execute(&mut ctx)?;
        let executed = ctx.into_executed().len();
        db.record_migration(
            &self.history_table,
            &AppliedMigrationRecord::now(step.version, step.name.clone()),
        )?;
        Ok(executed)
    }

    /// Steps above the last applied version, after checking that the history
    /// agrees with the registry.
    fn pending_steps(&self, applied: &[AppliedMigrationRecord]) -> Result<Vec<&RegisteredStep>> {
        for record in applied {
            if !self.registry.contains(record.version) {
                return Err(Error::ResumeInconsistency(format!(
                    "version {} ({}) is recorded in {} but not registered",
                    record.version, record.description, self.history_table
                )));
            }
        }

        let Some(last) = last_applied(applied) else {
            return Ok(self.registry.steps().iter().collect());
        };

        let recorded: HashSet<MigrationVersion> = applied.iter().map(|r| r.version).collect();
        if let Some(gap) = self
            .registry
            .steps()
            .iter()
            .find(|s| s.version < last && !recorded.contains(&s.version))
        {
            return Err(Error::ResumeInconsistency(format!(
                "version {} ({}) was never applied but the schema is already at version {last}",
                gap.version, gap.name
            )));
        }

        Ok(self
            .registry
            .steps()
            .iter()
            .filter(|s| s.version > last)
            .collect())
    }

    /// Recorded history, or `None` when the history table does not exist.
    pub fn history(&self, db: &mut dyn Database) -> Result<Option<Vec<AppliedMigrationRecord>>> {
        if db.table_exists(&self.history_table)? {
            db.applied_migrations(&self.history_table).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Report applied and pending steps. Does not create the history table.
    pub fn status(&self, db: &mut dyn Database) -> Result<MigrationStatus> {
        let applied = self.history(db)?.unwrap_or_default();
        let pending = self
            .pending_steps(&applied)?
            .into_iter()
            .map(|s| PendingMigration {
                version: s.version,
                name: s.name.clone(),
            })
            .collect();
        Ok(MigrationStatus {
            current_version: last_applied(&applied),
            applied,
            pending,
        })
    }

    /// Render the script pending steps would run on `dialect`, given the
    /// history in `applied` (`None` when there is no history table yet).
    /// Nothing is executed.
    pub fn plan(
        &self,
        dialect: Dialect,
        applied: Option<&[AppliedMigrationRecord]>,
    ) -> Result<MigrationPlan> {
        let records = applied.unwrap_or_default();
        let pending = self.pending_steps(records)?;
        let mut db = DryRunDatabase::new(dialect).with_applied(records.to_vec());
        if applied.is_some() {
            db = db.with_table(self.history_table.as_str());
        }
        ensure_history_table(&mut db, &self.history_table)?;
        let setup = db.take_statements();

        let mut steps = Vec::with_capacity(pending.len());
        for step in pending {
            let error = self.apply(&mut db, step).err().map(|e| e.to_string());
            let stop = error.is_some();
            steps.push(PlannedStep {
                version: step.version,
                name: step.name.clone(),
                statements: db.take_statements(),
                error,
            });
            if stop {
                break;
            }
        }
        Ok(MigrationPlan {
            dialect,
            setup,
            steps,
        })
    }

    /// Remove the lock row left behind by a runner that did not finish.
    /// Returns whether a lock table was found.
    pub fn force_unlock(&self, db: &mut dyn Database) -> Result<bool> {
        if !db.table_exists(&self.lock_table)? {
            return Ok(false);
        }
        db.release_lock(&self.lock_table)?;
        warn!(lock_table = %self.lock_table, "migration lock released by hand");
        Ok(true)
    }
}

fn display_version(version: Option<MigrationVersion>) -> String {
    version.map_or_else(|| "none".to_string(), |v| v.to_string())
}

/// Apply all pending steps of `registry` with default settings.
pub fn run_pending_migrations(
    db: &mut dyn Database,
    registry: MigrationRegistry,
) -> Result<MigrationReport> {
    MigrationRunner::new(registry).run_pending(db)
}
