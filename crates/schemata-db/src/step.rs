use std::fmt;

use schemata_common::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::database::Database;
use crate::ddl::{AlterColumnsBuilder, TableRebuildBuilder};
use crate::dialect::Dialect;

/// Totally ordered identifier of a migration step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MigrationVersion(pub u64);

impl MigrationVersion {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for MigrationVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<u64> for MigrationVersion {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

/// Lifecycle of one step during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl StepState {
    pub fn can_transition_to(self, next: StepState) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Running, Self::Succeeded)
                | (Self::Running, Self::Failed)
        )
    }

    pub fn transition(self, next: StepState) -> Result<StepState> {
        if self.is_terminal() {
            return Err(Error::Validation(format!(
                "step already finished as {self:?}"
            )));
        }
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(Error::Validation(format!(
                "illegal step transition {self:?} -> {next:?}"
            )))
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// One unit of schema change. Implementations issue their statements through
/// the context and must not retry on their own.
pub trait MigrationStep: Send + Sync {
    fn execute(&self, ctx: &mut MigrationContext<'_>) -> Result<()>;
}

/// Adapts a closure into a [`MigrationStep`].
pub struct FnStep<F>(pub F);

impl<F> MigrationStep for FnStep<F>
where
    F: Fn(&mut MigrationContext<'_>) -> Result<()> + Send + Sync,
{
    fn execute(&self, ctx: &mut MigrationContext<'_>) -> Result<()> {
        (self.0)(ctx)
    }
}

/// Handle a step executes against. It borrows the database exclusively for
/// the lifetime of the step.
pub struct MigrationContext<'a> {
    db: &'a mut dyn Database,
    dialect: Dialect,
    executed: Vec<String>,
}

impl<'a> MigrationContext<'a> {
    pub fn new(db: &'a mut dyn Database) -> Self {
        let dialect = db.dialect();
        Self {
            db,
            dialect,
            executed: Vec::new(),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Run statements in order, stopping at the first failure.
    pub fn execute(&mut self, statements: impl IntoIterator<Item = String>) -> Result<()> {
        for sql in statements {
            debug!(dialect = %self.dialect, "executing: {sql}");
            self.db.execute(&sql)?;
            self.executed.push(sql);
        }
        Ok(())
    }

    /// Apply column changes in place, or through a table rebuild on dialects
    /// that cannot alter a column.
    pub fn alter_columns(&mut self, builder: AlterColumnsBuilder) -> Result<()> {
        if self.dialect.supports_alter_column() {
            return self.execute(builder.build()?);
        }

        builder.validate()?;
        let table = self
            .db
            .table_definition(builder.table())?
            .ok_or_else(|| {
                Error::Validation(format!("table {} does not exist", builder.table()))
            })?;
        let statements = TableRebuildBuilder::new(table)
            .update_columns(builder.columns())
            .build()?;
        self.execute(statements)
    }

    pub(crate) fn into_executed(self) -> Vec<String> {
        self.executed
    }
}
