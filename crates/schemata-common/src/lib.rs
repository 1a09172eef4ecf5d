pub mod error;

pub use error::{Error, Result};

/// Table recording applied migrations.
pub const DEFAULT_HISTORY_TABLE: &str = "schema_migrations";
/// Single-row table backing the advisory migration lock.
pub const DEFAULT_LOCK_TABLE: &str = "schema_migrations_lock";
