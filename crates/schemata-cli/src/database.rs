use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use schemata_config::AppConfig;
use schemata_db::{AppliedMigrationRecord, Dialect, MigrationRunner, SqliteDatabase};
use tracing::warn;

const DEFAULT_DB_FILE: &str = "schemata.db";

pub fn is_configured(config: &AppConfig) -> bool {
    config.database.url.is_some() || config.database.data_dir.is_some()
}

/// Dialect from the explicit setting, else the URL scheme, else SQLite.
pub fn dialect(config: &AppConfig) -> Result<Dialect> {
    if let Some(id) = &config.database.dialect {
        return id.parse().context("invalid database.dialect");
    }
    match &config.database.url {
        Some(url) => Dialect::from_url(url).context("invalid database.url"),
        None => Ok(Dialect::Sqlite),
    }
}

pub fn sqlite_path(config: &AppConfig, config_dir: &Path) -> PathBuf {
    if let Some(url) = &config.database.url {
        return PathBuf::from(strip_sqlite_scheme(url));
    }
    config
        .database
        .data_dir
        .clone()
        .unwrap_or_else(|| config_dir.to_path_buf())
        .join(DEFAULT_DB_FILE)
}

fn strip_sqlite_scheme(url: &str) -> &str {
    let url = url.strip_prefix("jdbc:").unwrap_or(url);
    let rest = url
        .strip_prefix("sqlite:")
        .or_else(|| url.strip_prefix("file:"))
        .unwrap_or(url);
    rest.strip_prefix("//").unwrap_or(rest)
}

/// Open the configured database. Only SQLite is migrated directly; other
/// dialects are served by `plan`.
pub fn open(config: &AppConfig, config_dir: &Path) -> Result<SqliteDatabase> {
    let dialect = dialect(config)?;
    if dialect != Dialect::Sqlite {
        bail!(
            "{dialect} databases cannot be migrated directly; run `schemata plan --dialect {dialect}` and apply the SQL with your database tooling"
        );
    }

    let path = sqlite_path(config, config_dir);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    SqliteDatabase::open(&path)
        .with_context(|| format!("failed to open database {}", path.display()))
}

/// History `plan` starts from. Only a configured SQLite database is read;
/// `None` means no history table, so the plan creates one.
pub fn plan_history(
    runner: &MigrationRunner,
    config: &AppConfig,
    config_dir: &Path,
    fresh: bool,
) -> Result<Option<Vec<AppliedMigrationRecord>>> {
    if fresh || !is_configured(config) {
        return Ok(None);
    }
    let dialect = dialect(config)?;
    if dialect != Dialect::Sqlite {
        warn!("cannot read {dialect} history directly; planning from an empty history");
        return Ok(None);
    }
    let mut db = open(config, config_dir)?;
    runner
        .history(&mut db)
        .context("failed to read migration history")
}

/// Location shown to the user, with the home directory abbreviated.
pub fn describe(config: &AppConfig, config_dir: &Path) -> String {
    let path = sqlite_path(config, config_dir);
    match std::env::var("HOME") {
        Ok(home) if !home.is_empty() => path.to_string_lossy().replace(&home, "~"),
        _ => path.to_string_lossy().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemata_db::catalog::builtin_registry;

    fn config_with_url(url: &str) -> AppConfig {
        let mut config = AppConfig::default();
        config.database.url = Some(url.to_string());
        config
    }

    #[test]
    fn strips_sqlite_url_schemes() {
        assert_eq!(strip_sqlite_scheme("sqlite:///var/db/app.db"), "/var/db/app.db");
        assert_eq!(strip_sqlite_scheme("sqlite:app.db"), "app.db");
        assert_eq!(strip_sqlite_scheme("jdbc:sqlite:/tmp/x.db"), "/tmp/x.db");
        assert_eq!(strip_sqlite_scheme("/plain/path.db"), "/plain/path.db");
    }

    #[test]
    fn dialect_resolution_order() {
        assert_eq!(dialect(&AppConfig::default()).unwrap(), Dialect::Sqlite);
        assert_eq!(
            dialect(&config_with_url("postgres://localhost/app")).unwrap(),
            Dialect::PostgreSql
        );

        let mut config = config_with_url("postgres://localhost/app");
        config.database.dialect = Some("h2".into());
        assert_eq!(dialect(&config).unwrap(), Dialect::H2);
    }

    #[test]
    fn default_path_is_under_config_dir() {
        let path = sqlite_path(&AppConfig::default(), Path::new("/home/u/.schemata"));
        assert_eq!(path, PathBuf::from("/home/u/.schemata/schemata.db"));
    }

    #[test]
    fn non_sqlite_database_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let err = open(&config_with_url("mysql://db/app"), dir.path()).unwrap_err();
        assert!(err.to_string().contains("plan --dialect mysql"));
    }

    #[test]
    fn opens_file_under_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.database.data_dir = Some(dir.path().join("nested"));
        open(&config, dir.path()).unwrap();
        assert!(dir.path().join("nested").join(DEFAULT_DB_FILE).is_file());
    }

    #[test]
    fn plan_history_skips_non_sqlite_databases() {
        let dir = tempfile::tempdir().unwrap();
        let runner = MigrationRunner::new(builtin_registry().unwrap());
        let history = plan_history(
            &runner,
            &config_with_url("postgres://localhost/app"),
            dir.path(),
            false,
        )
        .unwrap();
        assert!(history.is_none());
    }

    #[test]
    fn plan_history_reads_sqlite_history() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.database.data_dir = Some(dir.path().to_path_buf());
        let runner = MigrationRunner::new(builtin_registry().unwrap());

        assert!(plan_history(&runner, &config, dir.path(), false).unwrap().is_none());

        let mut db = open(&config, dir.path()).unwrap();
        runner.run_pending(&mut db).unwrap();
        drop(db);

        let history = plan_history(&runner, &config, dir.path(), false)
            .unwrap()
            .unwrap();
        assert_eq!(history.len(), runner.registry().len());
        assert!(plan_history(&runner, &config, dir.path(), true).unwrap().is_none());
    }
}
