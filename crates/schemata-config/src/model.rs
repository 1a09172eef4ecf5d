use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use schemata_common::{DEFAULT_HISTORY_TABLE, DEFAULT_LOCK_TABLE};

/// Top-level configuration file contents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub migrations: MigrationsConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Connection URL, e.g. `sqlite:///var/lib/app/app.db`. The dialect is
    /// detected from the scheme unless `dialect` is set.
    pub url: Option<String>,
    /// Explicit dialect id (`sqlite`, `postgresql`, `mysql`, `oracle`,
    /// `mssql`, `h2`).
    pub dialect: Option<String>,
    /// Fallback location for the SQLite file when no URL is given.
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationsConfig {
    pub history_table: String,
    pub lock_table: String,
    /// Take the advisory lock before applying anything. Disable only when the
    /// caller already guarantees a single writer.
    pub lock: bool,
}

impl Default for MigrationsConfig {
    fn default() -> Self {
        Self {
            history_table: DEFAULT_HISTORY_TABLE.to_string(),
            lock_table: DEFAULT_LOCK_TABLE.to_string(),
            lock: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_use_standard_table_names() {
        let config = AppConfig::default();
        assert_eq!(config.migrations.history_table, "schema_migrations");
        assert_eq!(config.migrations.lock_table, "schema_migrations_lock");
        assert!(config.migrations.lock);
        assert_eq!(config.log.level, "info");
        assert!(config.database.url.is_none());
    }

    #[test]
    fn partial_yaml_fills_in_defaults() {
        let yaml = "database:\n  url: sqlite://app.db\nlog:\n  json: true\n";
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.database.url.as_deref(), Some("sqlite://app.db"));
        assert!(config.log.json);
        assert_eq!(config.log.level, "info");
        assert_eq!(config.migrations, MigrationsConfig::default());
    }

    #[test]
    fn toml_round_trips_through_model() {
        let toml_src = r#"
[database]
dialect = "postgresql"

[migrations]
history_table = "app_schema_history"
lock = false
"#;
        let config: AppConfig = toml::from_str(toml_src).unwrap();
        assert_eq!(config.database.dialect.as_deref(), Some("postgresql"));
        assert_eq!(config.migrations.history_table, "app_schema_history");
        assert!(!config.migrations.lock);
        assert_eq!(config.migrations.lock_table, DEFAULT_LOCK_TABLE);
    }
}
