use std::path::{Path, PathBuf};

use schemata_common::{Error, Result};
use tracing::{debug, info};

use crate::model::AppConfig;

const CONFIG_FILENAMES: [&str; 3] = ["config.yml", "config.yaml", "config.toml"];

pub const ENV_DATABASE_URL: &str = "SCHEMATA_DATABASE_URL";
pub const ENV_DIALECT: &str = "SCHEMATA_DIALECT";

/// Locates and parses the configuration file, then layers environment
/// overrides on top.
pub struct ConfigLoader {
    config_dir: PathBuf,
}

impl ConfigLoader {
    /// Loader rooted at `~/.schemata`.
    pub fn new() -> Result<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Config("could not determine home directory".into()))?;
        Ok(Self {
            config_dir: home.join(".schemata"),
        })
    }

    pub fn with_dir(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// First existing `config.{yml,yaml,toml}` in the config directory.
    pub fn config_path(&self) -> Option<PathBuf> {
        CONFIG_FILENAMES
            .iter()
            .map(|name| self.config_dir.join(name))
            .find(|p| p.is_file())
    }

    /// Load the config file if present (defaults otherwise) and apply
    /// environment overrides.
    pub fn load(&self) -> Result<AppConfig> {
        let mut config = match self.config_path() {
            Some(path) => Self::load_from(&path)?,
            None => {
                debug!(
                    "no config file in {}, using defaults",
                    self.config_dir.display()
                );
                AppConfig::default()
            }
        };
        apply_env_overrides(&mut config, |key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<AppConfig> {
        let contents = std::fs::read_to_string(path)?;
        let config = parse_config(path, &contents)?;
        info!("loaded config from {}", path.display());
        Ok(config)
    }
}

fn parse_config(path: &Path, contents: &str) -> Result<AppConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    match ext {
        "yml" | "yaml" => serde_yaml::from_str(contents)
            .map_err(|e| Error::Config(format!("YAML parse error in {}: {e}", path.display()))),
        "toml" => toml::from_str(contents)
            .map_err(|e| Error::Config(format!("TOML parse error in {}: {e}", path.display()))),
        other => Err(Error::Config(format!(
            "unsupported config extension: {other}"
        ))),
    }
}

/// Environment values win over file values.
pub fn apply_env_overrides(config: &mut AppConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(url) = lookup(ENV_DATABASE_URL).filter(|v| !v.is_empty()) {
        config.database.url = Some(url);
    }
    if let Some(dialect) = lookup(ENV_DIALECT).filter(|v| !v.is_empty()) {
        config.database.dialect = Some(dialect);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ConfigLoader::with_dir(dir.path());
        assert!(loader.config_path().is_none());
        let config = loader.load().unwrap();
        assert_eq!(config.migrations.history_table, "schema_migrations");
    }

    #[test]
    fn loads_yaml_config_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.yml"),
            "database:\n  dialect: mysql\nmigrations:\n  lock: false\n",
        )
        .unwrap();

        let loader = ConfigLoader::with_dir(dir.path());
        let config = ConfigLoader::load_from(&loader.config_path().unwrap()).unwrap();
        assert_eq!(config.database.dialect.as_deref(), Some("mysql"));
        assert!(!config.migrations.lock);
    }

    #[test]
    fn rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.ini");
        std::fs::write(&path, "x=1").unwrap();
        let err = ConfigLoader::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("unsupported config extension: ini"));
    }

    #[test]
    fn malformed_toml_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[database\nurl = ").unwrap();
        let err = ConfigLoader::load_from(&path).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn env_overrides_replace_file_values() {
        let mut config = AppConfig::default();
        config.database.url = Some("sqlite://old.db".into());

        apply_env_overrides(&mut config, |key| match key {
            ENV_DATABASE_URL => Some("sqlite://new.db".into()),
            ENV_DIALECT => Some(String::new()),
            _ => None,
        });

        assert_eq!(config.database.url.as_deref(), Some("sqlite://new.db"));
        assert!(config.database.dialect.is_none());
    }
}
