mod database;
mod output;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use schemata_common::Error;
use schemata_config::{AppConfig, ConfigLoader};
use schemata_db::catalog::builtin_registry;
use schemata_db::{Dialect, MigrationRunner};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "schemata", version, about = "Versioned, dialect-aware schema migrations")]
struct Cli {
    /// Path to config file (defaults to ~/.schemata/config.yml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database URL, overrides the config file and SCHEMATA_DATABASE_URL
    #[arg(short, long, global = true)]
    database: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show applied and pending migrations
    Status {
        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },
    /// Apply every pending migration
    Up,
    /// Print the SQL pending migrations would run, without executing it
    Plan {
        /// Target dialect (h2, postgresql, mysql, oracle, mssql, sqlite)
        #[arg(long)]
        dialect: Dialect,

        /// Plan from an empty history instead of reading the configured database
        #[arg(long)]
        fresh: bool,

        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },
    /// Release the migration lock left behind by a run that did not finish
    Unlock,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let (config, config_dir) = load_config(&cli)?;
    init_tracing(&config);

    let runner = runner(&config)?;

    match cli.command {
        Commands::Status { json } => {
            let mut db = database::open(&config, &config_dir)?;
            let status = runner
                .status(&mut db)
                .context("failed to read migration status")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                output::print_status(&status, &database::describe(&config, &config_dir));
            }
        }
        Commands::Up => {
            let mut db = database::open(&config, &config_dir)?;
            let report = match runner.run_pending(&mut db) {
                Ok(report) => report,
                Err(e @ Error::Locked(_)) => {
                    return Err(anyhow::Error::new(e).context(
                        "another run holds the migration lock; if it crashed, run `schemata unlock`",
                    ));
                }
                Err(e) => return Err(anyhow::Error::new(e).context("migration run failed")),
            };
            info!(
                applied = report.applied.len(),
                "database at version {}",
                report
                    .current_version
                    .map_or_else(|| "none".to_string(), |v| v.to_string())
            );
            output::print_report(&report);
        }
        Commands::Plan {
            dialect,
            fresh,
            json,
        } => {
            let applied = database::plan_history(&runner, &config, &config_dir, fresh)?;
            let plan = runner
                .plan(dialect, applied.as_deref())
                .with_context(|| format!("failed to plan migrations for {dialect}"))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&plan)?);
            } else {
                output::print_plan(&plan);
            }
        }
        Commands::Unlock => {
            let mut db = database::open(&config, &config_dir)?;
            if runner
                .force_unlock(&mut db)
                .context("failed to release the migration lock")?
            {
                println!("Migration lock released.");
            } else {
                println!("No migration lock table; nothing to release.");
            }
        }
    }

    Ok(())
}

fn load_config(cli: &Cli) -> Result<(AppConfig, PathBuf)> {
    let (mut config, config_dir) = match &cli.config {
        Some(path) => {
            let mut config = ConfigLoader::load_from(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?;
            schemata_config::loader::apply_env_overrides(&mut config, |key| {
                std::env::var(key).ok()
            });
            let dir = path
                .parent()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            (config, dir)
        }
        None => {
            let loader = ConfigLoader::new().context("failed to locate config directory")?;
            let config = loader.load().context("failed to load config")?;
            (config, loader.config_dir().to_path_buf())
        }
    };

    if let Some(url) = &cli.database {
        config.database.url = Some(url.clone());
    }
    Ok((config, config_dir))
}

fn runner(config: &AppConfig) -> Result<MigrationRunner> {
    let registry = builtin_registry().context("invalid built-in migration registry")?;
    let mut runner = MigrationRunner::new(registry)
        .with_history_table(&config.migrations.history_table)
        .with_lock_table(&config.migrations.lock_table);
    if !config.migrations.lock {
        runner = runner.without_lock();
    }
    Ok(runner)
}

/// Logs go to stderr so `--json` output stays parseable. `RUST_LOG` wins over
/// the configured level.
fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log.level));

    let (plain, json) = if config.log.json {
        (
            None,
            Some(fmt::layer().json().with_writer(std::io::stderr)),
        )
    } else {
        (Some(fmt::layer().with_writer(std::io::stderr)), None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(plain)
        .with(json)
        .init();
}
