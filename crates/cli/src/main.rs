//! pgkit CLI - migrations, connectivity checks and DSNs for one PostgreSQL database

mod logging;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use pgkit_core::application::MigrationRunner;
use pgkit_core::domain::{MigrationDirection, MigrationOutcome};
use pgkit_core::port::{FatalReporter, LogOnlyReporter};
use pgkit_core::{AppError, DatabaseConfig};
use pgkit_infra_postgres::{PgDatabase, SqlxMigrationEngineFactory};
use tracing::info;

const CONFIG_FILE_NAME: &str = "pgkit.toml";

#[derive(Parser)]
#[command(name = "pgkit")]
#[command(about = "PostgreSQL connection and migration tool", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (toml, yaml or json); PGKIT_* variables override it
    #[arg(short, long, env = "PGKIT_CONFIG", global = true)]
    config: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a migration directive (up, down, force)
    Migrate {
        /// up, down or force
        direction: String,

        /// Target version for force (-1 clears the record)
        #[arg(long, allow_negative_numbers = true)]
        version: Option<i64>,

        /// Migration directory, overrides migration_path
        #[arg(long)]
        source: Option<String>,
    },

    /// Show the recorded schema version
    Status {
        /// Migration directory, overrides migration_path
        #[arg(long)]
        source: Option<String>,
    },

    /// Connect, run SELECT 1, disconnect
    Ping,

    /// Print the connection string for libpq tools
    Dsn {
        /// Print the URL form instead
        #[arg(long)]
        url: bool,
    },
}

/// A failed migration leaves the schema in an unknown state: stop here.
struct ExitOnFatal;

impl FatalReporter for ExitOnFatal {
    fn fatal(&self, context: &str, error: &AppError) {
        tracing::error!(error = %error, "{context}");
        eprintln!("{} {}: {}", "✗".red(), context, error);
        std::process::exit(1);
    }
}

/// Explicit path (with `~` expanded), else `./pgkit.toml`, else the
/// platform config directory.
fn resolve_config_path(explicit: Option<&str>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(PathBuf::from(shellexpand::tilde(path).into_owned()));
    }

    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.exists() {
        return Some(local);
    }

    directories::ProjectDirs::from("", "", "pgkit")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
        .filter(|path| path.exists())
}

fn with_source(mut config: DatabaseConfig, source: Option<String>) -> Result<DatabaseConfig> {
    if let Some(source) = source {
        config.migration_path = source;
    }
    if config.migration_path.is_empty() {
        anyhow::bail!("No migration source configured (set migration_path or pass --source)");
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging()?;

    let config_path = resolve_config_path(cli.config.as_deref());
    let config = DatabaseConfig::load(config_path.as_deref())
        .context("Failed to load configuration")?;
    info!(
        config_file = ?config_path,
        host = %config.host,
        database = %config.database_name,
        "pgkit v{}",
        pgkit_core::VERSION
    );

    match cli.command {
        Commands::Migrate {
            direction,
            version,
            source,
        } => {
            let direction = MigrationDirection::parse(&direction, version)?;
            let config = with_source(config, source)?;

            let runner =
                MigrationRunner::new(Arc::new(SqlxMigrationEngineFactory), Arc::new(ExitOnFatal));
            match runner.migrate(&config, direction).await? {
                MigrationOutcome::Applied => {
                    println!("{} {} migration applied", "✓".green(), direction)
                }
                MigrationOutcome::NoChange => {
                    println!("{} {}: no change", "✓".green(), direction)
                }
            }
        }

        Commands::Status { source } => {
            let config = with_source(config, source)?;
            let runner = MigrationRunner::new(
                Arc::new(SqlxMigrationEngineFactory),
                Arc::new(LogOnlyReporter),
            );
            match runner.version(&config).await? {
                Some(v) if v.dirty => println!("version {} ({})", v.version, "dirty".red()),
                Some(v) => println!("version {}", v.version),
                None => println!("no migrations applied"),
            }
        }

        Commands::Ping => {
            let mut db = PgDatabase::open(config)
                .await
                .context("Could not connect to database")?;
            let (one,): (i32,) = db.get("SELECT 1", &[]).await?;
            let conf = db.config().clone();
            db.close().await?;

            println!(
                "{} connected to {} @ {}:{} (SELECT 1 = {})",
                "✓".green(),
                conf.database_name,
                conf.host,
                conf.port,
                one
            );
        }

        Commands::Dsn { url } => {
            if url {
                println!("{}", config.connection_url());
            } else {
                println!("{}", config.connection_string());
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_force_with_negative_version() {
        let cli = Cli::try_parse_from(["pgkit", "migrate", "force", "--version", "-1"]).unwrap();
        match cli.command {
            Commands::Migrate {
                direction, version, ..
            } => {
                assert_eq!(direction, "force");
                assert_eq!(version, Some(-1));
            }
            _ => panic!("expected migrate"),
        }
    }

    #[test]
    fn test_explicit_config_path_expands_tilde() {
        let path = resolve_config_path(Some("~/pgkit.toml")).unwrap();
        assert!(!path.to_string_lossy().starts_with('~'));
        assert!(path.ends_with("pgkit.toml"));
    }

    #[test]
    fn test_with_source_requires_migration_path() {
        assert!(with_source(DatabaseConfig::default(), None).is_err());

        let conf = with_source(DatabaseConfig::default(), Some("./migrations".into())).unwrap();
        assert_eq!(conf.migration_path, "./migrations");
    }
}
