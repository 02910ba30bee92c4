// Migration Runner
// Opens a fresh engine per run and issues a single directive to it

use std::sync::Arc;

use tracing::{error, info};

use crate::config::DatabaseConfig;
use crate::domain::{MigrationDirection, MigrationOutcome, SchemaVersion};
use crate::error::{AppError, Result};
use crate::port::{FatalReporter, MigrationEngine, MigrationEngineFactory, MigrationError};

/// Runs migrations through an injected engine factory.
///
/// Failures other than "no change" are handed to the [`FatalReporter`]
/// and then returned; the reporter decides whether the process survives.
pub struct MigrationRunner {
    factory: Arc<dyn MigrationEngineFactory>,
    reporter: Arc<dyn FatalReporter>,
}

impl MigrationRunner {
    pub fn new(factory: Arc<dyn MigrationEngineFactory>, reporter: Arc<dyn FatalReporter>) -> Self {
        Self { factory, reporter }
    }

    /// Apply one directive against the database described by `config`.
    ///
    /// # Returns
    /// `MigrationOutcome::NoChange` when the engine had nothing to do
    ///
    /// # Errors
    /// - AppError::Migration for engine construction or migration failure
    ///   (reported as fatal first)
    pub async fn migrate(
        &self,
        config: &DatabaseConfig,
        direction: MigrationDirection,
    ) -> Result<MigrationOutcome> {
        let config = config.clone().with_defaults();

        info!(
            direction = %direction,
            url = %config.redacted_url(),
            source = %config.migration_path,
            "Attempting migration"
        );

        let mut engine = self.open_engine(&config).await?;

        let result = match direction {
            MigrationDirection::Up => engine.up().await,
            MigrationDirection::Down => engine.down().await,
            MigrationDirection::Force(version) => engine.force(version).await,
        };

        match result {
            Ok(()) => {
                info!(direction = %direction, "Migration applied");
                Ok(MigrationOutcome::Applied)
            }
            Err(MigrationError::NoChange) => {
                info!(direction = %direction, "No migration changes");
                Ok(MigrationOutcome::NoChange)
            }
            Err(e) => {
                error!(direction = %direction, error = %e, "Migration failed");
                let err = AppError::Migration(e);
                self.reporter.fatal(
                    &format!("Failed to run the {} migration", direction.as_str()),
                    &err,
                );
                Err(err)
            }
        }
    }

    /// Version currently recorded in the database, `None` if nothing is applied
    ///
    /// # Errors
    /// - AppError::Migration if the engine cannot be opened or queried
    pub async fn version(&self, config: &DatabaseConfig) -> Result<Option<SchemaVersion>> {
        let config = config.clone().with_defaults();
        let mut engine = self.open_engine(&config).await?;
        Ok(engine.version().await?)
    }

    async fn open_engine(&self, config: &DatabaseConfig) -> Result<Box<dyn MigrationEngine>> {
        match self
            .factory
            .open(&config.migration_path, &config.connection_url())
            .await
        {
            Ok(engine) => Ok(engine),
            Err(e) => {
                error!(error = %e, "Could not open the migration engine");
                let err = AppError::Migration(e);
                self.reporter.fatal("Could not run the migration", &err);
                Err(err)
            }
        }
    }
}
