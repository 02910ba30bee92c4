// pgkit Infrastructure - PostgreSQL Adapter
// Implements: connection manager (PgDatabase), MigrationEngine over sqlx

mod connection;
mod error;
mod migration;
mod params;

pub use connection::{connect_options, pool_options, ExecResult, PgDatabase, RowStream};
pub use error::{DbError, DbResult};
pub use migration::{SqlxMigrationEngine, SqlxMigrationEngineFactory};
pub use params::SqlParam;

// Re-exported so callers can decode rows without a direct sqlx dependency
pub use sqlx::postgres::{PgPool, PgRow};
pub use sqlx::{FromRow, Row};
