// PostgreSQL Connection Manager
// Owns one sqlx pool; every query path is guarded against a missing connection

use std::time::Duration;

use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use pgkit_core::DatabaseConfig;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgRow, PgSslMode};
use sqlx::{Connection, FromRow, PgConnection, PgPool};
use tracing::{debug, error, info, warn};

use crate::error::{DbError, DbResult};
use crate::params::{bind_all, SqlParam};

/// Upper bound for waiting on in-flight connections during `close`
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of a statement that returns no rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecResult {
    pub rows_affected: u64,
}

/// Row cursor returned by [`PgDatabase::query`]
pub type RowStream<'a> = BoxStream<'a, DbResult<PgRow>>;

/// Pooled PostgreSQL connection with configuration defaults.
///
/// `connect` and `close` take `&mut self`, so they cannot overlap with
/// queries issued through `&self`.
pub struct PgDatabase {
    pool: Option<PgPool>,
    config: DatabaseConfig,
}

impl PgDatabase {
    /// Create an unconnected manager; defaults are applied to `config`
    pub fn new(config: DatabaseConfig) -> Self {
        Self {
            pool: None,
            config: config.with_defaults(),
        }
    }

    /// Apply defaults and connect
    ///
    /// # Errors
    /// Returns the driver error if the pool cannot be opened or pinged
    pub async fn open(config: DatabaseConfig) -> DbResult<Self> {
        let mut db = Self::new(config);
        if let Err(e) = db.connect().await {
            error!(error = %e, "Error in connecting to database");
            return Err(e);
        }
        Ok(db)
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.pool.is_some()
    }

    /// Open a connection, ping it, and keep a pool built from the same options.
    ///
    /// No retry: the first refused or failed attempt is returned. An already
    /// open pool is replaced (and closed).
    ///
    /// # Errors
    /// Returns the driver error if open or ping fails
    pub async fn connect(&mut self) -> DbResult<()> {
        let pool = verified_pool(connect_options(&self.config), pool_options(&self.config)).await?;

        if let Some(previous) = self.pool.replace(pool) {
            previous.close().await;
        }

        info!(
            "connected to {} @ {}:{}",
            self.config.database_name, self.config.host, self.config.port
        );
        Ok(())
    }

    /// Raw pool access.
    ///
    /// Bypasses the not-defined guard: callers must handle `None` themselves.
    pub fn raw_pool(&self) -> Option<&PgPool> {
        self.pool.as_ref()
    }

    fn pool(&self) -> DbResult<&PgPool> {
        self.pool.as_ref().ok_or(DbError::NotDefined)
    }

    /// Run a query returning zero or more rows, scanned into `T`
    pub async fn select<T>(&self, query: &str, params: &[SqlParam]) -> DbResult<Vec<T>>
    where
        T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        let pool = self.pool()?;
        let args = bind_all(params)?;
        let rows = sqlx::query_as_with::<_, T, _>(query, args)
            .fetch_all(pool)
            .await?;
        Ok(rows)
    }

    /// Run a query returning exactly one row, scanned into `T`
    ///
    /// # Errors
    /// - DbError::Sqlx(RowNotFound) if the query returns no row
    pub async fn get<T>(&self, query: &str, params: &[SqlParam]) -> DbResult<T>
    where
        T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        let pool = self.pool()?;
        let args = bind_all(params)?;
        let row = sqlx::query_as_with::<_, T, _>(query, args)
            .fetch_one(pool)
            .await?;
        Ok(row)
    }

    /// Execute a statement that returns no rows (INSERT/UPDATE/DELETE/DDL)
    pub async fn exec(&self, query: &str, params: &[SqlParam]) -> DbResult<ExecResult> {
        let pool = self.pool()?;
        let args = bind_all(params)?;
        let result = sqlx::query_with(query, args).execute(pool).await?;
        Ok(ExecResult {
            rows_affected: result.rows_affected(),
        })
    }

    /// Stream rows for manual decoding
    pub fn query<'a>(&'a self, query: &'a str, params: &[SqlParam]) -> DbResult<RowStream<'a>> {
        let pool = self.pool()?;
        let args = bind_all(params)?;
        Ok(sqlx::query_with(query, args)
            .fetch(pool)
            .map_err(DbError::from)
            .boxed())
    }

    /// Fetch at most one row; `Ok(None)` when the query matched nothing.
    ///
    /// Not being connected is an error here too, like every other query path.
    pub async fn query_row(&self, query: &str, params: &[SqlParam]) -> DbResult<Option<PgRow>> {
        let pool = self.pool()?;
        let args = bind_all(params)?;
        let row = sqlx::query_with(query, args).fetch_optional(pool).await?;
        Ok(row)
    }

    /// Close the pool if open. Never fails; calling it again is a no-op.
    pub async fn close(&mut self) -> DbResult<()> {
        let Some(pool) = self.pool.take() else {
            return Ok(());
        };

        if tokio::time::timeout(CLOSE_TIMEOUT, pool.close()).await.is_err() {
            warn!(
                timeout_secs = CLOSE_TIMEOUT.as_secs(),
                "Failed to close database: connections still in use"
            );
        } else {
            info!(database = %self.config.database_name, "database closed");
        }
        Ok(())
    }
}

/// Driver connect options built from config (TLS disabled)
pub fn connect_options(config: &DatabaseConfig) -> PgConnectOptions {
    PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .database(&config.database_name)
        .username(&config.username)
        .password(&config.password)
        .ssl_mode(PgSslMode::Disable)
}

/// Pool limits from config.
///
/// `max_idle_connections` is the number of connections the pool keeps
/// open while idle, capped by `max_open_connections`.
pub fn pool_options(config: &DatabaseConfig) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(config.max_open_connections)
        .min_connections(
            config
                .max_idle_connections
                .min(config.max_open_connections),
        )
        .max_lifetime(Duration::from_secs(config.max_lifetime))
}

/// Connect once with `options` and ping, then return a lazy pool over them.
///
/// `PoolOptions::connect_with` retries until its acquire timeout (30 s by
/// default) before reporting a refused connection; a single connection fails
/// on the first attempt.
pub(crate) async fn verified_pool(
    options: PgConnectOptions,
    limits: PgPoolOptions,
) -> DbResult<PgPool> {
    let mut conn = PgConnection::connect_with(&options).await.map_err(|e| {
        error!(
            host = %options.get_host(),
            port = options.get_port(),
            database = options.get_database().unwrap_or_default(),
            error = %e,
            "Could not open db"
        );
        DbError::from(e)
    })?;

    if let Err(e) = conn.ping().await {
        error!(error = %e, "Could not ping db");
        return Err(e.into());
    }
    if let Err(e) = conn.close().await {
        debug!(error = %e, "Verification connection did not close cleanly");
    }

    Ok(limits.connect_lazy_with(options))
}
