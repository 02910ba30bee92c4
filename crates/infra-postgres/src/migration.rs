// Migration Engine (sqlx)
// Migrator loaded from a directory at runtime, driven over a one-connection pool

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::str::FromStr;

use async_trait::async_trait;
use pgkit_core::domain::SchemaVersion;
use pgkit_core::port::{MigrationEngine, MigrationEngineFactory, MigrationError};
use sqlx::migrate::{Migrate, MigrateError, Migrator};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{Connection, PgConnection, PgPool};
use tracing::{debug, info, warn};

use crate::connection::verified_pool;

/// Version bookkeeping table maintained by sqlx
const MIGRATIONS_TABLE: &str = "_sqlx_migrations";

/// One migration run: scripts from `source`, applied over a pool of one
/// connection.
///
/// Never hold a connection from `pool` across a `Migrator` call: the
/// migrator acquires its own and would wait on the one already checked out.
pub struct SqlxMigrationEngine {
    migrator: Migrator,
    pool: PgPool,
}

impl SqlxMigrationEngine {
    /// Load the migration scripts, then connect.
    ///
    /// `source` may be a plain path or a `file://` URL.
    ///
    /// # Errors
    /// - MigrationError::Init if the scripts cannot be read or the database
    ///   cannot be reached
    pub async fn open(source: &str, url: &str) -> Result<Self, MigrationError> {
        let path = source_path(source);
        let migrator = Migrator::new(path.clone()).await.map_err(|e| {
            MigrationError::Init(format!("migration source {}: {}", path.display(), e))
        })?;

        let options = connect_options_from_url(url)
            .map_err(|e| MigrationError::Init(format!("invalid connection URL: {e}")))?;
        let pool = verified_pool(options, PgPoolOptions::new().max_connections(1))
            .await
            .map_err(|e| MigrationError::Init(format!("could not connect: {e}")))?;

        debug!(
            source = %path.display(),
            migrations = migrator.iter().count(),
            "Migration engine ready"
        );
        Ok(Self { migrator, pool })
    }

    async fn applied_versions(&self) -> Result<BTreeSet<i64>, MigrationError> {
        let mut conn = self.pool.acquire().await.map_err(sqlx_error)?;
        conn.ensure_migrations_table().await.map_err(engine_error)?;
        let applied = conn.list_applied_migrations().await.map_err(engine_error)?;
        Ok(applied.into_iter().map(|m| m.version).collect())
    }

    async fn dirty_version(&self) -> Result<Option<i64>, MigrationError> {
        let mut conn = self.pool.acquire().await.map_err(sqlx_error)?;
        conn.ensure_migrations_table().await.map_err(engine_error)?;
        conn.dirty_version().await.map_err(engine_error)
    }

    async fn ensure_clean(&self) -> Result<(), MigrationError> {
        match self.dirty_version().await? {
            Some(version) => Err(MigrationError::Dirty(version)),
            None => Ok(()),
        }
    }

    async fn force_record(
        &self,
        conn: &mut PgConnection,
        version: i64,
    ) -> Result<(), MigrationError> {
        let mut tx = conn.begin().await.map_err(sqlx_error)?;

        if version < 0 {
            sqlx::query(&format!("DELETE FROM {MIGRATIONS_TABLE}"))
                .execute(&mut *tx)
                .await
                .map_err(sqlx_error)?;
        } else {
            let recorded: Vec<_> = self
                .migrator
                .iter()
                .filter(|m| !m.migration_type.is_down_migration() && m.version <= version)
                .collect();
            if !recorded.iter().any(|m| m.version == version) {
                return Err(MigrationError::UnknownVersion(version));
            }

            sqlx::query(&format!("DELETE FROM {MIGRATIONS_TABLE} WHERE version > $1"))
                .bind(version)
                .execute(&mut *tx)
                .await
                .map_err(sqlx_error)?;

            for migration in recorded {
                sqlx::query(&format!(
                    "INSERT INTO {MIGRATIONS_TABLE} \
                     (version, description, success, checksum, execution_time) \
                     VALUES ($1, $2, TRUE, $3, -1) \
                     ON CONFLICT (version) DO UPDATE \
                     SET success = TRUE, description = EXCLUDED.description, \
                     checksum = EXCLUDED.checksum"
                ))
                .bind(migration.version)
                .bind(&*migration.description)
                .bind(&*migration.checksum)
                .execute(&mut *tx)
                .await
                .map_err(sqlx_error)?;
            }
        }

        tx.commit().await.map_err(sqlx_error)
    }
}

#[async_trait]
impl MigrationEngine for SqlxMigrationEngine {
    async fn up(&mut self) -> Result<(), MigrationError> {
        self.ensure_clean().await?;
        let applied = self.applied_versions().await?;

        let pending = self
            .migrator
            .iter()
            .filter(|m| !m.migration_type.is_down_migration())
            .filter(|m| !applied.contains(&m.version))
            .count();
        if pending == 0 {
            return Err(MigrationError::NoChange);
        }

        info!(pending, "Applying migrations");
        self.migrator.run(&self.pool).await.map_err(engine_error)
    }

    async fn down(&mut self) -> Result<(), MigrationError> {
        self.ensure_clean().await?;
        let applied = self.applied_versions().await?;

        let Some(&latest) = applied.last() else {
            return Err(MigrationError::NoChange);
        };
        let reversible = self
            .migrator
            .iter()
            .any(|m| m.version == latest && m.migration_type.is_down_migration());
        if !reversible {
            return Err(MigrationError::Irreversible(latest));
        }

        // undo() reverts every applied version above the target
        let target = applied.iter().rev().nth(1).copied().unwrap_or(0);
        info!(version = latest, "Reverting migration");
        self.migrator
            .undo(&self.pool, target)
            .await
            .map_err(engine_error)
    }

    async fn force(&mut self, version: i64) -> Result<(), MigrationError> {
        let mut conn = self.pool.acquire().await.map_err(sqlx_error)?;
        conn.ensure_migrations_table().await.map_err(engine_error)?;
        conn.lock().await.map_err(engine_error)?;

        let result = self.force_record(&mut conn, version).await;

        // Advisory locks end with the session; report the record outcome
        if let Err(e) = conn.unlock().await {
            warn!(version, error = %e, "Failed to release migration lock");
        }
        if result.is_ok() {
            info!(version, "Forced schema version");
        }
        result
    }

    async fn version(&mut self) -> Result<Option<SchemaVersion>, MigrationError> {
        if let Some(version) = self.dirty_version().await? {
            return Ok(Some(SchemaVersion {
                version,
                dirty: true,
            }));
        }
        let applied = self.applied_versions().await?;
        Ok(applied.last().map(|&version| SchemaVersion {
            version,
            dirty: false,
        }))
    }
}

/// Opens a [`SqlxMigrationEngine`] per run
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlxMigrationEngineFactory;

#[async_trait]
impl MigrationEngineFactory for SqlxMigrationEngineFactory {
    async fn open(
        &self,
        source: &str,
        url: &str,
    ) -> Result<Box<dyn MigrationEngine>, MigrationError> {
        let engine = SqlxMigrationEngine::open(source, url).await?;
        Ok(Box::new(engine))
    }
}

// Helper functions (sqlx errors are flattened to strings for the core port)

fn engine_error(err: MigrateError) -> MigrationError {
    match err {
        MigrateError::Dirty(version) => MigrationError::Dirty(version),
        other => MigrationError::Engine(other.to_string()),
    }
}

fn sqlx_error(err: sqlx::Error) -> MigrationError {
    MigrationError::Engine(err.to_string())
}

/// Accept both `./migrations` and `file://./migrations`
fn source_path(source: &str) -> PathBuf {
    PathBuf::from(source.strip_prefix("file://").unwrap_or(source))
}

/// sqlx ignores `timezone` in URLs; move it into the startup options
fn connect_options_from_url(url: &str) -> Result<PgConnectOptions, sqlx::Error> {
    let (base, timezone) = split_timezone(url);
    let options = PgConnectOptions::from_str(&base)?;
    Ok(match timezone {
        Some(tz) => options.options([("timezone", tz)]),
        None => options,
    })
}

fn split_timezone(url: &str) -> (String, Option<String>) {
    let Some((base, query)) = url.split_once('?') else {
        return (url.to_string(), None);
    };

    let mut timezone = None;
    let rest: Vec<&str> = query
        .split('&')
        .filter(|pair| match pair.split_once('=') {
            Some((key, value)) if key.eq_ignore_ascii_case("timezone") => {
                timezone = Some(value.to_string());
                false
            }
            _ => !pair.is_empty(),
        })
        .collect();

    if rest.is_empty() {
        (base.to_string(), timezone)
    } else {
        (format!("{}?{}", base, rest.join("&")), timezone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_path_strips_file_scheme() {
        assert_eq!(source_path("file://./migrations"), PathBuf::from("./migrations"));
        assert_eq!(source_path("/srv/migrations"), PathBuf::from("/srv/migrations"));
    }

    #[test]
    fn test_split_timezone() {
        let (base, tz) = split_timezone("postgres://u:p@h:1/d?sslmode=disable&timezone=UTC");
        assert_eq!(base, "postgres://u:p@h:1/d?sslmode=disable");
        assert_eq!(tz.as_deref(), Some("UTC"));

        let (base, tz) = split_timezone("postgres://u:p@h:1/d?timezone=UTC");
        assert_eq!(base, "postgres://u:p@h:1/d");
        assert_eq!(tz.as_deref(), Some("UTC"));

        let (base, tz) = split_timezone("postgres://u:p@h:1/d");
        assert_eq!(base, "postgres://u:p@h:1/d");
        assert!(tz.is_none());
    }

    #[test]
    fn test_connect_options_from_url() {
        let opts =
            connect_options_from_url("postgres://u:p@h:1/d?sslmode=disable&timezone=UTC").unwrap();
        assert_eq!(opts.get_host(), "h");
        assert_eq!(opts.get_port(), 1);
        assert_eq!(opts.get_username(), "u");
        assert_eq!(opts.get_database(), Some("d"));
        assert!(opts.get_options().unwrap_or_default().contains("timezone=UTC"));
    }

    #[test]
    fn test_connect_options_from_config_url_with_reserved_password() {
        let conf = pgkit_core::DatabaseConfig {
            host: "h".to_string(),
            port: 1,
            database_name: "d".to_string(),
            username: "svc@corp".to_string(),
            password: "p@ss#1/x?".to_string(),
            ..Default::default()
        };
        let opts = connect_options_from_url(&conf.connection_url()).unwrap();
        assert_eq!(opts.get_host(), "h");
        assert_eq!(opts.get_port(), 1);
        assert_eq!(opts.get_username(), "svc@corp");
        assert_eq!(opts.get_database(), Some("d"));
        assert!(opts.get_options().unwrap_or_default().contains("timezone=UTC"));
    }

    #[test]
    fn test_engine_error_keeps_dirty_version() {
        assert_eq!(engine_error(MigrateError::Dirty(4)), MigrationError::Dirty(4));
    }

    #[tokio::test]
    async fn test_open_missing_source_is_init_error() {
        let result = SqlxMigrationEngine::open(
            "file:///nonexistent/pgkit/migrations",
            "postgres://postgres:pw@localhost:5432/app?sslmode=disable&timezone=UTC",
        )
        .await;
        let Err(err) = result else {
            panic!("open should fail for a missing source");
        };
        assert!(matches!(err, MigrationError::Init(_)));
    }
}
