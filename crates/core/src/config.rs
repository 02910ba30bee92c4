// Database Configuration
// Defaults, file/env loading, and connection string formatting

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 5432;
pub const DEFAULT_USERNAME: &str = "postgres";
pub const DEFAULT_MAX_IDLE_CONNECTIONS: u32 = 20;
pub const DEFAULT_MAX_OPEN_CONNECTIONS: u32 = 20;
/// Seconds
pub const DEFAULT_MAX_LIFETIME: u64 = 5;

/// Environment variable prefix (`PGKIT_HOST`, `PGKIT_PASSWORD`, ...)
pub const ENV_PREFIX: &str = "PGKIT";

/// Connection and migration settings.
///
/// Zero values (empty string, `0`) mean "unset" and are replaced by
/// [`DatabaseConfig::apply_defaults`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub database_name: String,
    pub username: String,
    pub password: String,
    pub max_idle_connections: u32,
    pub max_open_connections: u32,
    /// Maximum connection lifetime in seconds
    pub max_lifetime: u64,
    /// Directory holding the migration scripts
    pub migration_path: String,
}

impl DatabaseConfig {
    /// Fill every unset field with its default. Idempotent.
    pub fn apply_defaults(&mut self) {
        if self.host.is_empty() {
            self.host = DEFAULT_HOST.to_string();
        }
        if self.port == 0 {
            self.port = DEFAULT_PORT;
        }
        if self.username.is_empty() {
            self.username = DEFAULT_USERNAME.to_string();
        }
        if self.max_idle_connections == 0 {
            self.max_idle_connections = DEFAULT_MAX_IDLE_CONNECTIONS;
        }
        if self.max_open_connections == 0 {
            self.max_open_connections = DEFAULT_MAX_OPEN_CONNECTIONS;
        }
        if self.max_lifetime == 0 {
            self.max_lifetime = DEFAULT_MAX_LIFETIME;
        }
    }

    /// Consuming variant of [`apply_defaults`](Self::apply_defaults)
    pub fn with_defaults(mut self) -> Self {
        self.apply_defaults();
        self
    }

    /// Load configuration from an optional file, then `PGKIT_*` environment
    /// variables, then defaults.
    ///
    /// The file format is picked from its extension (toml, yaml, json, ...).
    ///
    /// # Errors
    /// - AppError::Config if the file is missing or a value cannot be parsed
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                return Err(AppError::Config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            builder = builder.add_source(config::File::from(path));
        }

        let settings = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;

        let conf: DatabaseConfig = settings.try_deserialize()?;
        tracing::debug!(
            host = %conf.host,
            database = %conf.database_name,
            "Loaded database configuration"
        );

        Ok(conf.with_defaults())
    }

    /// Key/value connection string understood by libpq tools.
    ///
    /// `dbname=<name> user=<user> password='<password>' host=<host> port=<port> sslmode=disable`
    pub fn connection_string(&self) -> String {
        format!(
            "dbname={} user={} password='{}' host={} port={} sslmode={}",
            self.database_name,
            self.username,
            escape_quoted(&self.password),
            self.host,
            self.port,
            "disable"
        )
    }

    /// URL form used by the migration engine.
    ///
    /// Username and password are percent-encoded, so `@`, `:`, `/`, `#`
    /// and `?` in credentials survive URL parsing.
    pub fn connection_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode=disable&timezone=UTC",
            urlencoding::encode(&self.username),
            urlencoding::encode(&self.password),
            self.host,
            self.port,
            self.database_name
        )
    }

    /// [`connection_url`](Self::connection_url) with the password masked, for logs
    pub fn redacted_url(&self) -> String {
        format!(
            "postgres://{}:***@{}:{}/{}?sslmode=disable&timezone=UTC",
            urlencoding::encode(&self.username),
            self.host,
            self.port,
            self.database_name
        )
    }
}

// libpq: inside single quotes, `\` and `'` must be backslash-escaped
fn escape_quoted(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if c == '\\' || c == '\'' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
