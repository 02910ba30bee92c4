//! Shared helpers for tests that need a running PostgreSQL.
//!
//! Run with:
//! PGKIT_TEST_PORT=7005 PGKIT_TEST_PASSWORD=... cargo test -p pgkit-integration-tests -- --ignored

#![allow(dead_code)]

use pgkit_core::DatabaseConfig;

fn env(key: &str) -> String {
    std::env::var(key).unwrap_or_default()
}

/// Config from `PGKIT_TEST_*`; unset values fall back to the defaults
pub fn test_config() -> DatabaseConfig {
    DatabaseConfig {
        host: env("PGKIT_TEST_HOST"),
        port: env("PGKIT_TEST_PORT").parse().unwrap_or(0),
        database_name: std::env::var("PGKIT_TEST_DB").unwrap_or_else(|_| "postgres".to_string()),
        username: env("PGKIT_TEST_USER"),
        password: env("PGKIT_TEST_PASSWORD"),
        // keep few warm connections; tests run in parallel against one server
        max_idle_connections: 2,
        ..Default::default()
    }
}

/// Table name that cannot collide with parallel tests
pub fn unique_table(prefix: &str) -> String {
    format!("{}_{}", prefix, uuid::Uuid::new_v4().simple())
}
