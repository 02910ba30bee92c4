//! Migration runner driving the sqlx engine

mod common;

use std::path::Path;
use std::sync::Arc;

use pgkit_core::application::MigrationRunner;
use pgkit_core::domain::{MigrationDirection, MigrationOutcome, SchemaVersion};
use pgkit_core::port::fatal_reporter::mocks::RecordingReporter;
use pgkit_core::port::MigrationError;
use pgkit_core::{AppError, DatabaseConfig};
use pgkit_infra_postgres::{PgDatabase, SqlxMigrationEngineFactory};

use common::test_config;

fn write(dir: &Path, name: &str, sql: &str) {
    std::fs::write(dir.join(name), sql).unwrap();
}

/// Two reversible migrations, then one without a down script
fn migration_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path();
    write(p, "1_create_gadgets.up.sql", "CREATE TABLE pgkit_it_gadgets (id BIGINT PRIMARY KEY);");
    write(p, "1_create_gadgets.down.sql", "DROP TABLE pgkit_it_gadgets;");
    write(p, "2_add_label.up.sql", "ALTER TABLE pgkit_it_gadgets ADD COLUMN label TEXT;");
    write(p, "2_add_label.down.sql", "ALTER TABLE pgkit_it_gadgets DROP COLUMN label;");
    write(p, "3_add_notes.up.sql", "ALTER TABLE pgkit_it_gadgets ADD COLUMN notes TEXT;");
    dir
}

fn runner(reporter: &RecordingReporter) -> MigrationRunner {
    MigrationRunner::new(Arc::new(SqlxMigrationEngineFactory), Arc::new(reporter.clone()))
}

#[tokio::test]
async fn test_missing_source_is_reported_fatal() {
    let reporter = RecordingReporter::new();
    let config = DatabaseConfig {
        migration_path: "file:///nonexistent/pgkit-it".to_string(),
        ..test_config()
    };

    let err = runner(&reporter)
        .migrate(&config, MigrationDirection::Up)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Migration(MigrationError::Init(_))));
    assert_eq!(reporter.report_count(), 1);
}

#[tokio::test]
#[ignore = "requires database"]
async fn test_up_down_force_lifecycle() {
    let dir = migration_dir();
    let config = DatabaseConfig {
        migration_path: format!("file://{}", dir.path().display()),
        ..test_config()
    };
    let reporter = RecordingReporter::new();
    let runner = runner(&reporter);

    // Start from a clean slate
    let mut db = PgDatabase::open(config.clone()).await.unwrap();
    db.exec("DROP TABLE IF EXISTS pgkit_it_gadgets", &[]).await.unwrap();
    runner.migrate(&config, MigrationDirection::Force(-1)).await.unwrap();
    assert_eq!(runner.version(&config).await.unwrap(), None);

    // up applies all three, second up is a no-op
    assert_eq!(
        runner.migrate(&config, MigrationDirection::Up).await.unwrap(),
        MigrationOutcome::Applied
    );
    assert_eq!(
        runner.migrate(&config, MigrationDirection::Up).await.unwrap(),
        MigrationOutcome::NoChange
    );
    assert_eq!(
        runner.version(&config).await.unwrap(),
        Some(SchemaVersion { version: 3, dirty: false })
    );
    db.exec(
        "INSERT INTO pgkit_it_gadgets (id, label, notes) VALUES (1, 'a', 'n')",
        &[],
    )
    .await
    .unwrap();

    // no down script for the latest version: fatal, record untouched
    let err = runner
        .migrate(&config, MigrationDirection::Down)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Migration(MigrationError::Irreversible(3))));
    assert_eq!(reporter.report_count(), 1);
    assert_eq!(
        runner.version(&config).await.unwrap(),
        Some(SchemaVersion { version: 3, dirty: false })
    );

    // force moves the record without running scripts
    assert_eq!(
        runner.migrate(&config, MigrationDirection::Force(2)).await.unwrap(),
        MigrationOutcome::Applied
    );
    assert_eq!(
        runner.version(&config).await.unwrap(),
        Some(SchemaVersion { version: 2, dirty: false })
    );
    assert!(db.exec("SELECT notes FROM pgkit_it_gadgets", &[]).await.is_ok());

    // down reverts only the latest
    assert_eq!(
        runner.migrate(&config, MigrationDirection::Down).await.unwrap(),
        MigrationOutcome::Applied
    );
    assert_eq!(
        runner.version(&config).await.unwrap(),
        Some(SchemaVersion { version: 1, dirty: false })
    );
    assert!(db.exec("SELECT label FROM pgkit_it_gadgets", &[]).await.is_err());

    assert_eq!(
        runner.migrate(&config, MigrationDirection::Force(2)).await.unwrap(),
        MigrationOutcome::Applied
    );
    assert!(db.exec("SELECT label FROM pgkit_it_gadgets", &[]).await.is_err());
    assert_eq!(reporter.report_count(), 1);

    // forcing an unknown version is fatal
    let err = runner
        .migrate(&config, MigrationDirection::Force(42))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Migration(MigrationError::UnknownVersion(42))));
    assert_eq!(reporter.report_count(), 2);

    // an interrupted run leaves a failed record: up refuses, force clears it
    db.exec(
        "INSERT INTO _sqlx_migrations (version, description, success, checksum, execution_time) \
         VALUES (3, 'add notes', FALSE, decode('00', 'hex'), -1)",
        &[],
    )
    .await
    .unwrap();
    assert_eq!(
        runner.version(&config).await.unwrap(),
        Some(SchemaVersion { version: 3, dirty: true })
    );
    let err = runner
        .migrate(&config, MigrationDirection::Up)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Migration(MigrationError::Dirty(3))));
    assert_eq!(reporter.report_count(), 3);

    assert_eq!(
        runner.migrate(&config, MigrationDirection::Force(2)).await.unwrap(),
        MigrationOutcome::Applied
    );
    assert_eq!(
        runner.version(&config).await.unwrap(),
        Some(SchemaVersion { version: 2, dirty: false })
    );

    // cleanup
    runner.migrate(&config, MigrationDirection::Force(1)).await.unwrap();
    runner.migrate(&config, MigrationDirection::Down).await.unwrap();
    assert_eq!(runner.version(&config).await.unwrap(), None);
    assert_eq!(
        runner.migrate(&config, MigrationDirection::Down).await.unwrap(),
        MigrationOutcome::NoChange
    );
    db.close().await.unwrap();
}
