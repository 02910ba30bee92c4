// Migration Engine Port
// Abstraction over the external engine that applies versioned schema scripts

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::SchemaVersion;

/// Errors reported by a migration engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MigrationError {
    /// Nothing to apply or roll back; callers treat this as success
    #[error("no change")]
    NoChange,

    #[error("could not initialize migration engine: {0}")]
    Init(String),

    #[error("database is dirty at version {0}; fix it and force the version")]
    Dirty(i64),

    #[error("migration source has no version {0}")]
    UnknownVersion(i64),

    #[error("migration {0} has no down script")]
    Irreversible(i64),

    #[error("migration engine error: {0}")]
    Engine(String),
}

/// One engine instance, bound to a migration source and a database URL
#[async_trait]
pub trait MigrationEngine: Send {
    /// Apply all pending migrations in ascending order
    ///
    /// # Errors
    /// - MigrationError::NoChange if nothing is pending
    /// - MigrationError::Dirty if a previous migration did not complete
    async fn up(&mut self) -> Result<(), MigrationError>;

    /// Revert the most recently applied migration
    ///
    /// # Errors
    /// - MigrationError::NoChange if nothing is applied
    /// - MigrationError::Irreversible if the latest version has no down script
    async fn down(&mut self) -> Result<(), MigrationError>;

    /// Set the recorded version without running scripts.
    /// Negative `version` clears the record.
    async fn force(&mut self, version: i64) -> Result<(), MigrationError>;

    /// Currently recorded version, `None` when nothing is applied
    async fn version(&mut self) -> Result<Option<SchemaVersion>, MigrationError>;
}

/// Builds a fresh engine per migration run
#[async_trait]
pub trait MigrationEngineFactory: Send + Sync {
    /// # Arguments
    /// * `source` - Path to the migration scripts
    /// * `url` - Database connection URL
    ///
    /// # Errors
    /// - MigrationError::Init if the source or the database cannot be opened
    async fn open(
        &self,
        source: &str,
        url: &str,
    ) -> Result<Box<dyn MigrationEngine>, MigrationError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Mock engine behavior
    #[derive(Debug, Clone)]
    pub enum MockBehavior {
        /// Every directive succeeds
        Success,
        /// Every directive reports no change
        NoChange,
        /// Every directive fails with this error
        Fail(MigrationError),
        /// The factory itself fails to open the engine
        OpenFails(String),
    }

    /// Factory whose engines follow a fixed behavior and record each call
    #[derive(Clone)]
    pub struct MockMigrationEngineFactory {
        behavior: MockBehavior,
        version: Option<SchemaVersion>,
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl MockMigrationEngineFactory {
        pub fn new(behavior: MockBehavior) -> Self {
            Self {
                behavior,
                version: None,
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }

        pub fn new_success() -> Self {
            Self::new(MockBehavior::Success)
        }

        pub fn with_version(mut self, version: SchemaVersion) -> Self {
            self.version = Some(version);
            self
        }

        /// Recorded calls, e.g. `["open:./migrations", "up"]`
        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        /// URL handed to the most recent `open`
        pub fn last_url(&self) -> Option<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .rev()
                .find_map(|c| c.strip_prefix("url:").map(str::to_string))
        }
    }

    struct MockEngine {
        behavior: MockBehavior,
        version: Option<SchemaVersion>,
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl MockEngine {
        fn record(&self, call: String) -> Result<(), MigrationError> {
            self.calls.lock().unwrap().push(call);
            match &self.behavior {
                MockBehavior::Success => Ok(()),
                MockBehavior::NoChange => Err(MigrationError::NoChange),
                MockBehavior::Fail(err) => Err(err.clone()),
                MockBehavior::OpenFails(msg) => Err(MigrationError::Init(msg.clone())),
            }
        }
    }

    #[async_trait]
    impl MigrationEngine for MockEngine {
        async fn up(&mut self) -> Result<(), MigrationError> {
            self.record("up".to_string())
        }

        async fn down(&mut self) -> Result<(), MigrationError> {
            self.record("down".to_string())
        }

        async fn force(&mut self, version: i64) -> Result<(), MigrationError> {
            self.record(format!("force:{version}"))
        }

        async fn version(&mut self) -> Result<Option<SchemaVersion>, MigrationError> {
            self.calls.lock().unwrap().push("version".to_string());
            match &self.behavior {
                MockBehavior::Fail(err) => Err(err.clone()),
                _ => Ok(self.version),
            }
        }
    }

    #[async_trait]
    impl MigrationEngineFactory for MockMigrationEngineFactory {
        async fn open(
            &self,
            source: &str,
            url: &str,
        ) -> Result<Box<dyn MigrationEngine>, MigrationError> {
            {
                let mut calls = self.calls.lock().unwrap();
                calls.push(format!("open:{source}"));
                calls.push(format!("url:{url}"));
            }
            if let MockBehavior::OpenFails(msg) = &self.behavior {
                return Err(MigrationError::Init(msg.clone()));
            }
            Ok(Box::new(MockEngine {
                behavior: self.behavior.clone(),
                version: self.version,
                calls: self.calls.clone(),
            }))
        }
    }
}
