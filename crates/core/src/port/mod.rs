// Port Layer - Interfaces for external dependencies

pub mod fatal_reporter;
pub mod migration_engine;

// Re-exports
pub use fatal_reporter::{FatalReporter, LogOnlyReporter};
pub use migration_engine::{MigrationEngine, MigrationEngineFactory, MigrationError};
