// Domain Layer - Migration vocabulary

pub mod migration;

pub use migration::{MigrationDirection, MigrationOutcome, SchemaVersion};
