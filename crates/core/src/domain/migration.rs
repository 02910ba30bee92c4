// Migration Domain Types

use std::fmt;

use crate::error::{AppError, Result};

/// Directive handed to the migration engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationDirection {
    /// Apply all pending migrations in ascending version order
    Up,
    /// Roll back the most recently applied migration
    Down,
    /// Record the schema as being at this version without running scripts.
    /// A negative version clears the record entirely.
    Force(i64),
}

impl MigrationDirection {
    /// Parse a textual directive (`up`, `down`, `force`).
    ///
    /// Unknown directives are rejected rather than ignored, and `force`
    /// requires a target version.
    ///
    /// # Errors
    /// - AppError::Validation for an unknown directive or a missing force version
    pub fn parse(directive: &str, version: Option<i64>) -> Result<Self> {
        match directive.trim().to_ascii_lowercase().as_str() {
            "up" => Ok(Self::Up),
            "down" => Ok(Self::Down),
            "force" => version.map(Self::Force).ok_or_else(|| {
                AppError::Validation("force requires a target version".to_string())
            }),
            other => Err(AppError::Validation(format!(
                "unknown migration directive: {other:?} (expected up, down or force)"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Force(_) => "force",
        }
    }
}

impl fmt::Display for MigrationDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Force(version) => write!(f, "force({version})"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Successful result of a migration directive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// The engine changed the schema or its version record
    Applied,
    /// Nothing to do (already up to date / nothing to roll back)
    NoChange,
}

/// Version currently recorded by the migration engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaVersion {
    pub version: i64,
    /// A migration at `version` started but did not complete
    pub dirty: bool,
}
