// PostgreSQL Adapter Errors

use pgkit_core::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    /// Query attempted before `connect` (or after `close`)
    #[error("Database connection is not defined yet")]
    NotDefined,

    /// Driver, network or row decoding error, passed through untouched
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    /// A parameter could not be encoded
    #[error("failed to bind parameter {index}: {message}")]
    Bind { index: usize, message: String },
}

pub type DbResult<T> = std::result::Result<T, DbError>;

impl DbError {
    pub fn is_not_defined(&self) -> bool {
        matches!(self, DbError::NotDefined)
    }
}

impl From<DbError> for AppError {
    fn from(err: DbError) -> Self {
        AppError::Database(err.to_string())
    }
}
