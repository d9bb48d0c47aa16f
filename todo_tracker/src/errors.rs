//! Storage error types.

use std::time::Duration;
use thiserror::Error;

use crate::db::timeouts::TimeoutError;

/// Errors returned by repository operations
#[derive(Debug, Error)]
pub enum DataError {
    /// No row matched (absent, not owned, expired or wrong scope)
    #[error("record not found")]
    RecordNotFound,

    /// Optimistic concurrency check failed
    #[error("edit conflict")]
    EditConflict,

    /// Unique constraint on users.email violated
    #[error("duplicate email")]
    DuplicateEmail,

    /// Query exceeded its deadline
    #[error("database operation timed out after {0:?}")]
    Timeout(Duration),

    /// Database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<TimeoutError> for DataError {
    fn from(err: TimeoutError) -> Self {
        match err {
            TimeoutError::Timeout(d) => DataError::Timeout(d),
            TimeoutError::Database(e) => DataError::from_sqlx(e),
        }
    }
}

impl DataError {
    /// Map driver errors, translating the users.email unique violation.
    pub fn from_sqlx(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.constraint() == Some("users_email_key") {
                return DataError::DuplicateEmail;
            }
        }
        DataError::Database(err)
    }
}

/// Result type for storage operations
pub type DataResult<T> = Result<T, DataError>;
