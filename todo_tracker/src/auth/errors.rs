//! Authentication error types.

use thiserror::Error;

use crate::errors::DataError;
use crate::validator::FieldErrors;

/// Authentication errors
#[derive(Debug, Error)]
pub enum AuthError {
    /// One or more input fields failed validation
    #[error("failed validation: {0:?}")]
    Validation(FieldErrors),

    /// Unknown email or wrong password
    #[error("invalid authentication credentials")]
    InvalidCredentials,

    /// Bearer token malformed, unknown or expired
    #[error("invalid or missing authentication token")]
    InvalidToken,

    /// The user record changed between read and write
    #[error("edit conflict")]
    EditConflict,

    /// Password hashing failed
    #[error("password hashing failed")]
    HashingFailed,

    /// Storage error
    #[error(transparent)]
    Data(#[from] DataError),
}

impl AuthError {
    /// Single-field validation failure
    pub fn field(key: &str, message: &str) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(key.to_string(), message.to_string());
        AuthError::Validation(errors)
    }
}

/// Result type for authentication operations
pub type AuthResult<T> = Result<T, AuthError>;
