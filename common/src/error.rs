//! Error types shared by kurs crates.

use thiserror::Error;

/// Errors raised while constructing or validating common types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommonError {
    /// Currency code is not a three-letter ISO 4217 code.
    #[error("Invalid currency code: {0:?}")]
    InvalidCurrency(String),

    /// Rate record violates one of its invariants.
    #[error("Invalid rate record: {0}")]
    InvalidRecord(String),

    /// Unknown rate source name.
    #[error("Unknown rate source: {0}")]
    UnknownSource(String),

    /// Unknown quote convention name.
    #[error("Unknown quote convention: {0}")]
    UnknownConvention(String),
}

impl CommonError {
    /// Get error code for logs and operator output.
    pub fn error_code(&self) -> &'static str {
        match self {
            CommonError::InvalidCurrency(_) => "INVALID_CURRENCY",
            CommonError::InvalidRecord(_) => "INVALID_RECORD",
            CommonError::UnknownSource(_) => "UNKNOWN_SOURCE",
            CommonError::UnknownConvention(_) => "UNKNOWN_CONVENTION",
        }
    }
}

/// Result type alias for common operations.
pub type Result<T> = std::result::Result<T, CommonError>;
