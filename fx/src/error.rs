//! FX engine error types.

use kurs_common::{CommonError, CurrencyPair, RateSource};
use thiserror::Error;

/// Errors that can occur in the FX engine.
///
/// Only [`FxError::RateNotAvailable`] reaches callers of the resolver; the
/// other variants are absorbed and logged by the refresh path.
#[derive(Debug, Error)]
pub enum FxError {
    /// No cached, stored or triangulated rate exists for the pair.
    #[error("Rate not available for {0}")]
    RateNotAvailable(CurrencyPair),

    /// Provider request or payload failed.
    #[error("Rate provider {provider} failed: {message}")]
    ProviderError { provider: RateSource, message: String },

    /// Provider did not answer within the fetch timeout.
    #[error("Rate provider {0} timed out")]
    ProviderTimeout(RateSource),

    /// Durable store failure.
    #[error("Rate store error: {0}")]
    Store(String),

    /// Record failed validation.
    #[error(transparent)]
    InvalidRecord(#[from] CommonError),

    /// Decimal overflow while converting an amount.
    #[error("Arithmetic overflow converting {0}")]
    Overflow(CurrencyPair),
}

impl FxError {
    /// Build a provider error from any displayable cause.
    pub fn provider(provider: RateSource, message: impl std::fmt::Display) -> Self {
        FxError::ProviderError {
            provider,
            message: message.to_string(),
        }
    }

    /// Whether this is the caller-visible "no rate" outcome.
    pub fn is_not_found(&self) -> bool {
        matches!(self, FxError::RateNotAvailable(_))
    }
}

impl From<sqlx::Error> for FxError {
    fn from(err: sqlx::Error) -> Self {
        FxError::Store(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for FxError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        FxError::Store(err.to_string())
    }
}

/// Result type for FX operations.
pub type FxResult<T> = Result<T, FxError>;
