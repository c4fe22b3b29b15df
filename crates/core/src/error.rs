//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid claims: {field}: {reason}")]
    InvalidClaims { field: &'static str, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    pub(crate) fn claims(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidClaims {
            field,
            reason: reason.into(),
        }
    }
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
