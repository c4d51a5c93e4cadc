//! Error types for device-auth.

use strum::Display;
use thiserror::Error;

use crate::auth::AuthError;

/// Primary error type for configuration and top-level operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Coarse error classification used for retry decisions and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorCategory {
    Authentication,
    Network,
    Timeout,
    Configuration,
    Serialization,
    Io,
}

impl Error {
    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Serialization(_) => ErrorCategory::Serialization,
            Self::Io(_) => ErrorCategory::Io,
            Self::Auth(auth) => match auth {
                AuthError::Network(_) => ErrorCategory::Network,
                AuthError::Timeout(_) => ErrorCategory::Timeout,
                AuthError::Io(_) => ErrorCategory::Io,
                AuthError::Serialization(_) => ErrorCategory::Serialization,
                _ => ErrorCategory::Authentication,
            },
        }
    }

    /// Whether a fresh attempt could plausibly succeed without user action.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Network | ErrorCategory::Timeout
        )
    }
}

impl From<toml::de::Error> for Error {
    fn from(error: toml::de::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, Error>;
