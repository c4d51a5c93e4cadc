use thiserror::Error;

/// Authentication errors for device-code flows and their collaborators.
///
/// Payloads are plain strings so the error can be cloned into an observable
/// [`AuthState`](super::AuthState) and shown to the user verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Not logged in")]
    NotLoggedIn,
    #[error("Authorization pending")]
    AuthorizationPending,
    #[error("Polling too frequently")]
    SlowDown,
    #[error("Device code expired before authorization completed")]
    ExpiredGrant,
    #[error("Access denied: {0}")]
    AccessDenied(String),
    #[error("Provider error: {0}")]
    Provider(String),
    #[error("Stored credential is invalid or expired")]
    InvalidCredential,
    #[error("No Copilot subscription for this account")]
    NoSubscription,
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Timed out after {0}ms")]
    Timeout(u64),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl AuthError {
    /// Whether a poll returning this error should keep the attempt alive.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::AuthorizationPending | Self::SlowDown)
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(error: reqwest::Error) -> Self {
        Self::Network(error.to_string())
    }
}

impl From<std::io::Error> for AuthError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

impl From<toml::de::Error> for AuthError {
    fn from(error: toml::de::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

impl From<toml::ser::Error> for AuthError {
    fn from(error: toml::ser::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}
