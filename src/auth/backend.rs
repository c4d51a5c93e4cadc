//! Collaborator traits the device-flow controller is built on.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::device_code::{DeviceCodeGrant, PollOutcome};
use super::error::AuthError;

/// Network side of a device-authorization flow.
///
/// Implement this for each OAuth provider. `poll_for_token` may report the
/// non-terminal cases either as [`PollOutcome::Pending`]/[`PollOutcome::SlowDown`]
/// or as [`AuthError::AuthorizationPending`]/[`AuthError::SlowDown`].
#[async_trait]
pub trait DeviceFlowClient: Send + Sync {
    async fn request_device_code(&self) -> Result<DeviceCodeGrant, AuthError>;

    async fn poll_for_token(&self, device_code: &str) -> Result<PollOutcome, AuthError>;
}

/// Authentication status as reported by a [`StatusSource`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthStatus {
    pub authenticated: bool,
    pub principal: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl AuthStatus {
    pub fn signed_out() -> Self {
        Self::default()
    }

    pub fn signed_in(principal: Option<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            authenticated: true,
            principal,
            expires_at,
        }
    }
}

/// Authoritative query for the current authentication status.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch_auth_status(&self) -> Result<AuthStatus, AuthError>;
}

/// Revokes (or forgets) the stored long-lived credential.
#[async_trait]
pub trait CredentialRevoker: Send + Sync {
    async fn revoke_credential(&self) -> Result<(), AuthError>;
}

/// Fire-and-forget user-facing side effects triggered when a grant arrives.
///
/// Calls must not block; errors are logged by the controller and never change
/// the flow's state. Both methods default to doing nothing.
pub trait UserPrompt: Send + Sync {
    fn copy_user_code(&self, _user_code: &str) -> Result<(), AuthError> {
        Ok(())
    }

    fn open_verification_uri(&self, _uri: &str) -> Result<(), AuthError> {
        Ok(())
    }
}

/// Prompt that does nothing; the caller renders the grant itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentPrompt;

impl UserPrompt for SilentPrompt {}
