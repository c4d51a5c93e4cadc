//! Externally observable device-flow state.

use serde::Serialize;
use strum::{Display, EnumString};

use super::device_code::DeviceCodeGrant;
use super::error::AuthError;

/// Coarse phase of the controller, as shown to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AuthPhase {
    Idle,
    AwaitingApproval,
    Succeeded,
    Failed,
}

/// Current state of the device flow. Exactly one variant holds at a time.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AuthState {
    #[default]
    Idle,
    AwaitingApproval(DeviceCodeGrant),
    Authenticated { principal: Option<String> },
    Failed(AuthError),
}

impl AuthState {
    pub fn phase(&self) -> AuthPhase {
        match self {
            Self::Idle => AuthPhase::Idle,
            Self::AwaitingApproval(_) => AuthPhase::AwaitingApproval,
            Self::Authenticated { .. } => AuthPhase::Succeeded,
            Self::Failed(_) => AuthPhase::Failed,
        }
    }

    pub fn grant(&self) -> Option<&DeviceCodeGrant> {
        match self {
            Self::AwaitingApproval(grant) => Some(grant),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&AuthError> {
        match self {
            Self::Failed(error) => Some(error),
            _ => None,
        }
    }

    /// `Authenticated` or `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Authenticated { .. } | Self::Failed(_))
    }

    /// Flattened `{phase, grant?, principal?, error?}` view for UI layers.
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            phase: self.phase(),
            grant: self.grant().cloned(),
            principal: match self {
                Self::Authenticated { principal } => principal.clone(),
                _ => None,
            },
            error: self.error().map(ToString::to_string),
        }
    }
}

/// Serializable read-only snapshot of an [`AuthState`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateSnapshot {
    pub phase: AuthPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grant: Option<DeviceCodeGrant>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub principal: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
