//! OAuth device-authorization login: polling, status caching and token storage.

pub mod backend;
pub mod controller;
pub mod device_code;
pub mod error;
pub mod providers;
pub mod scheduler;
pub mod state;
pub mod status;
pub mod store;
pub mod token;

pub use backend::{
    AuthStatus, CredentialRevoker, DeviceFlowClient, SilentPrompt, StatusSource, UserPrompt,
};
pub use controller::{AuthController, ControllerSettings};
pub use device_code::{DeviceCodeGrant, PollOutcome, PollingConfig};
pub use error::AuthError;
pub use scheduler::{AttemptId, PollingScheduler};
pub use state::{AuthPhase, AuthState, StateSnapshot};
pub use status::AuthStatusCache;
pub use store::{FileTokenStore, TokenStore, TokenStoreConfig};
pub use token::Token;
