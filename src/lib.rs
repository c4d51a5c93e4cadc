//! device-auth: OAuth 2.0 Device Authorization Grant client.
//!
//! Drives the device-code login flow (RFC 8628) for an application: requests a
//! grant, polls for approval on a padded interval, enforces the grant's expiry,
//! and exposes one observable [`AuthState`](auth::AuthState) to the UI. A
//! TTL-cached authentication status and logout round out the controller.
//!
//! A GitHub backend with Copilot token exchange ships in
//! [`auth::providers::github_copilot`]; other providers plug in by
//! implementing [`auth::DeviceFlowClient`].
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use device_auth::auth::{AuthController, AuthState, FileTokenStore};
//! use device_auth::auth::providers::github_copilot::GitHubCopilotAuth;
//!
//! # async fn example() {
//! let store = Arc::new(FileTokenStore::new_default());
//! let controller = AuthController::for_backend(Arc::new(GitHubCopilotAuth::new(store)));
//!
//! if let AuthState::AwaitingApproval(grant) = controller.start_auth().await {
//!     println!("Open {} and enter {}", grant.verification_uri, grant.user_code);
//! }
//! match controller.wait_for_outcome().await {
//!     AuthState::Authenticated { principal } => println!("signed in as {principal:?}"),
//!     other => println!("login did not complete: {:?}", other.error()),
//! }
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod util;

#[cfg(feature = "cli")]
pub mod cli;
