//! Device-flow controller combining the polling scheduler and status cache.

use std::sync::Arc;
use std::time::Duration;

use bon::Builder;
use tokio::sync::watch;

use super::backend::{AuthStatus, CredentialRevoker, DeviceFlowClient, SilentPrompt, StatusSource, UserPrompt};
use super::device_code::{DeviceCodeGrant, PollingConfig};
use super::error::AuthError;
use super::scheduler::PollingScheduler;
use super::state::{AuthState, StateSnapshot};
use super::status::{AuthStatusCache, DEFAULT_REFRESH_TIMEOUT, DEFAULT_STATUS_TTL};

/// Tunables for an [`AuthController`].
#[derive(Debug, Clone, Builder)]
pub struct ControllerSettings {
    #[builder(default)]
    pub polling: PollingConfig,
    #[builder(default = DEFAULT_STATUS_TTL)]
    pub status_ttl: Duration,
    #[builder(default = DEFAULT_REFRESH_TIMEOUT)]
    pub status_timeout: Duration,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Caller-facing state machine for device-code login.
///
/// Commands never return errors for flow failures: a failed start or poll
/// shows up as [`AuthState::Failed`] and the next [`start_auth`](Self::start_auth)
/// retries from scratch.
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use device_auth::auth::{AuthController, FileTokenStore};
/// use device_auth::auth::providers::github_copilot::GitHubCopilotAuth;
///
/// # async fn example() {
/// let backend = Arc::new(GitHubCopilotAuth::new(Arc::new(FileTokenStore::new_default())));
/// let controller = AuthController::for_backend(backend);
/// let state = controller.start_auth().await;
/// if let Some(grant) = state.grant() {
///     println!("Visit {} and enter {}", grant.verification_uri, grant.user_code);
/// }
/// let outcome = controller.wait_for_outcome().await;
/// println!("{:?}", outcome.phase());
/// # }
/// ```
pub struct AuthController {
    scheduler: PollingScheduler,
    cache: Arc<AuthStatusCache>,
    revoker: Arc<dyn CredentialRevoker>,
    prompt: Arc<dyn UserPrompt>,
}

impl AuthController {
    pub fn new(
        client: Arc<dyn DeviceFlowClient>,
        status: Arc<dyn StatusSource>,
        revoker: Arc<dyn CredentialRevoker>,
    ) -> Self {
        Self::with_settings(client, status, revoker, ControllerSettings::default())
    }

    pub fn with_settings(
        client: Arc<dyn DeviceFlowClient>,
        status: Arc<dyn StatusSource>,
        revoker: Arc<dyn CredentialRevoker>,
        settings: ControllerSettings,
    ) -> Self {
        let cache = Arc::new(
            AuthStatusCache::new(status)
                .with_ttl(settings.status_ttl)
                .with_refresh_timeout(settings.status_timeout),
        );
        let scheduler =
            PollingScheduler::new(client, settings.polling).with_status_cache(cache.clone());
        Self {
            scheduler,
            cache,
            revoker,
            prompt: Arc::new(SilentPrompt),
        }
    }

    /// Build a controller from one backend that plays every collaborator role.
    pub fn for_backend<B>(backend: Arc<B>) -> Self
    where
        B: DeviceFlowClient + StatusSource + CredentialRevoker + 'static,
    {
        Self::for_backend_with_settings(backend, ControllerSettings::default())
    }

    pub fn for_backend_with_settings<B>(backend: Arc<B>, settings: ControllerSettings) -> Self
    where
        B: DeviceFlowClient + StatusSource + CredentialRevoker + 'static,
    {
        Self::with_settings(backend.clone(), backend.clone(), backend, settings)
    }

    pub fn with_prompt(mut self, prompt: Arc<dyn UserPrompt>) -> Self {
        self.prompt = prompt;
        self
    }

    /// Start (or restart) a device flow.
    ///
    /// Any previous attempt is torn down and any terminal display state is
    /// reset before a new grant is requested. Once a grant arrives the prompt
    /// capabilities are invoked on a best-effort basis.
    pub async fn start_auth(&self) -> AuthState {
        let state = self.scheduler.start().await;
        if let AuthState::AwaitingApproval(grant) = &state {
            self.notify_prompt(grant);
        }
        state
    }

    /// Abandon the current attempt, if any, and return to `Idle`.
    pub fn cancel_auth(&self) {
        self.scheduler.cancel();
    }

    /// Revoke the stored credential and mark the cached status signed out.
    ///
    /// An in-flight attempt is left alone.
    pub async fn logout(&self) -> Result<(), AuthError> {
        self.revoker.revoke_credential().await?;
        self.cache.mark_signed_out();
        self.scheduler.clear_authenticated();
        tracing::info!("logged out");
        Ok(())
    }

    /// Cached authentication status, refreshed when stale.
    pub async fn auth_status(&self) -> AuthStatus {
        let status = self.cache.status().await;
        if !status.authenticated && self.cache.last_error().is_none() {
            self.scheduler.clear_authenticated();
        }
        status
    }

    /// Force a status refresh, returning the source's error if it fails.
    pub async fn refresh_status(&self) -> Result<AuthStatus, AuthError> {
        self.cache.refresh().await
    }

    /// Error from the last failed status refresh.
    pub fn last_status_error(&self) -> Option<AuthError> {
        self.cache.last_error()
    }

    pub fn current_state(&self) -> AuthState {
        self.scheduler.current_state()
    }

    pub fn snapshot(&self) -> StateSnapshot {
        self.scheduler.current_state().snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.scheduler.subscribe()
    }

    pub fn is_attempting(&self) -> bool {
        self.scheduler.is_attempting()
    }

    /// Wait until the flow leaves `AwaitingApproval` and return the new state.
    pub async fn wait_for_outcome(&self) -> AuthState {
        let mut rx = self.scheduler.subscribe();
        let settled = rx
            .wait_for(|state| !matches!(state, AuthState::AwaitingApproval(_)))
            .await
            .map(|state| state.clone());
        settled.unwrap_or_else(|_| self.current_state())
    }

    /// Teardown hook: stop every timer before the controller goes away.
    pub fn shutdown(&self) {
        self.scheduler.shutdown();
    }

    fn notify_prompt(&self, grant: &DeviceCodeGrant) {
        if let Err(err) = self.prompt.copy_user_code(&grant.user_code) {
            tracing::warn!(error = %err, "could not copy user code");
        }
        if let Err(err) = self.prompt.open_verification_uri(&grant.verification_uri) {
            tracing::warn!(error = %err, "could not open verification page");
        }
    }
}
