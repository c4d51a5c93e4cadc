use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::StatusCode;
use serde::Deserialize;

use crate::auth::backend::{AuthStatus, CredentialRevoker, DeviceFlowClient, StatusSource};
use crate::auth::device_code::{DeviceCodeGrant, PollOutcome};
use crate::auth::error::AuthError;
use crate::auth::store::TokenStore;
use crate::auth::token::Token;
use crate::config::DeviceAuthConfig;

pub const DEFAULT_CLIENT_ID: &str = "Iv1.b507a08c87ecfe98";
pub const DEFAULT_SCOPE: &str = "read:user";
pub const DEFAULT_DEVICE_CODE_URL: &str = "https://github.com/login/device/code";
pub const DEFAULT_ACCESS_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
pub const DEFAULT_COPILOT_TOKEN_URL: &str = "https://api.github.com/copilot_internal/v2/token";
pub const DEFAULT_USER_URL: &str = "https://api.github.com/user";

/// Store key for the long-lived GitHub OAuth token.
pub const STORE_KEY: &str = "github-copilot";

const DEVICE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:device_code";
const USER_AGENT: &str = "device-auth";
const EDITOR_VERSION: &str = "vscode/1.96.0";
const EDITOR_PLUGIN_VERSION: &str = "copilot-chat/0.26.7";
/// Copilot tokens are refreshed this long before they expire.
const COPILOT_REFRESH_BUFFER_SECS: i64 = 60;

/// GitHub device-code login with Copilot token exchange.
///
/// Plays all three collaborator roles of the controller: it requests and polls
/// device codes, reports the status of the stored credential, and forgets that
/// credential on logout.
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use device_auth::auth::{FileTokenStore, TokenStoreConfig};
/// use device_auth::auth::providers::github_copilot::GitHubCopilotAuth;
///
/// let store = FileTokenStore::new(TokenStoreConfig::new(std::path::PathBuf::from("/tmp")));
/// let auth = GitHubCopilotAuth::new(Arc::new(store)).with_profile("work");
/// ```
pub struct GitHubCopilotAuth {
    client: reqwest::Client,
    client_id: String,
    scope: String,
    device_code_url: String,
    access_token_url: String,
    copilot_token_url: String,
    user_url: String,
    token_store: Arc<dyn TokenStore>,
    profile: String,
    cached_copilot: Mutex<Option<CopilotToken>>,
}

impl GitHubCopilotAuth {
    pub fn new(token_store: Arc<dyn TokenStore>) -> Self {
        Self {
            client: reqwest::Client::new(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            scope: DEFAULT_SCOPE.to_string(),
            device_code_url: DEFAULT_DEVICE_CODE_URL.to_string(),
            access_token_url: DEFAULT_ACCESS_TOKEN_URL.to_string(),
            copilot_token_url: DEFAULT_COPILOT_TOKEN_URL.to_string(),
            user_url: DEFAULT_USER_URL.to_string(),
            token_store,
            profile: "default".to_string(),
            cached_copilot: Mutex::new(None),
        }
    }

    /// Apply endpoint, client and profile settings from configuration.
    pub fn from_config(config: &DeviceAuthConfig, token_store: Arc<dyn TokenStore>) -> Self {
        let github = &config.github;
        Self::new(token_store)
            .with_client_id(github.client_id.clone())
            .with_scope(github.scope.clone())
            .with_device_code_url(github.device_code_url.clone())
            .with_access_token_url(github.access_token_url.clone())
            .with_copilot_token_url(github.copilot_token_url.clone())
            .with_user_url(github.user_url.clone())
            .with_profile(config.profile.clone())
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = profile.into();
        self
    }

    pub fn with_device_code_url(mut self, url: impl Into<String>) -> Self {
        self.device_code_url = url.into();
        self
    }

    pub fn with_access_token_url(mut self, url: impl Into<String>) -> Self {
        self.access_token_url = url.into();
        self
    }

    pub fn with_copilot_token_url(mut self, url: impl Into<String>) -> Self {
        self.copilot_token_url = url.into();
        self
    }

    pub fn with_user_url(mut self, url: impl Into<String>) -> Self {
        self.user_url = url.into();
        self
    }

    pub fn logged_in(&self) -> Result<bool, AuthError> {
        Ok(self.token_store.load(STORE_KEY, &self.profile)?.is_some())
    }

    /// Copilot API token, exchanged again when within a minute of expiry.
    pub async fn valid_copilot_token(&self) -> Result<CopilotToken, AuthError> {
        if let Some(cached) = self.cached_token() {
            if !cached.is_expiring_soon(Utc::now()) {
                return Ok(cached);
            }
            tracing::debug!("copilot token expiring, refreshing");
        }
        let github_token = self
            .token_store
            .load(STORE_KEY, &self.profile)?
            .ok_or(AuthError::NotLoggedIn)?;
        let token = self.exchange_copilot_token(&github_token.access_token).await?;
        *self.cached_copilot.lock().unwrap_or_else(PoisonError::into_inner) = Some(token.clone());
        Ok(token)
    }

    async fn fetch_user(&self, github_token: &str) -> Result<GitHubUser, AuthError> {
        let resp = self
            .client
            .get(&self.user_url)
            .header("Accept", "application/json")
            .header("Authorization", format!("token {github_token}"))
            .header("User-Agent", USER_AGENT)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(AuthError::InvalidCredential);
        }
        resp.json()
            .await
            .map_err(|e| AuthError::InvalidResponse(e.to_string()))
    }

    async fn exchange_copilot_token(&self, github_token: &str) -> Result<CopilotToken, AuthError> {
        let resp = self
            .client
            .get(&self.copilot_token_url)
            .header("Accept", "application/json")
            .header("Authorization", format!("token {github_token}"))
            .header("User-Agent", USER_AGENT)
            .header("Editor-Version", EDITOR_VERSION)
            .header("Editor-Plugin-Version", EDITOR_PLUGIN_VERSION)
            .send()
            .await?;
        match resp.status() {
            StatusCode::UNAUTHORIZED => return Err(AuthError::InvalidCredential),
            StatusCode::FORBIDDEN => return Err(AuthError::NoSubscription),
            status if !status.is_success() => {
                let body = resp.text().await.unwrap_or_default();
                return Err(AuthError::Provider(format!(
                    "Copilot token request failed: {status} - {body}"
                )));
            }
            _ => {}
        }
        let payload: CopilotTokenResponse = resp
            .json()
            .await
            .map_err(|e| AuthError::InvalidResponse(e.to_string()))?;
        let expires_at = parse_expires_at(&payload.expires_at)?;
        tracing::info!(%expires_at, "obtained copilot token");
        Ok(CopilotToken {
            token: payload.token,
            expires_at,
        })
    }

    /// Finish a login once GitHub handed out an access token.
    async fn complete_login(
        &self,
        access_token: String,
        scope: Option<String>,
    ) -> Result<PollOutcome, AuthError> {
        let login = match self.fetch_user(&access_token).await {
            Ok(user) => Some(user.login),
            Err(err) => {
                tracing::warn!(error = %err, "could not fetch GitHub user");
                None
            }
        };
        let copilot = self.exchange_copilot_token(&access_token).await?;

        let mut token = Token::new(access_token);
        token.scopes = scope.map(|s| s.split(',').map(|v| v.trim().to_string()).collect());
        token.account = login.clone();
        self.token_store.save(STORE_KEY, &self.profile, &token)?;
        *self.cached_copilot.lock().unwrap_or_else(PoisonError::into_inner) = Some(copilot);

        Ok(PollOutcome::Approved { principal: login })
    }

    fn cached_token(&self) -> Option<CopilotToken> {
        self.cached_copilot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl DeviceFlowClient for GitHubCopilotAuth {
    async fn request_device_code(&self) -> Result<DeviceCodeGrant, AuthError> {
        let resp = self
            .client
            .post(&self.device_code_url)
            .header("Accept", "application/json")
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("scope", self.scope.as_str()),
            ])
            .send()
            .await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(AuthError::Provider(format!(
                "device code request failed: {status} - {body}"
            )));
        }
        let payload: GitHubDeviceCodeResponse = resp
            .json()
            .await
            .map_err(|e| AuthError::InvalidResponse(e.to_string()))?;
        if let Some(error) = payload.error {
            return Err(AuthError::Provider(describe(&error, payload.error_description)));
        }
        match (payload.device_code, payload.user_code, payload.verification_uri) {
            (Some(device_code), Some(user_code), Some(verification_uri)) => {
                tracing::info!(%user_code, "obtained device code");
                Ok(DeviceCodeGrant {
                    device_code,
                    user_code,
                    verification_uri,
                    expires_in: payload.expires_in.unwrap_or(900),
                    interval: payload.interval.unwrap_or(5),
                })
            }
            _ => Err(AuthError::InvalidResponse(
                "device code response missing required fields".to_string(),
            )),
        }
    }

    async fn poll_for_token(&self, device_code: &str) -> Result<PollOutcome, AuthError> {
        let resp = self
            .client
            .post(&self.access_token_url)
            .header("Accept", "application/json")
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("device_code", device_code),
                ("grant_type", DEVICE_GRANT_TYPE),
            ])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(AuthError::Provider(format!(
                "token request failed with status {}",
                resp.status()
            )));
        }
        let payload: GitHubDeviceTokenResponse = resp
            .json()
            .await
            .map_err(|e| AuthError::InvalidResponse(e.to_string()))?;

        if let Some(access_token) = payload.access_token {
            return self.complete_login(access_token, payload.scope).await;
        }
        match payload.error.as_deref() {
            Some("authorization_pending") => Ok(PollOutcome::Pending),
            Some("slow_down") => Ok(PollOutcome::SlowDown),
            Some("expired_token") => Ok(PollOutcome::Expired),
            Some("access_denied") => Ok(PollOutcome::Denied {
                reason: payload
                    .error_description
                    .unwrap_or_else(|| "access_denied".to_string()),
            }),
            Some(other) => Err(AuthError::Provider(describe(other, payload.error_description))),
            None => Err(AuthError::InvalidResponse(
                "token response missing access_token and error".to_string(),
            )),
        }
    }
}

#[async_trait]
impl StatusSource for GitHubCopilotAuth {
    async fn fetch_auth_status(&self) -> Result<AuthStatus, AuthError> {
        let Some(stored) = self.token_store.load(STORE_KEY, &self.profile)? else {
            return Ok(AuthStatus::signed_out());
        };
        match self.valid_copilot_token().await {
            Ok(copilot) => Ok(AuthStatus::signed_in(stored.account, Some(copilot.expires_at))),
            Err(err @ (AuthError::InvalidCredential | AuthError::NoSubscription)) => {
                tracing::warn!(error = %err, "stored GitHub credential is not usable");
                Ok(AuthStatus::signed_out())
            }
            Err(err) => Err(err),
        }
    }
}

#[async_trait]
impl CredentialRevoker for GitHubCopilotAuth {
    async fn revoke_credential(&self) -> Result<(), AuthError> {
        *self.cached_copilot.lock().unwrap_or_else(PoisonError::into_inner) = None;
        self.token_store.clear(STORE_KEY, &self.profile)
    }
}

/// Short-lived Copilot API token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopilotToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl CopilotToken {
    pub fn is_expiring_soon(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - now < Duration::seconds(COPILOT_REFRESH_BUFFER_SECS)
    }
}

#[derive(Debug, Deserialize)]
struct GitHubDeviceCodeResponse {
    device_code: Option<String>,
    user_code: Option<String>,
    verification_uri: Option<String>,
    expires_in: Option<u64>,
    interval: Option<u64>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubDeviceTokenResponse {
    access_token: Option<String>,
    scope: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubUser {
    login: String,
}

#[derive(Debug, Deserialize)]
struct CopilotTokenResponse {
    token: String,
    expires_at: serde_json::Value,
}

fn describe(error: &str, description: Option<String>) -> String {
    match description {
        Some(description) if !description.is_empty() => format!("{error}: {description}"),
        _ => error.to_string(),
    }
}

/// Accepts seconds or milliseconds since the epoch, as a number or a string.
fn parse_expires_at(value: &serde_json::Value) -> Result<DateTime<Utc>, AuthError> {
    let raw = match value {
        serde_json::Value::Number(num) => num.as_i64(),
        serde_json::Value::String(text) => text.trim().parse::<i64>().ok(),
        _ => None,
    }
    .ok_or_else(|| AuthError::InvalidResponse(format!("copilot token expires_at invalid: {value}")))?;
    let secs = if raw > 10_000_000_000 { raw / 1000 } else { raw };
    DateTime::<Utc>::from_timestamp(secs, 0)
        .ok_or_else(|| AuthError::InvalidResponse(format!("copilot token expires_at out of range: {raw}")))
}
