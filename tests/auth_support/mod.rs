#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use device_auth::auth::{
    AuthError, AuthState, AuthStatus, CredentialRevoker, DeviceCodeGrant, DeviceFlowClient,
    PollOutcome, PollingScheduler, StatusSource, Token, TokenStore, UserPrompt,
};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

#[derive(Default)]
pub struct InMemoryTokenStore {
    tokens: Mutex<HashMap<(String, String), Token>>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, provider: &str, profile: &str, token: Token) {
        self.tokens
            .lock()
            .expect("store lock poisoned")
            .insert((provider.to_string(), profile.to_string()), token);
    }

    pub fn get(&self, provider: &str, profile: &str) -> Option<Token> {
        self.tokens
            .lock()
            .expect("store lock poisoned")
            .get(&(provider.to_string(), profile.to_string()))
            .cloned()
    }
}

impl TokenStore for InMemoryTokenStore {
    fn load(&self, provider: &str, profile: &str) -> Result<Option<Token>, AuthError> {
        Ok(self.get(provider, profile))
    }

    fn save(&self, provider: &str, profile: &str, token: &Token) -> Result<(), AuthError> {
        self.seed(provider, profile, token.clone());
        Ok(())
    }

    fn clear(&self, provider: &str, profile: &str) -> Result<(), AuthError> {
        self.tokens
            .lock()
            .expect("store lock poisoned")
            .remove(&(provider.to_string(), profile.to_string()));
        Ok(())
    }
}

pub fn token(access_token: &str) -> Token {
    Token::new(access_token)
}

/// Grant numbered `n`: device code `dc-n`, user code `CODE-n`.
pub fn grant(n: usize, expires_in: u64, interval: u64) -> DeviceCodeGrant {
    DeviceCodeGrant {
        device_code: format!("dc-{n}"),
        user_code: format!("CODE-{n}"),
        verification_uri: "https://github.com/login/device".to_string(),
        expires_in,
        interval,
    }
}

pub fn approved(principal: &str) -> Result<PollOutcome, AuthError> {
    Ok(PollOutcome::Approved {
        principal: Some(principal.to_string()),
    })
}

/// Device-flow client answering from scripted queues.
///
/// Grants default to `grant(n, 900, 5)` and polls default to `Pending` once
/// their queues run dry. Calls can be held open with `hold_requests` or
/// `hold_polls` until the matching release.
pub struct ScriptedClient {
    grants: Mutex<VecDeque<Result<DeviceCodeGrant, AuthError>>>,
    outcomes: Mutex<VecDeque<Result<PollOutcome, AuthError>>>,
    requests: AtomicUsize,
    polls: Mutex<Vec<(String, Instant)>>,
    request_gate: watch::Sender<bool>,
    poll_gate: watch::Sender<bool>,
    events_tx: mpsc::UnboundedSender<String>,
    events_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>,
}

impl Default for ScriptedClient {
    fn default() -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            grants: Mutex::new(VecDeque::new()),
            outcomes: Mutex::new(VecDeque::new()),
            requests: AtomicUsize::new(0),
            polls: Mutex::new(Vec::new()),
            request_gate: watch::channel(true).0,
            poll_gate: watch::channel(true).0,
            events_tx,
            events_rx: tokio::sync::Mutex::new(events_rx),
        }
    }
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_grants(self, grants: Vec<Result<DeviceCodeGrant, AuthError>>) -> Self {
        *self.grants.lock().expect("grants lock") = grants.into();
        self
    }

    pub fn with_outcomes(self, outcomes: Vec<Result<PollOutcome, AuthError>>) -> Self {
        *self.outcomes.lock().expect("outcomes lock") = outcomes.into();
        self
    }

    pub fn push_outcome(&self, outcome: Result<PollOutcome, AuthError>) {
        self.outcomes.lock().expect("outcomes lock").push_back(outcome);
    }

    pub fn hold_requests(&self) {
        self.request_gate.send_replace(false);
    }

    pub fn release_requests(&self) {
        self.request_gate.send_replace(true);
    }

    pub fn hold_polls(&self) {
        self.poll_gate.send_replace(false);
    }

    pub fn release_polls(&self) {
        self.poll_gate.send_replace(true);
    }

    /// Wait for the next call to reach the client: `request` or the polled device code.
    pub async fn next_call(&self) -> String {
        self.events_rx
            .lock()
            .await
            .recv()
            .await
            .expect("client dropped")
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn polls(&self) -> Vec<(String, Instant)> {
        self.polls.lock().expect("polls lock").clone()
    }

    pub fn polls_for(&self, device_code: &str) -> Vec<Instant> {
        self.polls()
            .into_iter()
            .filter(|(code, _)| code == device_code)
            .map(|(_, at)| at)
            .collect()
    }

}

async fn wait_open(gate: &watch::Sender<bool>) {
    let mut rx = gate.subscribe();
    let _ = rx.wait_for(|open| *open).await;
}

#[async_trait]
impl DeviceFlowClient for ScriptedClient {
    async fn request_device_code(&self) -> Result<DeviceCodeGrant, AuthError> {
        let n = self.requests.fetch_add(1, Ordering::SeqCst) + 1;
        let next = self.grants.lock().expect("grants lock").pop_front();
        let _ = self.events_tx.send("request".to_string());
        wait_open(&self.request_gate).await;
        next.unwrap_or_else(|| Ok(grant(n, 900, 5)))
    }

    async fn poll_for_token(&self, device_code: &str) -> Result<PollOutcome, AuthError> {
        self.polls
            .lock()
            .expect("polls lock")
            .push((device_code.to_string(), Instant::now()));
        let next = self.outcomes.lock().expect("outcomes lock").pop_front();
        let _ = self.events_tx.send(device_code.to_string());
        wait_open(&self.poll_gate).await;
        next.unwrap_or(Ok(PollOutcome::Pending))
    }
}

/// Status source returning whatever was last `set`.
pub struct StubStatus {
    status: Mutex<Result<AuthStatus, AuthError>>,
    fetches: AtomicUsize,
}

impl StubStatus {
    pub fn new(status: AuthStatus) -> Self {
        Self {
            status: Mutex::new(Ok(status)),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn signed_in(principal: &str) -> Self {
        Self::new(AuthStatus::signed_in(Some(principal.to_string()), None))
    }

    pub fn set(&self, status: Result<AuthStatus, AuthError>) {
        *self.status.lock().expect("status lock") = status;
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl Default for StubStatus {
    fn default() -> Self {
        Self::new(AuthStatus::signed_out())
    }
}

#[async_trait]
impl StatusSource for StubStatus {
    async fn fetch_auth_status(&self) -> Result<AuthStatus, AuthError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.status.lock().expect("status lock").clone()
    }
}

#[derive(Default)]
pub struct StubRevoker {
    calls: AtomicUsize,
    failure: Mutex<Option<AuthError>>,
}

impl StubRevoker {
    pub fn failing(error: AuthError) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            failure: Mutex::new(Some(error)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialRevoker for StubRevoker {
    async fn revoke_credential(&self) -> Result<(), AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.failure.lock().expect("failure lock").clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Prompt recording what it was asked to show, optionally failing every call.
#[derive(Default)]
pub struct RecordingPrompt {
    pub codes: Mutex<Vec<String>>,
    pub uris: Mutex<Vec<String>>,
    fail: bool,
}

impl RecordingPrompt {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    fn result(&self) -> Result<(), AuthError> {
        if self.fail {
            Err(AuthError::Io("clipboard unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

impl UserPrompt for RecordingPrompt {
    fn copy_user_code(&self, user_code: &str) -> Result<(), AuthError> {
        self.codes.lock().expect("codes lock").push(user_code.to_string());
        self.result()
    }

    fn open_verification_uri(&self, uri: &str) -> Result<(), AuthError> {
        self.uris.lock().expect("uris lock").push(uri.to_string());
        self.result()
    }
}

/// Wait until the scheduler reaches `Authenticated` or `Failed`.
pub async fn settle(scheduler: &PollingScheduler) -> AuthState {
    let mut rx = scheduler.subscribe();
    let state = rx
        .wait_for(AuthState::is_terminal)
        .await
        .expect("scheduler dropped")
        .clone();
    state
}
