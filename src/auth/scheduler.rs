//! Polling scheduler for a single device-code attempt.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::backend::DeviceFlowClient;
use super::device_code::{DeviceCodeGrant, PollOutcome, PollingConfig};
use super::error::AuthError;
use super::state::AuthState;
use super::status::AuthStatusCache;

/// Identifier of one device-code attempt.
pub type AttemptId = Uuid;

/// Drives one device-code attempt at a time.
///
/// Each attempt runs in its own task that owns both the interval ticker and
/// the expiry timer, so cancelling the attempt's token stops both at once.
/// Every state change is applied under a single lock and only if it comes
/// from the attempt that is currently registered; anything else is dropped.
pub struct PollingScheduler {
    shared: Arc<Shared>,
}

struct Shared {
    client: Arc<dyn DeviceFlowClient>,
    config: PollingConfig,
    cache: Option<Arc<AuthStatusCache>>,
    inner: Mutex<Option<ActiveAttempt>>,
    state_tx: watch::Sender<AuthState>,
}

struct ActiveAttempt {
    id: AttemptId,
    cancel: CancellationToken,
}

/// Live polling process for one grant. Owned by the attempt task.
struct PollingAttempt {
    id: AttemptId,
    grant: DeviceCodeGrant,
    deadline: Instant,
    interval: Duration,
    cancel: CancellationToken,
}

impl PollingScheduler {
    pub fn new(client: Arc<dyn DeviceFlowClient>, config: PollingConfig) -> Self {
        Self::build(client, config, None)
    }

    /// Invalidate `cache` whenever an attempt is approved.
    pub fn with_status_cache(self, cache: Arc<AuthStatusCache>) -> Self {
        self.cancel();
        Self::build(self.shared.client.clone(), self.shared.config.clone(), Some(cache))
    }

    fn build(
        client: Arc<dyn DeviceFlowClient>,
        config: PollingConfig,
        cache: Option<Arc<AuthStatusCache>>,
    ) -> Self {
        let (state_tx, _) = watch::channel(AuthState::Idle);
        Self {
            shared: Arc::new(Shared {
                client,
                config,
                cache,
                inner: Mutex::new(None),
                state_tx,
            }),
        }
    }

    pub fn current_state(&self) -> AuthState {
        self.shared.state_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.shared.state_tx.subscribe()
    }

    /// Whether an attempt is registered (requesting a grant or polling).
    pub fn is_attempting(&self) -> bool {
        self.shared.lock().is_some()
    }

    /// Start a new attempt, tearing down any previous one first.
    ///
    /// Returns the state right after the grant request settled: normally
    /// `AwaitingApproval`, `Failed` if the grant request failed, or whatever a
    /// concurrent `start`/`cancel` left behind if this attempt was superseded.
    pub async fn start(&self) -> AuthState {
        let id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        {
            let mut active = self.shared.lock();
            if let Some(previous) = active.take() {
                tracing::debug!(attempt = %previous.id, "replacing device-code attempt");
                previous.cancel.cancel();
            }
            *active = Some(ActiveAttempt {
                id,
                cancel: cancel.clone(),
            });
            self.shared.set_state(AuthState::Idle);
        }

        let requested = tokio::select! {
            biased;
            _ = cancel.cancelled() => return self.current_state(),
            result = self.shared.client.request_device_code() => result,
        };

        let grant = match requested {
            Ok(grant) => grant,
            Err(err) => {
                tracing::warn!(attempt = %id, error = %err, "device code request failed");
                self.shared.finish(id, AuthState::Failed(err));
                return self.current_state();
            }
        };

        let Some(deadline) = Instant::now().checked_add(Duration::from_secs(grant.expires_in))
        else {
            tracing::warn!(attempt = %id, expires_in = grant.expires_in, "grant lifetime out of range");
            self.shared.finish(
                id,
                AuthState::Failed(AuthError::InvalidResponse(format!(
                    "device code expires_in out of range: {}",
                    grant.expires_in
                ))),
            );
            return self.current_state();
        };

        let attempt = PollingAttempt {
            id,
            deadline,
            interval: self.shared.config.effective_interval(grant.interval),
            grant,
            cancel,
        };

        {
            let active = self.shared.lock();
            if !matches!(active.as_ref(), Some(current) if current.id == id) {
                tracing::debug!(attempt = %id, "discarding grant for superseded attempt");
                return self.shared.state_tx.borrow().clone();
            }
            tracing::info!(
                attempt = %id,
                user_code = %attempt.grant.user_code,
                verification_uri = %attempt.grant.verification_uri,
                expires_in = attempt.grant.expires_in,
                interval_secs = attempt.interval.as_secs(),
                "awaiting device approval"
            );
            let awaiting = AuthState::AwaitingApproval(attempt.grant.clone());
            self.shared.set_state(awaiting.clone());
            tokio::spawn(run_attempt(self.shared.clone(), attempt));
            awaiting
        }
    }

    /// Drop a lingering `Authenticated` display state back to `Idle`.
    ///
    /// Leaves any other state, including a live attempt, untouched.
    pub fn clear_authenticated(&self) {
        let _active = self.shared.lock();
        self.shared.state_tx.send_if_modified(|state| {
            if matches!(state, AuthState::Authenticated { .. }) {
                *state = AuthState::Idle;
                true
            } else {
                false
            }
        });
    }

    /// Stop any attempt and return to `Idle`. Safe to call in any state.
    pub fn cancel(&self) {
        let mut active = self.shared.lock();
        if let Some(attempt) = active.take() {
            tracing::debug!(attempt = %attempt.id, "device-code attempt cancelled");
            attempt.cancel.cancel();
        }
        self.shared.set_state(AuthState::Idle);
    }

    /// Teardown hook: stop every timer owned by the scheduler.
    pub fn shutdown(&self) {
        self.cancel();
    }
}

impl Drop for PollingScheduler {
    fn drop(&mut self) {
        if let Some(attempt) = self.shared.lock().take() {
            attempt.cancel.cancel();
        }
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Option<ActiveAttempt>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // Callers hold the attempt lock so transitions never interleave.
    fn set_state(&self, next: AuthState) {
        self.state_tx.send_if_modified(|state| {
            if *state == next {
                false
            } else {
                *state = next;
                true
            }
        });
    }

    /// Apply a terminal state for `id` if it is still the active attempt.
    fn finish(&self, id: AttemptId, next: AuthState) -> bool {
        let mut active = self.lock();
        if !matches!(active.as_ref(), Some(current) if current.id == id) {
            tracing::debug!(attempt = %id, "dropping result of stale attempt");
            return false;
        }
        if let Some(attempt) = active.take() {
            attempt.cancel.cancel();
        }
        let approved = matches!(next, AuthState::Authenticated { .. });
        self.set_state(next);
        if approved {
            if let Some(cache) = &self.cache {
                cache.invalidate();
            }
        }
        true
    }
}

enum Step {
    Continue { slow_down: bool },
    Finish(AuthState),
}

fn classify(result: Result<PollOutcome, AuthError>) -> Step {
    match result {
        Ok(outcome) if !outcome.is_terminal() => Step::Continue {
            slow_down: outcome == PollOutcome::SlowDown,
        },
        Err(err) if err.is_pending() => Step::Continue {
            slow_down: err == AuthError::SlowDown,
        },
        Ok(PollOutcome::Approved { principal }) => {
            Step::Finish(AuthState::Authenticated { principal })
        }
        Ok(PollOutcome::Denied { reason }) => {
            Step::Finish(AuthState::Failed(AuthError::AccessDenied(reason)))
        }
        // Expired; the non-terminal outcomes were taken above.
        Ok(_) => Step::Finish(AuthState::Failed(AuthError::ExpiredGrant)),
        Err(err) => Step::Finish(AuthState::Failed(err)),
    }
}

async fn run_attempt(shared: Arc<Shared>, mut attempt: PollingAttempt) {
    let expiry = time::sleep_until(attempt.deadline);
    tokio::pin!(expiry);

    // First tick completes immediately: poll once before waiting an interval.
    let mut ticker = time::interval(attempt.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut polls = 0u32;

    loop {
        tokio::select! {
            biased;
            _ = attempt.cancel.cancelled() => return,
            _ = &mut expiry => {
                expire(&shared, &attempt);
                return;
            }
            _ = ticker.tick() => {}
        }

        if Instant::now() > attempt.deadline {
            expire(&shared, &attempt);
            return;
        }

        polls += 1;
        let result = tokio::select! {
            biased;
            _ = attempt.cancel.cancelled() => return,
            _ = &mut expiry => {
                expire(&shared, &attempt);
                return;
            }
            result = shared.client.poll_for_token(&attempt.grant.device_code) => result,
        };

        match classify(result) {
            Step::Continue { slow_down } => {
                tracing::debug!(attempt = %attempt.id, polls, slow_down, "authorization pending");
                if slow_down {
                    let widened = shared.config.widen(attempt.interval);
                    if widened != attempt.interval {
                        attempt.interval = widened;
                        ticker = time::interval_at(Instant::now() + widened, widened);
                        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                        tracing::debug!(
                            attempt = %attempt.id,
                            interval_secs = widened.as_secs(),
                            "provider asked to slow down; widening interval"
                        );
                    }
                }
            }
            Step::Finish(state) => {
                match &state {
                    AuthState::Failed(err) => {
                        tracing::warn!(attempt = %attempt.id, polls, error = %err, "device authorization failed")
                    }
                    _ => tracing::info!(attempt = %attempt.id, polls, "device authorization approved"),
                }
                shared.finish(attempt.id, state);
                return;
            }
        }
    }
}

fn expire(shared: &Shared, attempt: &PollingAttempt) {
    tracing::warn!(attempt = %attempt.id, "device code expired before approval");
    shared.finish(attempt.id, AuthState::Failed(AuthError::ExpiredGrant));
}
