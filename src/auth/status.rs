//! Read-through cache of the authentication status.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use super::backend::{AuthStatus, StatusSource};
use super::error::AuthError;
use crate::util::timeout::with_timeout;

/// How long a fetched status is served without asking the source again.
pub const DEFAULT_STATUS_TTL: Duration = Duration::from_secs(30);
/// Upper bound on a single status refresh.
pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(10);

/// Last known authentication status with a freshness window.
///
/// The cache is never the source of truth for an in-flight device flow; it only
/// answers "who is logged in" for readers. Writers invalidate it explicitly.
pub struct AuthStatusCache {
    source: Arc<dyn StatusSource>,
    ttl: Duration,
    refresh_timeout: Duration,
    inner: Mutex<CacheInner>,
}

#[derive(Default)]
struct CacheInner {
    entry: Option<CachedStatus>,
    last_error: Option<AuthError>,
    // Bumped by every explicit write so a slow refresh cannot resurrect old state.
    epoch: u64,
}

struct CachedStatus {
    status: AuthStatus,
    fetched_at: Instant,
}

impl AuthStatusCache {
    pub fn new(source: Arc<dyn StatusSource>) -> Self {
        Self {
            source,
            ttl: DEFAULT_STATUS_TTL,
            refresh_timeout: DEFAULT_REFRESH_TIMEOUT,
            inner: Mutex::new(CacheInner::default()),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = timeout;
        self
    }

    /// Cached status, refreshed first when absent or older than the TTL.
    ///
    /// A failed refresh keeps serving the previous value (or signed-out when
    /// nothing was ever fetched); the error is available from [`Self::last_error`].
    pub async fn status(&self) -> AuthStatus {
        if let Some(status) = self.fresh() {
            return status;
        }
        match self.refresh().await {
            Ok(status) => status,
            Err(_) => self.cached().unwrap_or_default(),
        }
    }

    /// Fetch from the source unconditionally and store the result.
    pub async fn refresh(&self) -> Result<AuthStatus, AuthError> {
        let epoch = self.lock().epoch;
        let result = with_timeout(self.refresh_timeout, self.source.fetch_auth_status()).await;

        let mut inner = self.lock();
        match result {
            Ok(status) => {
                if inner.epoch == epoch {
                    inner.entry = Some(CachedStatus {
                        status: status.clone(),
                        fetched_at: Instant::now(),
                    });
                    inner.last_error = None;
                } else {
                    tracing::debug!("discarding status fetched across an invalidation");
                }
                Ok(status)
            }
            Err(err) => {
                tracing::warn!(error = %err, "auth status refresh failed");
                if inner.epoch == epoch {
                    inner.last_error = Some(err.clone());
                }
                Err(err)
            }
        }
    }

    /// Last stored status regardless of age, without touching the source.
    pub fn cached(&self) -> Option<AuthStatus> {
        self.lock().entry.as_ref().map(|e| e.status.clone())
    }

    pub fn is_fresh(&self) -> bool {
        self.fresh().is_some()
    }

    /// Error from the most recent failed refresh, cleared by a successful one.
    pub fn last_error(&self) -> Option<AuthError> {
        self.lock().last_error.clone()
    }

    /// Drop the cached entry so the next read goes to the source.
    pub fn invalidate(&self) {
        let mut inner = self.lock();
        inner.entry = None;
        inner.epoch += 1;
    }

    /// Record a fresh signed-out status, e.g. right after logout.
    pub fn mark_signed_out(&self) {
        let mut inner = self.lock();
        inner.entry = Some(CachedStatus {
            status: AuthStatus::signed_out(),
            fetched_at: Instant::now(),
        });
        inner.last_error = None;
        inner.epoch += 1;
    }

    fn fresh(&self) -> Option<AuthStatus> {
        let inner = self.lock();
        let entry = inner.entry.as_ref()?;
        (entry.fetched_at.elapsed() <= self.ttl).then(|| entry.status.clone())
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
