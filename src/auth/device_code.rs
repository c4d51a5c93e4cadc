use std::time::Duration;

use bon::Builder;
use serde::{Deserialize, Serialize};

/// Seconds added on top of the provider's minimum polling interval.
pub const DEFAULT_INTERVAL_PADDING_SECS: u64 = 3;
/// Hard lower bound on the polling cadence, whatever the provider suggests.
pub const DEFAULT_MIN_INTERVAL_SECS: u64 = 8;
/// Cadence never drops below this, even with a zero floor configured.
const ABSOLUTE_MIN_INTERVAL_SECS: u64 = 1;

/// Grant returned when a device-code flow starts.
///
/// `device_code` is presented back to the provider on every poll and is never
/// serialized, so a grant can be handed to a UI layer as-is.
///
/// # Example
/// ```
/// use device_auth::auth::DeviceCodeGrant;
///
/// let grant = DeviceCodeGrant {
///     device_code: "3584d83530557fdd1f46af8289938c8ef79f9dc5".to_string(),
///     user_code: "WDJB-MJHT".to_string(),
///     verification_uri: "https://github.com/login/device".to_string(),
///     expires_in: 900,
///     interval: 5,
/// };
/// let json = serde_json::to_value(&grant).unwrap();
/// assert!(json.get("device_code").is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCodeGrant {
    #[serde(skip_serializing, default)]
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    pub expires_in: u64,
    pub interval: u64,
}

/// Result of a single `poll_for_token` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The user approved the request.
    Approved { principal: Option<String> },
    /// The user has not finished approving yet.
    Pending,
    /// The provider asked us to poll less frequently.
    SlowDown,
    /// The user (or provider) refused the request.
    Denied { reason: String },
    /// The provider considers the device code expired.
    Expired,
}

impl PollOutcome {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending | Self::SlowDown)
    }
}

/// Polling cadence settings.
///
/// # Example
/// ```
/// use device_auth::auth::PollingConfig;
/// use std::time::Duration;
///
/// let config = PollingConfig::builder().slow_down_step_secs(5).build();
/// assert_eq!(config.effective_interval(10), Duration::from_secs(13));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    #[builder(default = DEFAULT_INTERVAL_PADDING_SECS)]
    pub interval_padding_secs: u64,
    #[builder(default = DEFAULT_MIN_INTERVAL_SECS)]
    pub min_interval_secs: u64,
    /// Added to the cadence on every `SlowDown`; zero keeps the cadence fixed.
    #[builder(default)]
    pub slow_down_step_secs: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl PollingConfig {
    /// Cadence for a provider-suggested interval: `max(interval + padding, floor)`,
    /// and never shorter than one second.
    pub fn effective_interval(&self, interval_secs: u64) -> Duration {
        let padded = interval_secs.saturating_add(self.interval_padding_secs);
        let floor = self.min_interval_secs.max(ABSOLUTE_MIN_INTERVAL_SECS);
        Duration::from_secs(padded.max(floor))
    }

    /// Cadence after the provider signalled `SlowDown`.
    pub fn widen(&self, current: Duration) -> Duration {
        current.saturating_add(Duration::from_secs(self.slow_down_step_secs))
    }
}
