//! Configuration system (layered: defaults > TOML file > environment).

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::auth::controller::ControllerSettings;
use crate::auth::device_code::PollingConfig;
use crate::auth::providers::github_copilot::{
    GitHubCopilotAuth, DEFAULT_ACCESS_TOKEN_URL, DEFAULT_CLIENT_ID, DEFAULT_COPILOT_TOKEN_URL,
    DEFAULT_DEVICE_CODE_URL, DEFAULT_SCOPE, DEFAULT_USER_URL,
};
use crate::auth::status::{DEFAULT_REFRESH_TIMEOUT, DEFAULT_STATUS_TTL};
use crate::auth::store::{default_data_dir, FileTokenStore, TokenStoreConfig};
use crate::error::{Error, Result};

/// Prefix shared by every environment override.
pub const ENV_PREFIX: &str = "DEVICE_AUTH_";

/// Layered configuration for device-code login.
///
/// Resolution order, later layers winning:
/// 1. Built-in defaults
/// 2. A TOML file (see [`DeviceAuthConfig::load`])
/// 3. `DEVICE_AUTH_*` environment variables, after loading `.env` if present
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceAuthConfig {
    /// Credential profile; each profile keeps its own stored token.
    pub profile: String,
    /// Directory for stored tokens. Defaults to `~/.device-auth`.
    pub data_dir: Option<PathBuf>,
    pub github: GitHubConfig,
    pub polling: PollingConfig,
    pub status: StatusConfig,
}

/// GitHub OAuth application and endpoint settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    pub client_id: String,
    pub scope: String,
    pub device_code_url: String,
    pub access_token_url: String,
    pub copilot_token_url: String,
    pub user_url: String,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            client_id: DEFAULT_CLIENT_ID.to_string(),
            scope: DEFAULT_SCOPE.to_string(),
            device_code_url: DEFAULT_DEVICE_CODE_URL.to_string(),
            access_token_url: DEFAULT_ACCESS_TOKEN_URL.to_string(),
            copilot_token_url: DEFAULT_COPILOT_TOKEN_URL.to_string(),
            user_url: DEFAULT_USER_URL.to_string(),
        }
    }
}

/// Status cache freshness and refresh bound, in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    pub ttl_secs: u64,
    pub timeout_secs: u64,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_STATUS_TTL.as_secs(),
            timeout_secs: DEFAULT_REFRESH_TIMEOUT.as_secs(),
        }
    }
}

impl Default for DeviceAuthConfig {
    fn default() -> Self {
        Self {
            profile: "default".to_string(),
            data_dir: None,
            github: GitHubConfig::default(),
            polling: PollingConfig::default(),
            status: StatusConfig::default(),
        }
    }
}

impl DeviceAuthConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Read a TOML config file on top of the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Defaults overridden by the environment.
    pub fn from_env() -> Result<Self> {
        Self::resolve(None)
    }

    /// Full layering: defaults, then `path` when given, then the environment.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_env_with(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `DEVICE_AUTH_*` overrides read through `lookup`.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(profile) = var("PROFILE") {
            self.profile = profile;
        }
        if let Some(dir) = var("DATA_DIR") {
            self.data_dir = Some(PathBuf::from(dir));
        }

        let string_overrides = [
            ("CLIENT_ID", &mut self.github.client_id),
            ("SCOPE", &mut self.github.scope),
            ("DEVICE_CODE_URL", &mut self.github.device_code_url),
            ("ACCESS_TOKEN_URL", &mut self.github.access_token_url),
            ("COPILOT_TOKEN_URL", &mut self.github.copilot_token_url),
            ("USER_URL", &mut self.github.user_url),
        ];
        for (name, slot) in string_overrides {
            if let Some(value) = var(name) {
                *slot = value;
            }
        }

        let number_overrides = [
            ("INTERVAL_PADDING_SECS", &mut self.polling.interval_padding_secs),
            ("MIN_INTERVAL_SECS", &mut self.polling.min_interval_secs),
            ("SLOW_DOWN_STEP_SECS", &mut self.polling.slow_down_step_secs),
            ("STATUS_TTL_SECS", &mut self.status.ttl_secs),
            ("STATUS_TIMEOUT_SECS", &mut self.status.timeout_secs),
        ];
        for (name, slot) in number_overrides {
            if let Some(value) = var(name) {
                *slot = value.trim().parse().map_err(|_| {
                    Error::Configuration(format!(
                        "{ENV_PREFIX}{name} must be a whole number of seconds, got '{value}'"
                    ))
                })?;
            }
        }
        Ok(())
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(default_data_dir)
    }

    pub fn token_store(&self) -> FileTokenStore {
        FileTokenStore::new(TokenStoreConfig::new(self.data_dir()))
    }

    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings::builder()
            .polling(self.polling.clone())
            .status_ttl(Duration::from_secs(self.status.ttl_secs))
            .status_timeout(Duration::from_secs(self.status.timeout_secs))
            .build()
    }

    /// GitHub backend wired to this configuration's endpoints and token store.
    pub fn build_backend(&self) -> Arc<GitHubCopilotAuth> {
        Arc::new(GitHubCopilotAuth::from_config(self, Arc::new(self.token_store())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_reference_cadence() {
        let config = DeviceAuthConfig::default();
        assert_eq!(config.polling.interval_padding_secs, 3);
        assert_eq!(config.polling.min_interval_secs, 8);
        assert_eq!(config.polling.slow_down_step_secs, 0);
        assert_eq!(config.status.ttl_secs, 30);
        assert_eq!(config.github.client_id, DEFAULT_CLIENT_ID);
    }

    #[test]
    fn partial_toml_keeps_remaining_defaults() {
        let config = DeviceAuthConfig::from_toml_str(
            r#"
profile = "work"

[polling]
slow_down_step_secs = 5

[github]
client_id = "Iv1.custom"
"#,
        )
        .unwrap();
        assert_eq!(config.profile, "work");
        assert_eq!(config.polling.slow_down_step_secs, 5);
        assert_eq!(config.polling.min_interval_secs, 8);
        assert_eq!(config.github.client_id, "Iv1.custom");
        assert_eq!(config.github.scope, DEFAULT_SCOPE);
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = DeviceAuthConfig::from_toml_str("profile = \"work\"").unwrap();
        config
            .apply_env_with(env(&[
                ("DEVICE_AUTH_PROFILE", "ci"),
                ("DEVICE_AUTH_MIN_INTERVAL_SECS", "12"),
                ("DEVICE_AUTH_DEVICE_CODE_URL", "http://localhost:9000/code"),
            ]))
            .unwrap();
        assert_eq!(config.profile, "ci");
        assert_eq!(config.polling.min_interval_secs, 12);
        assert_eq!(config.github.device_code_url, "http://localhost:9000/code");
    }

    #[test]
    fn invalid_number_in_env_is_configuration_error() {
        let mut config = DeviceAuthConfig::default();
        let err = config
            .apply_env_with(env(&[("DEVICE_AUTH_STATUS_TTL_SECS", "soon")]))
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(ref msg) if msg.contains("STATUS_TTL_SECS")));
    }

    #[test]
    fn malformed_toml_is_rejected() {
        assert!(matches!(
            DeviceAuthConfig::from_toml_str("profile = ["),
            Err(Error::Serialization(_))
        ));
    }

    #[test]
    fn controller_settings_follow_config() {
        let mut config = DeviceAuthConfig::default();
        config.status.ttl_secs = 5;
        config.polling.slow_down_step_secs = 2;
        let settings = config.controller_settings();
        assert_eq!(settings.status_ttl, Duration::from_secs(5));
        assert_eq!(settings.status_timeout, Duration::from_secs(10));
        assert_eq!(settings.polling.slow_down_step_secs, 2);
    }

    #[test]
    fn explicit_data_dir_wins() {
        let config = DeviceAuthConfig {
            data_dir: Some(PathBuf::from("/tmp/device-auth-test")),
            ..Default::default()
        };
        assert_eq!(
            config.token_store().base_dir(),
            Path::new("/tmp/device-auth-test")
        );
    }
}
