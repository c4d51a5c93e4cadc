use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::AuthError;
use super::token::Token;

const CREDENTIAL_FORMAT: u32 = 1;
const DEFAULT_SLOT: &str = "default";

/// Persistence for the credential a provider backend obtains on approval.
pub trait TokenStore: Send + Sync {
    fn load(&self, provider: &str, profile: &str) -> Result<Option<Token>, AuthError>;
    fn save(&self, provider: &str, profile: &str, token: &Token) -> Result<(), AuthError>;
    fn clear(&self, provider: &str, profile: &str) -> Result<(), AuthError>;
}

#[derive(Debug, Clone)]
pub struct TokenStoreConfig {
    pub base_dir: PathBuf,
}

impl TokenStoreConfig {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn default_dir() -> PathBuf {
        default_data_dir()
    }
}

/// Credential store with one TOML document per provider and profile.
///
/// Writes go through a sibling temp file and a rename, so a reader never sees
/// a half-written credential. On unix the file is created owner-only.
///
/// # Example
/// ```no_run
/// use device_auth::auth::{FileTokenStore, Token, TokenStore};
///
/// let store = FileTokenStore::new_default();
/// store.save("github", "default", &Token::new("gho_example"))?;
/// # Ok::<(), device_auth::auth::AuthError>(())
/// ```
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    base_dir: PathBuf,
}

impl FileTokenStore {
    pub fn new(config: TokenStoreConfig) -> Self {
        Self {
            base_dir: config.base_dir,
        }
    }

    pub fn new_default() -> Self {
        Self::new(TokenStoreConfig::new(default_data_dir()))
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn slot_path(&self, provider: &str, profile: &str) -> PathBuf {
        self.base_dir.join(Slot::new(provider, profile).file_name())
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self, provider: &str, profile: &str) -> Result<Option<Token>, AuthError> {
        let path = self.slot_path(provider, profile);
        let Some(raw) = read_if_present(&path)? else {
            return Ok(None);
        };
        let record: CredentialRecord = toml::from_str(&raw)?;
        if record.format > CREDENTIAL_FORMAT {
            return Err(AuthError::Serialization(format!(
                "{}: credential format {} is newer than supported {}",
                path.display(),
                record.format,
                CREDENTIAL_FORMAT
            )));
        }
        Ok(Some(record.token))
    }

    fn save(&self, provider: &str, profile: &str, token: &Token) -> Result<(), AuthError> {
        fs::create_dir_all(&self.base_dir)?;
        let path = self.slot_path(provider, profile);
        let record = CredentialRecord {
            format: CREDENTIAL_FORMAT,
            provider: provider.to_string(),
            profile: profile.to_string(),
            saved_at: Utc::now(),
            token: token.clone(),
        };
        replace_file(&path, toml::to_string(&record)?.as_bytes())?;
        tracing::debug!(provider, profile, path = %path.display(), "credential stored");
        Ok(())
    }

    fn clear(&self, provider: &str, profile: &str) -> Result<(), AuthError> {
        match fs::remove_file(self.slot_path(provider, profile)) {
            Err(err) if err.kind() != ErrorKind::NotFound => Err(err.into()),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CredentialRecord {
    #[serde(alias = "version")]
    format: u32,
    provider: String,
    profile: String,
    saved_at: DateTime<Utc>,
    token: Token,
}

/// Normalized provider/profile pair naming one credential file.
#[derive(Debug, PartialEq, Eq)]
struct Slot {
    provider: String,
    profile: String,
}

impl Slot {
    fn new(provider: &str, profile: &str) -> Self {
        Self {
            provider: normalize(provider),
            profile: normalize(profile),
        }
    }

    fn file_name(&self) -> String {
        match self.profile.as_str() {
            DEFAULT_SLOT => format!("{}.toml", self.provider),
            profile => format!("{}.{profile}.toml", self.provider),
        }
    }
}

/// Lowercase, with runs of anything outside `[a-z0-9-]` folded to one `-`.
fn normalize(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    for ch in label.chars().map(|ch| ch.to_ascii_lowercase()) {
        if ch.is_ascii_alphanumeric() {
            out.push(ch);
        } else if !out.is_empty() && !out.ends_with('-') {
            out.push('-');
        }
    }
    let trimmed = out.trim_end_matches('-');
    if trimmed.is_empty() {
        DEFAULT_SLOT.to_string()
    } else {
        trimmed.to_string()
    }
}

fn read_if_present(path: &Path) -> Result<Option<String>, AuthError> {
    match fs::read_to_string(path) {
        Ok(raw) => Ok(Some(raw)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn replace_file(path: &Path, contents: &[u8]) -> Result<(), AuthError> {
    let staging = path.with_extension("toml.tmp");
    let written = create_private(&staging).and_then(|mut file| {
        file.write_all(contents)?;
        file.sync_all()
    });
    if let Err(err) = written.and_then(|()| fs::rename(&staging, path)) {
        let _ = fs::remove_file(&staging);
        return Err(err.into());
    }
    Ok(())
}

fn create_private(path: &Path) -> std::io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path)
}

/// `~/.device-auth`, or `.device-auth` when no home directory is known.
pub fn default_data_dir() -> PathBuf {
    directories::UserDirs::new()
        .map(|dirs| dirs.home_dir().join(".device-auth"))
        .unwrap_or_else(|| PathBuf::from(".device-auth"))
}
