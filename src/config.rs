// Lockbox - Configuration
//
// Where the durable store lives and how it is keyed. Layers, lowest to
// highest precedence: built-in defaults, LOCKBOX_* environment variables,
// then whatever the caller (usually the CLI) sets on top.

use std::path::PathBuf;

use crate::enclave::{KdfParams, KeyringKeySource, DEFAULT_KEYRING_SERVICE, DEFAULT_KEYRING_USER};
use crate::store::{BackendError, GroupPolicy, SqliteBackend};

pub const ENV_DATA_DIR: &str = "LOCKBOX_DATA_DIR";
pub const ENV_ACCESS_GROUP: &str = "LOCKBOX_ACCESS_GROUP";
pub const ENV_ENTITLED_GROUPS: &str = "LOCKBOX_ENTITLED_GROUPS";
pub const ENV_KEYRING_SERVICE: &str = "LOCKBOX_KEYRING_SERVICE";

/// Database file name inside the data directory.
pub const DEFAULT_DB_FILE: &str = "lockbox.db";

/// Default directory for Lockbox data files.
pub fn default_data_dir() -> PathBuf {
    dirs_next::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lockbox")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub db_file: String,
    pub keyring_service: String,
    pub keyring_user: String,
    pub kdf: KdfParams,
    /// Group new items land in when a write names none.
    pub default_group: Option<String>,
    /// Groups this installation may touch. `None` means unrestricted.
    pub entitled_groups: Option<Vec<String>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            db_file: DEFAULT_DB_FILE.to_string(),
            keyring_service: DEFAULT_KEYRING_SERVICE.to_string(),
            keyring_user: DEFAULT_KEYRING_USER.to_string(),
            kdf: KdfParams::default(),
            default_group: None,
            entitled_groups: None,
        }
    }
}

impl Config {
    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overlaid with values from `lookup`. Empty values are ignored.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let mut config = Self::default();

        if let Some(dir) = get(ENV_DATA_DIR) {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(group) = get(ENV_ACCESS_GROUP) {
            config.default_group = Some(group.trim().to_string());
        }
        if let Some(groups) = get(ENV_ENTITLED_GROUPS) {
            config.entitled_groups = Some(parse_group_list(&groups));
        }
        if let Some(service) = get(ENV_KEYRING_SERVICE) {
            config.keyring_service = service;
        }
        config
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(&self.db_file)
    }

    pub fn group_policy(&self) -> GroupPolicy {
        let mut policy = GroupPolicy::unrestricted();
        if let Some(group) = &self.default_group {
            policy = policy.with_default_group(group.clone());
        }
        if let Some(groups) = &self.entitled_groups {
            policy = policy.with_entitlements(groups.iter().cloned());
        }
        policy
    }

    pub fn key_source(&self) -> KeyringKeySource {
        KeyringKeySource::with_names(&self.keyring_service, &self.keyring_user)
    }

    /// Open the durable store. The master secret must already exist.
    pub fn open_backend(&self) -> Result<SqliteBackend, BackendError> {
        tracing::debug!(path = %self.db_path().display(), "Opening secure store");
        SqliteBackend::open_with_source(
            &self.db_path(),
            &self.key_source(),
            &self.kdf,
            self.group_policy(),
        )
    }
}

/// Comma-separated group names, blanks dropped.
fn parse_group_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|group| !group.is_empty())
        .map(str::to_string)
        .collect()
}
