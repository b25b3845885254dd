use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use dashmap::DashMap;
use tracing::{debug, info};

use crate::error::{AuthError, AuthResult};

/// Identity provider access token
pub const ACCESS_TOKEN_KEY: &str = "access_token";
/// Identity provider identity token
pub const ID_TOKEN_KEY: &str = "id_token";
/// Session expiry, stringified epoch milliseconds
pub const EXPIRES_AT_KEY: &str = "expires_at";
/// JSON encoded user profile
pub const PROFILE_KEY: &str = "profile";
/// Post-login destination, kept for one login round-trip
pub const REDIRECT_KEY: &str = "authRedirect";

/// Hosted-login `state` values awaiting their redirect
pub const PENDING_AUTHORIZATIONS_KEY: &str = "authPending";

/// Every key holding session state
pub const SESSION_KEYS: &[&str] = &[
    ACCESS_TOKEN_KEY,
    ID_TOKEN_KEY,
    EXPIRES_AT_KEY,
    PROFILE_KEY,
    REDIRECT_KEY,
];

/// Durable key/value storage capability
pub trait SessionStorage: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str) -> AuthResult<()>;

    /// Remove a key; removing an absent key succeeds
    fn remove(&self, key: &str) -> AuthResult<()>;
}

/// In-memory storage, lost when the process exits
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: DashMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl SessionStorage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    fn set(&self, key: &str, value: &str) -> AuthResult<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> AuthResult<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// JSON file backed storage, written through on every mutation
pub struct FileStorage {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, String>>,
}

impl FileStorage {
    /// Open the store at `path`, starting empty when the file does not exist
    pub fn open(path: impl AsRef<Path>) -> AuthResult<Self> {
        let path = path.as_ref().to_path_buf();

        // Load whatever a previous run left behind
        let entries = if path.exists() {
            let raw = fs::read_to_string(&path).map_err(|e| storage_error("*", e))?;
            if raw.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&raw).map_err(|e| storage_error("*", e))?
            }
        } else {
            debug!(path = %path.display(), "No session file found, starting empty");
            BTreeMap::new()
        };

        info!(path = %path.display(), keys = entries.len(), "Opened session storage");
        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self, key: &str, entries: &BTreeMap<String, String>) -> AuthResult<()> {
        let serialized = serde_json::to_string_pretty(entries).map_err(|e| storage_error(key, e))?;

        // Write beside the target, then swap it in
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serialized).map_err(|e| storage_error(key, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| storage_error(key, e))?;
        Ok(())
    }
}

impl SessionStorage for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) -> AuthResult<()> {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.insert(key.to_string(), value.to_string());
        self.save(key, &entries)
    }

    fn remove(&self, key: &str) -> AuthResult<()> {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if entries.remove(key).is_none() {
            return Ok(());
        }
        self.save(key, &entries)
    }
}

fn storage_error(key: &str, err: impl std::fmt::Display) -> AuthError {
    AuthError::Storage {
        key: key.to_string(),
        reason: err.to_string(),
    }
}
