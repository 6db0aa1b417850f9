//! Durable key/value storage for the client state.
//!
//! Every top-level collection lives under its own key so a damaged entry
//! never prevents the others from loading. [`Storage`] abstracts the backing
//! medium; [`FileStorage`] keeps one file per key and [`MemoryStorage`] is used
//! where nothing should touch disk.

pub mod file;
pub mod memory;
pub mod store;

#[cfg(test)]
mod tests;

use std::error::Error as StdError;
use std::fmt;

pub use file::FileStorage;
pub use memory::MemoryStorage;
pub use store::{PersistenceStore, SaveOutcome};

/// Logical storage keys.
pub mod keys {
    pub const CONFIG: &str = "config";
    pub const PROVIDERS: &str = "providers";
    pub const PROFILES: &str = "profiles";
    pub const FOLDERS: &str = "folders";
    pub const CHATS: &str = "chats";
    pub const CURRENT_CHAT_ID: &str = "currentChatId";
    pub const LOGIN_HASH: &str = "loginHash";
    pub const SESSION_EXPIRY: &str = "sessionExpiry";
    pub const SEED: &str = "seed";
    pub const SEED_SALT: &str = "seedSalt";
}

#[derive(Debug)]
pub enum StorageError {
    /// Writing `key` would exceed the configured capacity.
    QuotaExceeded {
        key: String,
        needed: u64,
        available: u64,
    },
    Io {
        key: String,
        source: std::io::Error,
    },
    Serialize {
        key: String,
        source: serde_json::Error,
    },
    InvalidKey(String),
}

impl StorageError {
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, StorageError::QuotaExceeded { .. })
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::QuotaExceeded {
                key,
                needed,
                available,
            } => write!(
                f,
                "Storage is full: writing '{key}' needs {needed} bytes but only {available} remain"
            ),
            StorageError::Io { key, source } => {
                write!(f, "Storage I/O failed for '{key}': {source}")
            }
            StorageError::Serialize { key, source } => {
                write!(f, "Failed to serialize '{key}': {source}")
            }
            StorageError::InvalidKey(key) => write!(f, "Invalid storage key '{key}'"),
        }
    }
}

impl StdError for StorageError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            StorageError::Io { source, .. } => Some(source),
            StorageError::Serialize { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// String key/value storage with a capacity limit, modelled on browser
/// local storage: a write either lands completely or fails without touching
/// the previous value.
pub trait Storage: Send {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&mut self, key: &str) -> Result<(), StorageError>;
    fn clear(&mut self) -> Result<(), StorageError>;
}

pub(crate) fn validate_key(key: &str) -> Result<(), StorageError> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(key.to_string()))
    }
}
