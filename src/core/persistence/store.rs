use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::{keys, Storage, StorageError};
use crate::core::chat::{Chat, Folder, Profile};
use crate::core::config::Config;
use crate::core::providers::Provider;
use crate::core::state::AppState;
use crate::core::vault::{Vault, VaultError, KDF_ITERATIONS};

/// Upper bound on persisted chats before any quota pressure.
pub const DEFAULT_CHAT_CAP: usize = 200;

/// Result of [`PersistenceStore::save_all`].
#[derive(Debug)]
pub enum SaveOutcome {
    Saved,
    /// Storage ran out of space; only the newest `retained` chats were kept.
    Recovered { retained: usize },
    Failed(StorageError),
}

impl SaveOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, SaveOutcome::Failed(_))
    }
}

/// Serializes [`AppState`] into a [`Storage`], one key per collection.
pub struct PersistenceStore {
    storage: Box<dyn Storage>,
    vault: Vault,
    iterations: u32,
    chat_cap: usize,
}

impl std::fmt::Debug for PersistenceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceStore")
            .field("vault", &self.vault)
            .field("chat_cap", &self.chat_cap)
            .finish_non_exhaustive()
    }
}

fn to_json<T: Serialize + ?Sized>(key: &str, value: &T) -> Result<String, StorageError> {
    serde_json::to_string(value).map_err(|source| StorageError::Serialize {
        key: key.to_string(),
        source,
    })
}

impl PersistenceStore {
    pub fn open(storage: Box<dyn Storage>) -> Result<Self, VaultError> {
        Self::open_with_iterations(storage, KDF_ITERATIONS)
    }

    pub fn open_with_iterations(
        mut storage: Box<dyn Storage>,
        iterations: u32,
    ) -> Result<Self, VaultError> {
        let vault = Vault::open_with_iterations(storage.as_mut(), iterations)?;
        Ok(Self {
            storage,
            vault,
            iterations,
            chat_cap: DEFAULT_CHAT_CAP,
        })
    }

    pub fn storage(&self) -> &dyn Storage {
        self.storage.as_ref()
    }

    pub fn storage_mut(&mut self) -> &mut dyn Storage {
        self.storage.as_mut()
    }

    /// Work factor used for key derivation by this store's vault.
    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Current chat cap; lowered permanently after a quota recovery.
    pub fn chat_cap(&self) -> usize {
        self.chat_cap
    }

    fn providers_json(&self, providers: &[Provider]) -> Result<String, StorageError> {
        let mut sealed = Vec::with_capacity(providers.len());
        for provider in providers {
            let api_key = self.vault.encrypt(&provider.api_key).map_err(|err| {
                StorageError::Io {
                    key: keys::PROVIDERS.to_string(),
                    source: std::io::Error::other(err.to_string()),
                }
            })?;
            sealed.push(Provider {
                api_key,
                ..provider.clone()
            });
        }
        to_json(keys::PROVIDERS, &sealed)
    }

    fn chats_json(chats: &[Chat], cap: usize) -> Result<String, StorageError> {
        let kept: Vec<Chat> = chats.iter().take(cap).map(Chat::storage_copy).collect();
        to_json(keys::CHATS, &kept)
    }

    /// Write every key, chats last. When the storage reports it is full the
    /// chat list is halved once and the remaining keys are retried.
    pub fn save_all(&mut self, state: &AppState) -> SaveOutcome {
        let head = match self.head_entries(state) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(error = %err, "Could not serialize state");
                return SaveOutcome::Failed(err);
            }
        };

        let mut pending = head.as_slice();
        while let Some(((key, value), rest)) = pending.split_first() {
            match self.storage.set(key, value) {
                Ok(()) => pending = rest,
                Err(err) if err.is_quota_exceeded() => return self.recover(state, pending),
                Err(err) => {
                    warn!(key, error = %err, "Saving state failed");
                    return SaveOutcome::Failed(err);
                }
            }
        }

        let chats = match Self::chats_json(&state.chats, self.chat_cap) {
            Ok(json) => json,
            Err(err) => return SaveOutcome::Failed(err),
        };
        match self.storage.set(keys::CHATS, &chats) {
            Ok(()) => {
                debug!(chats = state.chats.len().min(self.chat_cap), "State saved");
                SaveOutcome::Saved
            }
            Err(err) if err.is_quota_exceeded() => self.recover(state, &[]),
            Err(err) => {
                warn!(key = keys::CHATS, error = %err, "Saving state failed");
                SaveOutcome::Failed(err)
            }
        }
    }

    fn head_entries(&self, state: &AppState) -> Result<Vec<(&'static str, String)>, StorageError> {
        Ok(vec![
            (keys::CONFIG, to_json(keys::CONFIG, &state.config)?),
            (keys::PROVIDERS, self.providers_json(&state.providers)?),
            (keys::PROFILES, to_json(keys::PROFILES, &state.profiles)?),
            (keys::FOLDERS, to_json(keys::FOLDERS, &state.folders)?),
            (
                keys::CURRENT_CHAT_ID,
                to_json(keys::CURRENT_CHAT_ID, &state.current_chat_id)?,
            ),
        ])
    }

    fn recover(&mut self, state: &AppState, pending: &[(&'static str, String)]) -> SaveOutcome {
        let retained = (state.chats.len().min(self.chat_cap) / 2).max(1);
        self.chat_cap = retained;
        warn!(retained, "Storage full; keeping only the newest chats");

        let attempt = Self::chats_json(&state.chats, retained).and_then(|chats| {
            self.storage.set(keys::CHATS, &chats)?;
            for (key, value) in pending {
                self.storage.set(key, value)?;
            }
            Ok(())
        });

        match attempt {
            Ok(()) => {
                info!(retained, "State saved after trimming chats");
                SaveOutcome::Recovered { retained }
            }
            Err(err) => {
                warn!(error = %err, "Saving state failed after trimming chats");
                SaveOutcome::Failed(err)
            }
        }
    }

    fn load_key<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        let raw = match self.storage.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return T::default(),
            Err(err) => {
                warn!(key, error = %err, "Could not read stored value; using default");
                return T::default();
            }
        };
        serde_json::from_str(&raw).unwrap_or_else(|err| {
            warn!(key, error = %err, "Stored value is malformed; using default");
            T::default()
        })
    }

    /// Read every key independently. A missing or damaged key falls back to
    /// its default without affecting the others.
    pub fn load_all(&self) -> AppState {
        let mut providers: Vec<Provider> = self.load_key(keys::PROVIDERS);
        for provider in &mut providers {
            provider.api_key = self.vault.decrypt(&provider.api_key);
        }

        let current_chat_id = match self.storage.get(keys::CURRENT_CHAT_ID) {
            Ok(Some(raw)) => serde_json::from_str::<Option<String>>(&raw)
                .unwrap_or_else(|_| Some(raw.trim().to_string()).filter(|id| !id.is_empty())),
            _ => None,
        };

        let mut state = AppState {
            config: self.load_key::<Config>(keys::CONFIG),
            providers,
            profiles: self.load_key::<Vec<Profile>>(keys::PROFILES),
            folders: self.load_key::<Vec<Folder>>(keys::FOLDERS),
            chats: self.load_key::<Vec<Chat>>(keys::CHATS),
            current_chat_id,
        };
        state.repair_current_chat();
        debug!(
            providers = state.providers.len(),
            chats = state.chats.len(),
            "State loaded"
        );
        state
    }

    /// Erase all stored data, including the vault material, and start over
    /// with a fresh vault.
    pub fn reset(&mut self) -> Result<(), VaultError> {
        self.storage.clear()?;
        self.vault = Vault::open_with_iterations(self.storage.as_mut(), self.iterations)?;
        self.chat_cap = DEFAULT_CHAT_CAP;
        info!("All stored data erased");
        Ok(())
    }
}
