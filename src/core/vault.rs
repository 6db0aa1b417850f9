//! Encryption at rest for provider credentials.
//!
//! The symmetric key is derived with PBKDF2-HMAC-SHA256 from a per-install
//! random seed (plus an optional session passphrase) and a per-install salt.
//! Neither seed nor salt is secret; they are stored next to the data. Blobs
//! are `base64(nonce || ciphertext || tag)` under AES-256-GCM with a fresh
//! 96-bit nonce per call.

use std::error::Error as StdError;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use sha2::Sha256;
use tracing::{debug, warn};

use crate::core::persistence::{keys, Storage, StorageError};

pub const KDF_ITERATIONS: u32 = 600_000;
pub const NONCE_LEN: usize = 12;
pub const KEY_LEN: usize = 32;
const SEED_LEN: usize = 32;
const SALT_LEN: usize = 16;
const PASSPHRASE_SEPARATOR: char = '|';
/// Input used when the derivation passphrase would otherwise be empty.
const DEFAULT_PASSPHRASE: &str = "kic-default-v2";

#[derive(Debug)]
pub enum VaultError {
    Random(getrandom::Error),
    Encrypt,
    Storage(StorageError),
    CorruptSalt,
}

impl fmt::Display for VaultError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VaultError::Random(err) => write!(f, "System randomness unavailable: {err}"),
            VaultError::Encrypt => write!(f, "Encryption failed"),
            VaultError::Storage(err) => write!(f, "Vault storage error: {err}"),
            VaultError::CorruptSalt => write!(f, "Stored vault salt is not valid base64"),
        }
    }
}

impl StdError for VaultError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            VaultError::Storage(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StorageError> for VaultError {
    fn from(err: StorageError) -> Self {
        VaultError::Storage(err)
    }
}

pub(crate) fn random_bytes<const N: usize>() -> Result<[u8; N], VaultError> {
    let mut buf = [0u8; N];
    getrandom::fill(&mut buf).map_err(VaultError::Random)?;
    Ok(buf)
}

/// PBKDF2-HMAC-SHA256 producing a 256-bit key.
pub fn derive_key(passphrase: &str, salt: &[u8], iterations: u32) -> [u8; KEY_LEN] {
    let input = if passphrase.is_empty() {
        DEFAULT_PASSPHRASE
    } else {
        passphrase
    };
    let mut key = [0u8; KEY_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(input.as_bytes(), salt, iterations, &mut key);
    key
}

pub(crate) fn cipher_for(key: &[u8; KEY_LEN]) -> Aes256Gcm {
    Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key))
}

fn load_or_create(storage: &mut dyn Storage, key: &str, len: usize) -> Result<String, VaultError> {
    if let Some(existing) = storage.get(key)? {
        if !existing.is_empty() {
            return Ok(existing);
        }
    }
    let mut buf = vec![0u8; len];
    getrandom::fill(&mut buf).map_err(VaultError::Random)?;
    let encoded = BASE64.encode(&buf);
    storage.set(key, &encoded)?;
    debug!(key, "Generated vault material");
    Ok(encoded)
}

pub struct Vault {
    seed: String,
    salt: Vec<u8>,
    session_passphrase: Option<String>,
    iterations: u32,
    cached: Mutex<Option<Arc<Aes256Gcm>>>,
}

impl fmt::Debug for Vault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vault")
            .field("iterations", &self.iterations)
            .field("has_session_passphrase", &self.session_passphrase.is_some())
            .finish_non_exhaustive()
    }
}

impl Vault {
    /// Load the install seed and salt, generating them on first use.
    pub fn open(storage: &mut dyn Storage) -> Result<Self, VaultError> {
        Self::open_with_iterations(storage, KDF_ITERATIONS)
    }

    /// Like [`Vault::open`] with a custom work factor. Only tests should go
    /// below [`KDF_ITERATIONS`].
    pub fn open_with_iterations(
        storage: &mut dyn Storage,
        iterations: u32,
    ) -> Result<Self, VaultError> {
        let seed = load_or_create(storage, keys::SEED, SEED_LEN)?;
        let salt_b64 = load_or_create(storage, keys::SEED_SALT, SALT_LEN)?;
        let salt = BASE64
            .decode(salt_b64.as_bytes())
            .map_err(|_| VaultError::CorruptSalt)?;
        Ok(Self::with_iterations(seed, salt, iterations))
    }

    pub fn with_iterations(seed: impl Into<String>, salt: Vec<u8>, iterations: u32) -> Self {
        Self {
            seed: seed.into(),
            salt,
            session_passphrase: None,
            iterations,
            cached: Mutex::new(None),
        }
    }

    /// Mix a session passphrase into the key. The cached key is dropped and
    /// re-derived on the next call.
    pub fn set_session_passphrase(&mut self, passphrase: Option<&str>) {
        self.session_passphrase = passphrase.filter(|p| !p.is_empty()).map(str::to_string);
        *self.lock_cache() = None;
    }

    fn lock_cache(&self) -> MutexGuard<'_, Option<Arc<Aes256Gcm>>> {
        self.cached
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn derivation_input(&self) -> String {
        format!(
            "{}{}{}",
            self.seed,
            PASSPHRASE_SEPARATOR,
            self.session_passphrase.as_deref().unwrap_or("")
        )
    }

    /// The lock is held across derivation so concurrent callers wait for a
    /// single derivation instead of racing to fill the cache.
    fn cipher(&self) -> Arc<Aes256Gcm> {
        let mut cached = self.lock_cache();
        if let Some(cipher) = cached.as_ref() {
            return Arc::clone(cipher);
        }
        debug!(iterations = self.iterations, "Deriving vault key");
        let key = derive_key(&self.derivation_input(), &self.salt, self.iterations);
        let cipher = Arc::new(cipher_for(&key));
        *cached = Some(Arc::clone(&cipher));
        cipher
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, VaultError> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }
        let nonce = random_bytes::<NONCE_LEN>()?;
        let ciphertext = self
            .cipher()
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|_| VaultError::Encrypt)?;

        let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        combined.extend_from_slice(&nonce);
        combined.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(combined))
    }

    /// Decrypt a blob produced by [`Vault::encrypt`]. Any failure yields an
    /// empty string so one damaged credential cannot block loading.
    pub fn decrypt(&self, blob: &str) -> String {
        if blob.is_empty() {
            return String::new();
        }
        match self.try_decrypt(blob) {
            Ok(plaintext) => plaintext,
            Err(reason) => {
                warn!(reason, blob_len = blob.len(), "Discarding undecryptable value");
                String::new()
            }
        }
    }

    fn try_decrypt(&self, blob: &str) -> Result<String, &'static str> {
        let data = BASE64
            .decode(blob.trim().as_bytes())
            .map_err(|_| "invalid base64")?;
        if data.len() <= NONCE_LEN {
            return Err("blob shorter than nonce");
        }
        let (nonce, ciphertext) = data.split_at(NONCE_LEN);
        let plaintext = self
            .cipher()
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| "authentication failed")?;
        String::from_utf8(plaintext).map_err(|_| "plaintext is not UTF-8")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::persistence::MemoryStorage;

    const TEST_ITERATIONS: u32 = 1_000;

    fn test_vault() -> Vault {
        let mut storage = MemoryStorage::new();
        Vault::open_with_iterations(&mut storage, TEST_ITERATIONS).expect("open vault")
    }

    #[test]
    fn round_trips_non_empty_strings() {
        let vault = test_vault();
        for plaintext in ["sk-test-123", "ünïcødé 🔑", "a"] {
            let blob = vault.encrypt(plaintext).expect("encrypt");
            assert_ne!(blob, plaintext);
            assert_eq!(vault.decrypt(&blob), plaintext);
        }
    }

    #[test]
    fn empty_string_maps_to_empty_string() {
        let vault = test_vault();
        assert_eq!(vault.encrypt("").expect("encrypt"), "");
        assert_eq!(vault.decrypt(""), "");
    }

    #[test]
    fn each_encryption_uses_a_fresh_nonce() {
        let vault = test_vault();
        let a = vault.encrypt("same").expect("encrypt");
        let b = vault.encrypt("same").expect("encrypt");
        assert_ne!(a, b);
    }

    #[test]
    fn tampered_or_garbage_blobs_decrypt_to_empty() {
        let vault = test_vault();
        let blob = vault.encrypt("secret").expect("encrypt");
        let mut bytes = BASE64.decode(&blob).expect("b64");
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        assert_eq!(vault.decrypt(&BASE64.encode(&bytes)), "");
        assert_eq!(vault.decrypt("not base64 !!"), "");
        assert_eq!(vault.decrypt(&BASE64.encode([0u8; 8])), "");
    }

    #[test]
    fn seed_and_salt_persist_across_opens() {
        let mut storage = MemoryStorage::new();
        let first = Vault::open_with_iterations(&mut storage, TEST_ITERATIONS).expect("open");
        let blob = first.encrypt("persisted").expect("encrypt");

        let seed = storage.get(keys::SEED).unwrap().expect("seed stored");
        assert_eq!(BASE64.decode(seed).expect("b64").len(), SEED_LEN);

        let second = Vault::open_with_iterations(&mut storage, TEST_ITERATIONS).expect("reopen");
        assert_eq!(second.decrypt(&blob), "persisted");
    }

    #[test]
    fn different_install_cannot_decrypt() {
        let blob = test_vault().encrypt("secret").expect("encrypt");
        assert_eq!(test_vault().decrypt(&blob), "");
    }

    #[test]
    fn session_passphrase_change_rederives_key() {
        let mut vault = Vault::with_iterations("seed", vec![7u8; SALT_LEN], TEST_ITERATIONS);
        let plain_blob = vault.encrypt("value").expect("encrypt");

        vault.set_session_passphrase(Some("hunter2"));
        assert_eq!(vault.decrypt(&plain_blob), "");
        let locked_blob = vault.encrypt("value").expect("encrypt");
        assert_eq!(vault.decrypt(&locked_blob), "value");

        vault.set_session_passphrase(None);
        assert_eq!(vault.decrypt(&plain_blob), "value");
    }

    #[test]
    fn concurrent_first_use_shares_one_key() {
        let vault = Arc::new(Vault::with_iterations("seed", vec![3u8; SALT_LEN], TEST_ITERATIONS));
        let threads = 4;
        let barrier = Arc::new(std::sync::Barrier::new(threads));

        let handles: Vec<_> = (0..threads)
            .map(|i| {
                let vault = Arc::clone(&vault);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    let blob = vault.encrypt(&format!("secret-{i}")).expect("encrypt");
                    (i, blob)
                })
            })
            .collect();
        let blobs: Vec<(usize, String)> = handles
            .into_iter()
            .map(|handle| handle.join().expect("thread panicked"))
            .collect();

        let checkers: Vec<_> = (0..threads)
            .map(|_| {
                let vault = Arc::clone(&vault);
                let blobs = blobs.clone();
                std::thread::spawn(move || {
                    for (i, blob) in &blobs {
                        assert_eq!(vault.decrypt(blob), format!("secret-{i}"));
                    }
                })
            })
            .collect();
        for checker in checkers {
            checker.join().expect("decrypt thread panicked");
        }

        let fresh = Vault::with_iterations("seed", vec![3u8; SALT_LEN], TEST_ITERATIONS);
        for (i, blob) in &blobs {
            assert_eq!(fresh.decrypt(blob), format!("secret-{i}"));
        }
    }

    #[test]
    fn derive_key_depends_on_salt_and_passphrase() {
        let base = derive_key("pw", b"salt-aaaaaaaaaaa", TEST_ITERATIONS);
        assert_eq!(base, derive_key("pw", b"salt-aaaaaaaaaaa", TEST_ITERATIONS));
        assert_ne!(base, derive_key("pw", b"salt-bbbbbbbbbbb", TEST_ITERATIONS));
        assert_ne!(base, derive_key("pw2", b"salt-aaaaaaaaaaa", TEST_ITERATIONS));
    }
}
