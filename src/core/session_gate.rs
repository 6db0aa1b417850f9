//! Password gate in front of the local data.
//!
//! The stored verifier is an AES-GCM encryption of a fixed plaintext under a
//! PBKDF2 key derived from the password and a fresh random salt. The nonce is
//! fixed (all zeros): each setup draws a new salt, so every key encrypts
//! exactly one message and nonce reuse under one key cannot happen. The
//! ciphertext is a commitment to the password, not confidential data.

use std::error::Error as StdError;
use std::fmt;

use aes_gcm::aead::Aead;
use aes_gcm::Nonce;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};

use crate::core::persistence::{keys, Storage, StorageError};
use crate::core::vault::{cipher_for, derive_key, random_bytes, VaultError, KDF_ITERATIONS, NONCE_LEN};

pub const FORMAT_VERSION: u32 = 2;
pub const SETUP_MIN_LEN: usize = 8;
pub const CHANGE_MIN_LEN: usize = 4;
pub const DEFAULT_SESSION_MINUTES: u32 = 12 * 60;

const LOGIN_NAMESPACE: &str = "|kic-login-v2";
const VERIFY_PLAINTEXT: &[u8] = b"kic-login-verify-v2";
const SALT_LEN: usize = 16;

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    NoPasswordSet,
    Locked,
    /// `None` means the session never expires.
    Unlocked { expires_at: Option<i64> },
}

impl GateState {
    pub fn is_unlocked(self) -> bool {
        matches!(self, GateState::Unlocked { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRecord {
    pub salt: String,
    pub hash: String,
    pub v: u32,
}

#[derive(Debug)]
pub enum GateError {
    PasswordTooShort { min: usize },
    PasswordAlreadySet,
    NoPasswordSet,
    CurrentPasswordRequired,
    WrongPassword,
    Locked,
    Storage(StorageError),
    Vault(VaultError),
}

impl fmt::Display for GateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateError::PasswordTooShort { min } => {
                write!(f, "Password must be at least {min} characters")
            }
            GateError::PasswordAlreadySet => {
                write!(f, "A password is already set; change it instead")
            }
            GateError::NoPasswordSet => write!(f, "No password has been set up yet"),
            GateError::CurrentPasswordRequired => write!(f, "The current password is required"),
            GateError::WrongPassword => write!(f, "Wrong password"),
            GateError::Locked => write!(f, "Session is locked; log in first"),
            GateError::Storage(err) => write!(f, "{err}"),
            GateError::Vault(err) => write!(f, "{err}"),
        }
    }
}

impl StdError for GateError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            GateError::Storage(err) => Some(err),
            GateError::Vault(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StorageError> for GateError {
    fn from(err: StorageError) -> Self {
        GateError::Storage(err)
    }
}

impl From<VaultError> for GateError {
    fn from(err: VaultError) -> Self {
        GateError::Vault(err)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum StoredRecord {
    Missing,
    Current(LoginRecord),
    /// Present but in a format this build cannot verify.
    Unrecognized,
}

fn read_record(storage: &dyn Storage) -> Result<StoredRecord, StorageError> {
    let Some(raw) = storage.get(keys::LOGIN_HASH)? else {
        return Ok(StoredRecord::Missing);
    };
    match serde_json::from_str::<LoginRecord>(&raw) {
        Ok(record) if record.v == FORMAT_VERSION => Ok(StoredRecord::Current(record)),
        Ok(record) => {
            warn!(version = record.v, "Login record has an unsupported version");
            Ok(StoredRecord::Unrecognized)
        }
        Err(err) => {
            warn!(error = %err, "Login record is unreadable");
            Ok(StoredRecord::Unrecognized)
        }
    }
}

fn compute_verifier(password: &str, salt: &[u8], iterations: u32) -> Result<Vec<u8>, GateError> {
    let key = derive_key(&format!("{password}{LOGIN_NAMESPACE}"), salt, iterations);
    let nonce = [0u8; NONCE_LEN];
    cipher_for(&key)
        .encrypt(Nonce::from_slice(&nonce), VERIFY_PLAINTEXT)
        .map_err(|_| GateError::Vault(VaultError::Encrypt))
}

/// Build a fresh verifier record for `password`.
pub fn create_record(password: &str, iterations: u32) -> Result<LoginRecord, GateError> {
    let salt = random_bytes::<SALT_LEN>()?;
    let hash = compute_verifier(password, &salt, iterations)?;
    Ok(LoginRecord {
        salt: BASE64.encode(salt),
        hash: BASE64.encode(hash),
        v: FORMAT_VERSION,
    })
}

/// Check `password` against a stored record. Unknown versions and malformed
/// fields never match.
pub fn verify_record(record: &LoginRecord, password: &str, iterations: u32) -> bool {
    if record.v != FORMAT_VERSION {
        return false;
    }
    let (Ok(salt), Ok(expected)) = (BASE64.decode(&record.salt), BASE64.decode(&record.hash))
    else {
        return false;
    };
    match compute_verifier(password, &salt, iterations) {
        Ok(candidate) => candidate.ct_eq(&expected).into(),
        Err(_) => false,
    }
}

#[derive(Debug, Clone)]
pub struct SessionGate {
    state: GateState,
    iterations: u32,
    session_minutes: u32,
    needs_new_password: bool,
}

impl SessionGate {
    /// Decide the startup state from storage: no record means setup mode,
    /// a future expiry means the previous session is still open.
    pub fn load(storage: &dyn Storage, now: i64) -> Result<Self, GateError> {
        Self::load_with_iterations(storage, now, KDF_ITERATIONS)
    }

    pub fn load_with_iterations(
        storage: &dyn Storage,
        now: i64,
        iterations: u32,
    ) -> Result<Self, GateError> {
        let record = read_record(storage)?;
        let expiry = storage
            .get(keys::SESSION_EXPIRY)?
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .filter(|expiry| *expiry > 0);

        let state = match (&record, expiry) {
            (StoredRecord::Missing, _) => GateState::NoPasswordSet,
            (StoredRecord::Current(_), Some(expiry)) if now < expiry => GateState::Unlocked {
                expires_at: Some(expiry),
            },
            _ => GateState::Locked,
        };
        debug!(state = ?state, "Session gate loaded");

        Ok(Self {
            state,
            iterations,
            session_minutes: DEFAULT_SESSION_MINUTES,
            needs_new_password: record == StoredRecord::Unrecognized,
        })
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    /// True when a login record exists that can never be unlocked.
    pub fn needs_new_password(&self) -> bool {
        self.needs_new_password
    }

    pub fn session_minutes(&self) -> u32 {
        self.session_minutes
    }

    /// Session length applied on the next unlock. Zero disables expiry.
    pub fn set_session_minutes(&mut self, minutes: u32) {
        self.session_minutes = minutes;
    }

    fn open_session(&mut self, storage: &mut dyn Storage, now: i64) -> Result<(), GateError> {
        let expires_at = if self.session_minutes == 0 {
            storage.remove(keys::SESSION_EXPIRY)?;
            None
        } else {
            let expiry = now + i64::from(self.session_minutes) * 60 * 1000;
            storage.set(keys::SESSION_EXPIRY, &expiry.to_string())?;
            Some(expiry)
        };
        self.state = GateState::Unlocked { expires_at };
        Ok(())
    }

    fn store_password(&mut self, storage: &mut dyn Storage, password: &str) -> Result<(), GateError> {
        let record = create_record(password, self.iterations)?;
        let serialized = serde_json::to_string(&record).map_err(|source| {
            GateError::Storage(StorageError::Serialize {
                key: keys::LOGIN_HASH.to_string(),
                source,
            })
        })?;
        storage.set(keys::LOGIN_HASH, &serialized)?;
        self.needs_new_password = false;
        Ok(())
    }

    /// First-time password setup. Also allowed when the stored record is in
    /// an unrecognized format.
    pub fn setup(
        &mut self,
        storage: &mut dyn Storage,
        password: &str,
        now: i64,
    ) -> Result<(), GateError> {
        if matches!(read_record(storage)?, StoredRecord::Current(_)) {
            return Err(GateError::PasswordAlreadySet);
        }
        if password.chars().count() < SETUP_MIN_LEN {
            return Err(GateError::PasswordTooShort { min: SETUP_MIN_LEN });
        }
        self.store_password(storage, password)?;
        self.open_session(storage, now)?;
        info!("Password set up");
        Ok(())
    }

    pub fn verify(&self, storage: &dyn Storage, password: &str) -> Result<bool, GateError> {
        Ok(match read_record(storage)? {
            StoredRecord::Current(record) => verify_record(&record, password, self.iterations),
            StoredRecord::Missing | StoredRecord::Unrecognized => false,
        })
    }

    /// One verification call; on failure the state is left as it was.
    pub fn login(
        &mut self,
        storage: &mut dyn Storage,
        password: &str,
        now: i64,
    ) -> Result<(), GateError> {
        if self.state == GateState::NoPasswordSet {
            return Err(GateError::NoPasswordSet);
        }
        if !self.verify(storage, password)? {
            debug!("Login rejected");
            return Err(GateError::WrongPassword);
        }
        self.open_session(storage, now)
    }

    /// Replace the password. When one is already set the current password
    /// must be supplied and correct.
    pub fn change_password(
        &mut self,
        storage: &mut dyn Storage,
        current: Option<&str>,
        new_password: &str,
        now: i64,
    ) -> Result<(), GateError> {
        if let StoredRecord::Current(record) = read_record(storage)? {
            let current = current
                .filter(|pw| !pw.is_empty())
                .ok_or(GateError::CurrentPasswordRequired)?;
            if !verify_record(&record, current, self.iterations) {
                return Err(GateError::WrongPassword);
            }
        }
        if new_password.chars().count() < CHANGE_MIN_LEN {
            return Err(GateError::PasswordTooShort {
                min: CHANGE_MIN_LEN,
            });
        }
        self.store_password(storage, new_password)?;
        self.open_session(storage, now)?;
        info!("Password changed");
        Ok(())
    }

    pub fn logout(&mut self, storage: &mut dyn Storage) -> Result<(), GateError> {
        storage.remove(keys::SESSION_EXPIRY)?;
        if self.state != GateState::NoPasswordSet {
            self.state = GateState::Locked;
        }
        Ok(())
    }

    /// Lock if the session expiry has passed. Called from the periodic timer
    /// and before every gated action.
    pub fn refresh(&mut self, now: i64) -> GateState {
        if let GateState::Unlocked {
            expires_at: Some(expiry),
        } = self.state
        {
            if now >= expiry {
                info!("Session expired");
                self.state = GateState::Locked;
            }
        }
        self.state
    }

    /// Gate an action. Installs without a password are not gated.
    pub fn ensure_unlocked(&mut self, now: i64) -> Result<(), GateError> {
        match self.refresh(now) {
            GateState::Unlocked { .. } | GateState::NoPasswordSet => Ok(()),
            GateState::Locked => Err(GateError::Locked),
        }
    }

    /// Forget everything after a full data reset.
    pub fn reset(&mut self) {
        self.state = GateState::NoPasswordSet;
        self.needs_new_password = false;
    }
}
