//! The application object: owns every entity, the persistence store, the
//! session gate and at most one active generation stream.

use std::error::Error as StdError;
use std::fmt;

use tracing::{info, warn};

use crate::core::config::Settings;
use crate::core::persistence::{FileStorage, PersistenceStore, SaveOutcome};
use crate::core::providers::ProviderResolutionError;
use crate::core::session_gate::{now_millis, GateError, SessionGate};
use crate::core::state::AppState;
use crate::utils::url::{RequestRouter, UrlPolicyError};

pub mod conversation;
pub mod library;
pub mod session;
pub mod streaming;


use streaming::ActiveStream;

/// Why a generation could not be started.
#[derive(Debug)]
pub enum SendError {
    /// A stream is already running; sends are rejected, not queued.
    StreamInProgress,
    Locked,
    EmptyMessage,
    NothingToRegenerate,
    Resolution(ProviderResolutionError),
    Policy(UrlPolicyError),
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::StreamInProgress => write!(f, "A response is still being generated"),
            SendError::Locked => write!(f, "Session is locked; log in first"),
            SendError::EmptyMessage => write!(f, "Message is empty"),
            SendError::NothingToRegenerate => write!(f, "There is no response to regenerate"),
            SendError::Resolution(err) => write!(f, "{err}"),
            SendError::Policy(err) => write!(f, "{err}"),
        }
    }
}

impl StdError for SendError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            SendError::Resolution(err) => Some(err),
            SendError::Policy(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ProviderResolutionError> for SendError {
    fn from(err: ProviderResolutionError) -> Self {
        SendError::Resolution(err)
    }
}

impl From<UrlPolicyError> for SendError {
    fn from(err: UrlPolicyError) -> Self {
        SendError::Policy(err)
    }
}

pub struct App {
    state: AppState,
    store: PersistenceStore,
    gate: SessionGate,
    router: RequestRouter,
    client: reqwest::Client,
    stream: Option<ActiveStream>,
    next_stream_id: u64,
    last_save: Option<SaveOutcome>,
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App")
            .field("gate", &self.gate.state())
            .field("router", &self.router)
            .field("streaming", &self.stream.is_some())
            .finish_non_exhaustive()
    }
}

impl App {
    /// Load state and gate status from `store`.
    pub fn new(store: PersistenceStore, router: RequestRouter) -> Result<Self, GateError> {
        let state = store.load_all();
        let mut gate =
            SessionGate::load_with_iterations(store.storage(), now_millis(), store.iterations())?;
        gate.set_session_minutes(state.config.session_duration_minutes);
        Ok(Self {
            state,
            store,
            gate,
            router,
            client: reqwest::Client::new(),
            stream: None,
            next_stream_id: 0,
            last_save: None,
        })
    }

    /// Open the on-disk store described by `settings`.
    pub fn open(settings: &Settings) -> Result<Self, Box<dyn StdError>> {
        let data_dir = settings.resolve_data_dir()?;
        let storage = FileStorage::with_quota(&data_dir, settings.storage_quota());
        let store = PersistenceStore::open(Box::new(storage))?;
        let router = RequestRouter::for_environment(
            settings.served_from.as_deref(),
            settings.proxy_base(),
        );
        info!(data_dir = %data_dir.display(), proxy = router.uses_proxy(), "Opening store");
        Ok(Self::new(store, router)?)
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn store(&self) -> &PersistenceStore {
        &self.store
    }

    pub fn router(&self) -> &RequestRouter {
        &self.router
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Flush the state and remember the outcome for the caller to report.
    pub fn persist(&mut self) {
        let outcome = self.store.save_all(&self.state);
        if outcome.is_failed() {
            warn!(outcome = ?outcome, "State not saved");
        }
        self.last_save = Some(outcome);
    }

    /// Outcome of the most recent save, if not yet taken.
    pub fn take_save_outcome(&mut self) -> Option<SaveOutcome> {
        self.last_save.take()
    }

    /// Erase all data, in storage and in memory.
    pub fn reset_all(&mut self) -> Result<(), Box<dyn StdError>> {
        self.cancel_stream();
        self.store.reset()?;
        self.state = AppState::default();
        self.gate.reset();
        self.last_save = None;
        info!("All data reset");
        Ok(())
    }
}
