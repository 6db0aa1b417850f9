use super::App;
use crate::core::session_gate::{now_millis, GateError, GateState};

impl App {
    /// Current gate state, locking first if the session has expired.
    pub fn gate_state(&mut self) -> GateState {
        self.gate.refresh(now_millis())
    }

    pub fn needs_new_password(&self) -> bool {
        self.gate.needs_new_password()
    }

    pub fn ensure_unlocked(&mut self) -> Result<(), GateError> {
        self.gate.ensure_unlocked(now_millis())
    }

    pub fn setup_password(&mut self, password: &str) -> Result<(), GateError> {
        self.gate
            .setup(self.store.storage_mut(), password, now_millis())
    }

    pub fn login(&mut self, password: &str) -> Result<(), GateError> {
        self.gate
            .login(self.store.storage_mut(), password, now_millis())
    }

    pub fn change_password(&mut self, current: Option<&str>, new_password: &str) -> Result<(), GateError> {
        self.gate.change_password(
            self.store.storage_mut(),
            current,
            new_password,
            now_millis(),
        )
    }

    /// Lock the session. A running stream is stopped first.
    pub fn logout(&mut self) -> Result<(), GateError> {
        self.cancel_stream();
        self.gate.logout(self.store.storage_mut())
    }

    /// Session length for future unlocks, in minutes. Zero disables expiry.
    pub fn set_session_duration(&mut self, minutes: u32) {
        self.state.config.session_duration_minutes = minutes;
        self.gate.set_session_minutes(minutes);
        self.persist();
    }
}
