use crate::core::config::data::Config;
use crate::core::model_catalog::{default_max_output, max_output, MIN_MODEL_MAX_OVERRIDE};

/// Outcome of setting a per-model output ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelMaxUpdate {
    /// Stored as an override.
    Set(u32),
    /// Equal to the built-in default, so any override was removed.
    Default(u32),
    /// Rejected; the built-in default applies.
    Rejected(u32),
}

impl Config {
    pub fn model_max_output(&self, model_id: &str) -> u32 {
        max_output(model_id, &self.user_model_max_overrides)
    }

    pub fn set_model_max(&mut self, model_id: &str, value: u32) -> ModelMaxUpdate {
        let default_max = default_max_output(model_id);
        if value < MIN_MODEL_MAX_OVERRIDE {
            return ModelMaxUpdate::Rejected(default_max);
        }
        if value == default_max {
            self.user_model_max_overrides.remove(model_id);
            return ModelMaxUpdate::Default(default_max);
        }
        self.user_model_max_overrides
            .insert(model_id.to_string(), value);
        ModelMaxUpdate::Set(value)
    }

    pub fn reset_model_max(&mut self, model_id: &str) -> u32 {
        self.user_model_max_overrides.remove(model_id);
        default_max_output(model_id)
    }

    pub fn reset_all_model_max(&mut self) {
        self.user_model_max_overrides.clear();
    }
}
