use tracing::{debug, info};

use super::App;
use crate::core::chat::{Folder, Profile};
use crate::core::config::{Config, ModelMaxUpdate};
use crate::core::providers::{split_model_id, Provider, ProviderResolutionError};

impl App {
    pub fn new_folder(&mut self, name: &str) -> String {
        let folder = Folder::new(name.trim());
        let id = folder.id.clone();
        self.state.folders.push(folder);
        self.persist();
        id
    }

    /// Blank names keep the old one.
    pub fn rename_folder(&mut self, folder_id: &str, name: &str) -> bool {
        let name = name.trim();
        let Some(folder) = self.state.folders.iter_mut().find(|f| f.id == folder_id) else {
            return false;
        };
        if !name.is_empty() {
            folder.name = name.to_string();
        }
        self.persist();
        true
    }

    pub fn toggle_folder(&mut self, folder_id: &str) -> Option<bool> {
        let folder = self.state.folders.iter_mut().find(|f| f.id == folder_id)?;
        folder.collapsed = !folder.collapsed;
        let collapsed = folder.collapsed;
        self.persist();
        Some(collapsed)
    }

    /// Delete a folder; its chats become unfiled.
    pub fn delete_folder(&mut self, folder_id: &str) -> bool {
        let before = self.state.folders.len();
        self.state.folders.retain(|folder| folder.id != folder_id);
        if self.state.folders.len() == before {
            return false;
        }
        for chat in &mut self.state.chats {
            if chat.folder_id.as_deref() == Some(folder_id) {
                chat.folder_id = None;
            }
        }
        self.persist();
        true
    }

    pub fn create_profile(&mut self, profile: Profile) -> String {
        let id = profile.id.clone();
        self.state.profiles.push(profile);
        self.persist();
        id
    }

    /// Replace the stored profile with the same id. Updating the active
    /// profile re-applies it.
    pub fn update_profile(&mut self, profile: Profile) -> bool {
        let Some(slot) = self.state.profiles.iter_mut().find(|p| p.id == profile.id) else {
            return false;
        };
        *slot = profile;
        let id = slot.id.clone();
        if self.state.config.active_profile_id.as_deref() == Some(id.as_str()) {
            self.apply_profile(&id);
        } else {
            self.persist();
        }
        true
    }

    /// Make a profile active, copying its prompt, temperature and model
    /// into the config. An empty profile model keeps the global model.
    pub fn apply_profile(&mut self, profile_id: &str) -> bool {
        let Some(profile) = self.state.profile(profile_id).cloned() else {
            return false;
        };
        let config = &mut self.state.config;
        config.active_profile_id = Some(profile.id);
        config.system_prompt = profile.system_prompt;
        config.temperature = profile.temperature;
        if !profile.model.is_empty() {
            config.model = profile.model;
        }
        info!(profile = %profile.name, "Profile applied");
        self.persist();
        true
    }

    /// Deleting the active profile applies the first remaining one, or
    /// restores the default prompt and temperature when none is left.
    pub fn delete_profile(&mut self, profile_id: &str) -> bool {
        let before = self.state.profiles.len();
        self.state.profiles.retain(|profile| profile.id != profile_id);
        if self.state.profiles.len() == before {
            return false;
        }
        if self.state.config.active_profile_id.as_deref() == Some(profile_id) {
            match self.state.profiles.first().map(|profile| profile.id.clone()) {
                Some(next) => {
                    self.apply_profile(&next);
                    return true;
                }
                None => {
                    let defaults = Config::default();
                    let config = &mut self.state.config;
                    config.active_profile_id = None;
                    config.system_prompt = defaults.system_prompt;
                    config.temperature = defaults.temperature;
                }
            }
        }
        self.persist();
        true
    }

    pub fn add_provider(&mut self, provider: Provider) -> Result<String, ProviderResolutionError> {
        provider.validate()?;
        let id = provider.id.clone();
        debug!(provider = ?provider, "Provider added");
        self.state.providers.push(provider);
        self.persist();
        Ok(id)
    }

    pub fn update_provider(&mut self, provider: Provider) -> Result<(), ProviderResolutionError> {
        provider.validate()?;
        let slot = self
            .state
            .providers
            .iter_mut()
            .find(|p| p.id == provider.id)
            .ok_or_else(|| ProviderResolutionError::invalid_provider("Unknown provider"))?;
        *slot = provider;
        self.persist();
        Ok(())
    }

    /// Remove a provider. A selected model served by it is cleared.
    pub fn delete_provider(&mut self, provider_id: &str) -> bool {
        let before = self.state.providers.len();
        self.state.providers.retain(|provider| provider.id != provider_id);
        if self.state.providers.len() == before {
            return false;
        }
        if split_model_id(&self.state.config.model).0 == Some(provider_id) {
            self.state.config.model.clear();
        }
        self.persist();
        true
    }

    pub fn set_model(&mut self, full_model_id: &str) {
        self.state.config.model = full_model_id.to_string();
        self.persist();
    }

    pub fn set_thinking(&mut self, enabled: bool, intensity: Option<u8>) {
        let config = &mut self.state.config;
        config.thinking_enabled = enabled;
        if let Some(level) = intensity {
            config.thinking_intensity = level.clamp(1, 3);
        }
        self.persist();
    }

    pub fn set_model_max(&mut self, model_id: &str, value: u32) -> ModelMaxUpdate {
        let update = self.state.config.set_model_max(model_id, value);
        self.persist();
        update
    }
}
