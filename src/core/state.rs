//! The in-memory entity set owned by [`crate::core::app::App`].

use crate::core::chat::{Chat, Folder, Profile};
use crate::core::config::Config;
use crate::core::providers::Provider;

/// Every persisted entity. Chats are kept newest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppState {
    pub config: Config,
    pub providers: Vec<Provider>,
    pub profiles: Vec<Profile>,
    pub folders: Vec<Folder>,
    pub chats: Vec<Chat>,
    pub current_chat_id: Option<String>,
}

impl AppState {
    pub fn chat(&self, id: &str) -> Option<&Chat> {
        self.chats.iter().find(|chat| chat.id == id)
    }

    pub fn chat_mut(&mut self, id: &str) -> Option<&mut Chat> {
        self.chats.iter_mut().find(|chat| chat.id == id)
    }

    pub fn current_chat(&self) -> Option<&Chat> {
        self.current_chat_id.as_deref().and_then(|id| self.chat(id))
    }

    pub fn current_chat_mut(&mut self) -> Option<&mut Chat> {
        let id = self.current_chat_id.clone()?;
        self.chat_mut(&id)
    }

    pub fn provider(&self, id: &str) -> Option<&Provider> {
        self.providers.iter().find(|provider| provider.id == id)
    }

    pub fn profile(&self, id: &str) -> Option<&Profile> {
        self.profiles.iter().find(|profile| profile.id == id)
    }

    pub fn active_profile(&self) -> Option<&Profile> {
        self.config
            .active_profile_id
            .as_deref()
            .and_then(|id| self.profile(id))
    }

    pub fn folder(&self, id: &str) -> Option<&Folder> {
        self.folders.iter().find(|folder| folder.id == id)
    }

    /// Point `current_chat_id` at an existing chat, or at the newest one if
    /// the stored id is dangling.
    pub fn repair_current_chat(&mut self) {
        let valid = self
            .current_chat_id
            .as_deref()
            .is_some_and(|id| self.chat(id).is_some());
        if !valid {
            self.current_chat_id = self.chats.first().map(|chat| chat.id.clone());
        }
    }
}
