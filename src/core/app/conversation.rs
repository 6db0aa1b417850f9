use tracing::debug;

use super::App;
use crate::core::chat::Chat;

impl App {
    /// Start an empty chat, filed into the first folder when folders exist.
    pub fn new_chat(&mut self) -> String {
        let folder_id = self.state.folders.first().map(|folder| folder.id.clone());
        let chat = Chat::new(folder_id);
        let id = chat.id.clone();
        self.state.chats.insert(0, chat);
        self.state.current_chat_id = Some(id.clone());
        self.persist();
        id
    }

    pub fn switch_chat(&mut self, chat_id: &str) -> bool {
        if self.state.chat(chat_id).is_none() {
            return false;
        }
        self.state.current_chat_id = Some(chat_id.to_string());
        self.persist();
        true
    }

    /// Remove a chat. Deleting the current chat moves to the first remaining
    /// one.
    pub fn delete_chat(&mut self, chat_id: &str) -> bool {
        let before = self.state.chats.len();
        self.state.chats.retain(|chat| chat.id != chat_id);
        if self.state.chats.len() == before {
            return false;
        }
        if self.state.current_chat_id.as_deref() == Some(chat_id) {
            self.state.current_chat_id = self.state.chats.first().map(|chat| chat.id.clone());
        }
        debug!(chat_id, "Chat deleted");
        self.persist();
        true
    }

    /// Blank titles are ignored.
    pub fn rename_chat(&mut self, chat_id: &str, title: &str) -> bool {
        let title = title.trim();
        match self.state.chat_mut(chat_id) {
            Some(chat) if !title.is_empty() => chat.title = title.to_string(),
            _ => return false,
        }
        self.persist();
        true
    }

    /// File a chat into `folder_id`, or unfile it with `None`.
    pub fn move_chat(&mut self, chat_id: &str, folder_id: Option<&str>) -> bool {
        if folder_id.is_some_and(|id| self.state.folder(id).is_none()) {
            return false;
        }
        let Some(chat) = self.state.chat_mut(chat_id) else {
            return false;
        };
        chat.folder_id = folder_id.map(str::to_string);
        self.persist();
        true
    }

    /// Replace the text of a message in the current chat. Attachments stay.
    pub fn edit_message(&mut self, index: usize, text: &str) -> bool {
        let Some(message) = self
            .state
            .current_chat_mut()
            .and_then(|chat| chat.messages.get_mut(index))
        else {
            return false;
        };
        message.content.replace_first_text(text);
        self.persist();
        true
    }

    pub fn delete_message(&mut self, index: usize) -> bool {
        let Some(chat) = self.state.current_chat_mut() else {
            return false;
        };
        if index >= chat.messages.len() {
            return false;
        }
        chat.messages.remove(index);
        self.persist();
        true
    }

    /// Copy the current chat up to and including `index` into a new chat
    /// and switch to it.
    pub fn branch_from(&mut self, index: usize) -> Option<String> {
        let branch = self.state.current_chat()?.branch_at(index)?;
        let id = branch.id.clone();
        self.state.chats.insert(0, branch);
        self.state.current_chat_id = Some(id.clone());
        self.persist();
        Some(id)
    }

    pub fn chat_token_total(&self, chat_id: &str) -> Option<u64> {
        self.state.chat(chat_id).map(Chat::token_total)
    }
}
