use serde::{Deserialize, Serialize};

use crate::core::message::Message;

pub const TITLE_MAX_CHARS: usize = 40;
const BRANCH_TITLE_CHARS: usize = 32;
pub const DEFAULT_CHAT_TITLE: &str = "New chat";

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub collapsed: bool,
}

impl Folder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            collapsed: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<String>,
    /// Chat this one was branched from. Not owning; the source may be gone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_of: Option<String>,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub created_at: i64,
}

impl Chat {
    pub fn new(folder_id: Option<String>) -> Self {
        Self {
            id: new_id(),
            title: DEFAULT_CHAT_TITLE.to_string(),
            folder_id,
            branch_of: None,
            messages: Vec::new(),
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Title from the first user text, used when the first turn is added.
    pub fn title_from_text(text: &str) -> String {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            DEFAULT_CHAT_TITLE.to_string()
        } else {
            truncate_chars(trimmed, TITLE_MAX_CHARS)
        }
    }

    /// Copy of the conversation up to and including `index`.
    pub fn branch_at(&self, index: usize) -> Option<Chat> {
        if index >= self.messages.len() {
            return None;
        }
        Some(Chat {
            id: new_id(),
            title: format!(
                "↩ {} (from #{})",
                truncate_chars(&self.title, BRANCH_TITLE_CHARS),
                index + 1
            ),
            folder_id: self.folder_id.clone(),
            branch_of: Some(self.id.clone()),
            messages: self.messages[..=index].to_vec(),
            created_at: chrono::Utc::now().timestamp_millis(),
        })
    }

    /// Sum of input and output tokens over all recorded usage.
    pub fn token_total(&self) -> u64 {
        self.messages
            .iter()
            .filter_map(|message| message.usage.as_ref())
            .map(|usage| usage.total())
            .sum()
    }

    pub fn storage_copy(&self) -> Chat {
        Chat {
            messages: self
                .messages
                .iter()
                .map(Message::redacted_for_storage)
                .collect(),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TokenLimit {
    #[default]
    ModelDefault,
    Explicit {
        max_tokens: u32,
    },
}

impl TokenLimit {
    pub fn explicit(self) -> Option<u32> {
        match self {
            TokenLimit::ModelDefault => None,
            TokenLimit::Explicit { max_tokens } => Some(max_tokens),
        }
    }
}

pub const PROFILE_COLORS: &[&str] = &[
    "#3d7eff", "#7c5cfc", "#2ecc71", "#e74c3c", "#f39c12", "#1abc9c", "#e91e63", "#ff6b35",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default = "crate::core::config::data::default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub token_limit: TokenLimit,
    #[serde(default = "default_color")]
    pub color: String,
}

fn default_color() -> String {
    PROFILE_COLORS[0].to_string()
}

impl Profile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            model: String::new(),
            system_prompt: String::new(),
            temperature: crate::core::config::data::default_temperature(),
            token_limit: TokenLimit::ModelDefault,
            color: default_color(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::message::Usage;

    #[test]
    fn title_is_first_forty_chars() {
        let long = "é".repeat(50);
        assert_eq!(Chat::title_from_text(&long).chars().count(), TITLE_MAX_CHARS);
        assert_eq!(Chat::title_from_text("  "), DEFAULT_CHAT_TITLE);
    }

    #[test]
    fn branch_copies_prefix_and_links_back() {
        let mut chat = Chat::new(Some("f1".into()));
        chat.title = "A rather long conversation title that keeps going".into();
        chat.messages.push(Message::user("one"));
        chat.messages.push(Message::assistant("two"));
        chat.messages.push(Message::user("three"));

        let branch = chat.branch_at(1).expect("branch");
        assert_eq!(branch.messages.len(), 2);
        assert_eq!(branch.branch_of.as_deref(), Some(chat.id.as_str()));
        assert_eq!(branch.folder_id.as_deref(), Some("f1"));
        assert_eq!(branch.title, "↩ A rather long conversation title (from #2)");
        assert_ne!(branch.id, chat.id);
        assert!(chat.branch_at(3).is_none());
    }

    #[test]
    fn token_total_sums_usage() {
        let mut chat = Chat::new(None);
        chat.messages.push(Message::user("q"));
        chat.messages.push(Message::assistant("a").with_usage(Some(Usage {
            input_tokens: Some(10),
            output_tokens: Some(2),
            ..Usage::default()
        })));
        chat.messages.push(Message::assistant("b").with_usage(Some(Usage {
            output_tokens: Some(5),
            ..Usage::default()
        })));
        assert_eq!(chat.token_total(), 17);
    }

    #[test]
    fn token_limit_serializes_as_tagged_policy() {
        let json = serde_json::to_string(&TokenLimit::Explicit { max_tokens: 900 }).unwrap();
        assert_eq!(json, r#"{"mode":"explicit","max_tokens":900}"#);
        let default: TokenLimit = serde_json::from_str(r#"{"mode":"model_default"}"#).unwrap();
        assert_eq!(default.explicit(), None);
    }
}
