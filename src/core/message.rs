use serde::{Deserialize, Serialize};

/// Inline media larger than this many bytes is swapped for a placeholder
/// when a message is written to storage.
pub const MAX_STORED_MEDIA_BYTES: usize = 500 * 1024;

pub const IMAGE_NOT_SAVED_PLACEHOLDER: &str = "[Image too large, not saved]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn is_user(self) -> bool {
        self == Role::User
    }

    pub fn is_assistant(self) -> bool {
        self == Role::Assistant
    }
}

impl AsRef<str> for Role {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl TryFrom<&str> for Role {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            _ => Err(format!("invalid message role: {value}")),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

impl From<Role> for String {
    fn from(value: Role) -> Self {
        value.as_str().to_string()
    }
}

/// One typed piece of a multi-part message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text {
        text: String,
    },
    /// An image referenced by URL; inline images use a `data:` URL.
    ImageUrl {
        url: String,
    },
    /// An inline document carried as base64.
    Document {
        name: String,
        media_type: String,
        data: String,
    },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    fn inline_media_len(&self) -> Option<usize> {
        match self {
            ContentPart::ImageUrl { url } if url.starts_with("data:") => Some(url.len()),
            ContentPart::Document { data, .. } => Some(data.len()),
            _ => None,
        }
    }

    /// Placeholder copy used for storage when inline media is too large.
    pub fn redacted_for_storage(&self) -> ContentPart {
        match self.inline_media_len() {
            Some(len) if len > MAX_STORED_MEDIA_BYTES => match self {
                ContentPart::Document { name, .. } => {
                    ContentPart::text(format!("[Document: {name}]"))
                }
                _ => ContentPart::text(IMAGE_NOT_SAVED_PLACEHOLDER),
            },
            _ => self.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// First text fragment, used for titles and resend.
    pub fn first_text(&self) -> Option<&str> {
        match self {
            MessageContent::Text(text) => Some(text.as_str()),
            MessageContent::Parts(parts) => parts.iter().find_map(|part| match part {
                ContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            }),
        }
    }

    /// Replace the first text fragment. A parts list without text gains one
    /// at the front.
    pub fn replace_first_text(&mut self, new_text: impl Into<String>) {
        let new_text = new_text.into();
        match self {
            MessageContent::Text(text) => *text = new_text,
            MessageContent::Parts(parts) => {
                if let Some(ContentPart::Text { text }) = parts
                    .iter_mut()
                    .find(|part| matches!(part, ContentPart::Text { .. }))
                {
                    *text = new_text;
                } else {
                    parts.insert(0, ContentPart::text(new_text));
                }
            }
        }
    }

    pub fn redacted_for_storage(&self) -> MessageContent {
        match self {
            MessageContent::Text(text) => MessageContent::Text(text.clone()),
            MessageContent::Parts(parts) => MessageContent::Parts(
                parts.iter().map(ContentPart::redacted_for_storage).collect(),
            ),
        }
    }
}

impl From<&str> for MessageContent {
    fn from(value: &str) -> Self {
        MessageContent::Text(value.to_string())
    }
}

impl From<String> for MessageContent {
    fn from(value: String) -> Self {
        MessageContent::Text(value)
    }
}

/// Token accounting in the canonical (Anthropic-style) field naming.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_read_input_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_creation_input_tokens: Option<u64>,
}

impl Usage {
    /// Overlay the fields present in `update`; absent fields keep their value.
    pub fn merge(&mut self, update: &Usage) {
        if update.input_tokens.is_some() {
            self.input_tokens = update.input_tokens;
        }
        if update.output_tokens.is_some() {
            self.output_tokens = update.output_tokens;
        }
        if update.cache_read_input_tokens.is_some() {
            self.cache_read_input_tokens = update.cache_read_input_tokens;
        }
        if update.cache_creation_input_tokens.is_some() {
            self.cache_creation_input_tokens = update.cache_creation_input_tokens;
        }
    }

    pub fn total(&self) -> u64 {
        self.input_tokens.unwrap_or(0) + self.output_tokens.unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    /// Composite id of the model that produced an assistant turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<MessageContent>) -> Self {
        Self {
            role,
            content: content.into(),
            usage: None,
            model: None,
            files: Vec::new(),
        }
    }

    pub fn user(content: impl Into<MessageContent>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<MessageContent>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn is_user(&self) -> bool {
        self.role.is_user()
    }

    pub fn is_assistant(&self) -> bool {
        self.role.is_assistant()
    }

    pub fn with_usage(mut self, usage: Option<Usage>) -> Self {
        self.usage = usage;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn text(&self) -> Option<&str> {
        self.content.first_text()
    }

    pub fn redacted_for_storage(&self) -> Message {
        Message {
            content: self.content.redacted_for_storage(),
            ..self.clone()
        }
    }
}

/// Assistant content with reasoning text folded in front of the answer.
pub fn with_thinking_prefix(thinking: &str, text: &str) -> String {
    if thinking.is_empty() {
        text.to_string()
    } else {
        format!("<thinking>\n{thinking}\n</thinking>\n\n{text}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_role_strings_are_rejected() {
        assert!(Role::try_from("system").is_err());
        assert_eq!(Role::try_from("assistant"), Ok(Role::Assistant));
    }

    #[test]
    fn content_deserializes_from_plain_string_or_parts() {
        let plain: MessageContent = serde_json::from_str(r#""hello""#).expect("plain");
        assert_eq!(plain, MessageContent::Text("hello".into()));

        let parts: MessageContent = serde_json::from_str(
            r#"[{"type":"text","text":"look"},{"type":"image_url","url":"https://x/y.png"}]"#,
        )
        .expect("parts");
        assert_eq!(parts.first_text(), Some("look"));
    }

    #[test]
    fn oversized_inline_image_is_replaced_only_in_storage_copy() {
        let big = format!("data:image/png;base64,{}", "A".repeat(MAX_STORED_MEDIA_BYTES + 1));
        let message = Message::user(MessageContent::Parts(vec![
            ContentPart::text("see"),
            ContentPart::ImageUrl { url: big.clone() },
            ContentPart::ImageUrl {
                url: "https://example.org/cat.png".into(),
            },
        ]));

        let stored = message.redacted_for_storage();
        let MessageContent::Parts(parts) = &stored.content else {
            panic!("expected parts");
        };
        assert_eq!(parts[1], ContentPart::text(IMAGE_NOT_SAVED_PLACEHOLDER));
        assert!(matches!(&parts[2], ContentPart::ImageUrl { url } if url.starts_with("https://")));

        let MessageContent::Parts(original) = &message.content else {
            panic!("expected parts");
        };
        assert_eq!(original[1], ContentPart::ImageUrl { url: big });
    }

    #[test]
    fn small_media_survives_storage() {
        let part = ContentPart::Document {
            name: "a.pdf".into(),
            media_type: "application/pdf".into(),
            data: "JVBERi0=".into(),
        };
        assert_eq!(part.redacted_for_storage(), part);
    }

    #[test]
    fn replace_first_text_edits_in_place() {
        let mut content = MessageContent::Parts(vec![
            ContentPart::ImageUrl { url: "https://x".into() },
            ContentPart::text("old"),
        ]);
        content.replace_first_text("new");
        assert_eq!(content.first_text(), Some("new"));

        let mut no_text = MessageContent::Parts(vec![ContentPart::ImageUrl { url: "https://x".into() }]);
        no_text.replace_first_text("caption");
        assert_eq!(no_text.first_text(), Some("caption"));
    }

    #[test]
    fn usage_merge_overlays_present_fields() {
        let mut usage = Usage {
            input_tokens: Some(12),
            output_tokens: Some(1),
            ..Usage::default()
        };
        usage.merge(&Usage {
            output_tokens: Some(40),
            ..Usage::default()
        });
        assert_eq!(usage.input_tokens, Some(12));
        assert_eq!(usage.output_tokens, Some(40));
        assert_eq!(usage.total(), 52);
    }

    #[test]
    fn thinking_prefix_only_when_present() {
        assert_eq!(with_thinking_prefix("", "answer"), "answer");
        assert_eq!(
            with_thinking_prefix("hmm", "answer"),
            "<thinking>\nhmm\n</thinking>\n\nanswer"
        );
    }
}
