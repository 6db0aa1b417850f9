//! Turns a conversation and the active generation settings into the
//! family-specific request body.

use std::fmt;

use serde::Serialize;

use crate::api::{
    AnthropicBlock, AnthropicContent, AnthropicMessage, ChatContent, ChatContentPart, ChatMessage,
    ChatRequest, ImageUrl, InlineFile, MediaSource, MessagesRequest, StreamOptions, ThinkingConfig,
};
use crate::core::message::{ContentPart, Message, MessageContent};
use crate::core::model_catalog::{
    anthropic_thinking_budget, effective_max_tokens, is_o_series, is_thinking_capable,
    ThinkingIntensity, THINKING_ANSWER_HEADROOM,
};
use crate::core::providers::{chat_url, ProtocolFamily, ProviderKind, ResolvedModel};
use crate::core::state::AppState;
use crate::utils::url::{RequestRouter, UrlPolicyError};

const PDF_MEDIA_TYPE: &str = "application/pdf";

/// Sampling and reasoning parameters for one generation.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSettings {
    /// Bare model id as the provider knows it.
    pub model: String,
    pub system_prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// `None` when thinking is switched off.
    pub thinking: Option<ThinkingIntensity>,
    pub thinking_budget: u32,
}

impl GenerationSettings {
    /// Settings from the global config, with the active profile's token
    /// limit applied.
    pub fn from_state(state: &AppState, model_id: &str) -> Self {
        let config = &state.config;
        let profile_limit = state
            .active_profile()
            .and_then(|profile| profile.token_limit.explicit());
        Self {
            model: model_id.to_string(),
            system_prompt: config.system_prompt.clone(),
            temperature: config.temperature,
            max_tokens: effective_max_tokens(
                model_id,
                &config.user_model_max_overrides,
                profile_limit,
            ),
            thinking: config
                .thinking_enabled
                .then(|| config.thinking_intensity()),
            thinking_budget: config.thinking_budget,
        }
    }

    fn thinking_for_model(&self) -> Option<ThinkingIntensity> {
        self.thinking.filter(|_| is_thinking_capable(&self.model))
    }

    fn system_prompt(&self) -> Option<&str> {
        Some(self.system_prompt.trim()).filter(|prompt| !prompt.is_empty())
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum RequestBody {
    Messages(MessagesRequest),
    ChatCompletions(ChatRequest),
}

/// A fully addressed streaming request, ready to send.
#[derive(Clone)]
pub struct PreparedRequest {
    pub url: String,
    pub kind: ProviderKind,
    pub family: ProtocolFamily,
    pub api_key: String,
    pub body: RequestBody,
}

impl fmt::Debug for PreparedRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreparedRequest")
            .field("url", &self.url)
            .field("kind", &self.kind)
            .field("family", &self.family)
            .field("has_api_key", &!self.api_key.is_empty())
            .field("body", &self.body)
            .finish()
    }
}

/// `data:<media type>;base64,<payload>` split into its two halves.
pub fn split_data_url(url: &str) -> Option<(&str, &str)> {
    let rest = url.strip_prefix("data:")?;
    let (media_type, data) = rest.split_once(";base64,")?;
    Some((media_type, data))
}

fn anthropic_block(part: &ContentPart) -> AnthropicBlock {
    match part {
        ContentPart::Text { text } => AnthropicBlock::Text { text: text.clone() },
        ContentPart::ImageUrl { url } => {
            let source = match split_data_url(url) {
                Some((media_type, data)) => MediaSource::Base64 {
                    media_type: media_type.to_string(),
                    data: data.to_string(),
                },
                None => MediaSource::Url { url: url.clone() },
            };
            AnthropicBlock::Image { source }
        }
        ContentPart::Document { data, .. } => AnthropicBlock::Document {
            source: MediaSource::Base64 {
                media_type: PDF_MEDIA_TYPE.to_string(),
                data: data.clone(),
            },
        },
    }
}

fn anthropic_message(message: &Message) -> AnthropicMessage {
    let content = match &message.content {
        MessageContent::Text(text) => AnthropicContent::Text(text.clone()),
        MessageContent::Parts(parts) => {
            AnthropicContent::Blocks(parts.iter().map(anthropic_block).collect())
        }
    };
    AnthropicMessage {
        role: message.role.as_str().to_string(),
        content,
    }
}

fn chat_part(part: &ContentPart) -> ChatContentPart {
    match part {
        ContentPart::Text { text } => ChatContentPart::Text { text: text.clone() },
        ContentPart::ImageUrl { url } => ChatContentPart::ImageUrl {
            image_url: ImageUrl { url: url.clone() },
        },
        ContentPart::Document {
            name,
            media_type,
            data,
        } => ChatContentPart::File {
            file: InlineFile {
                filename: name.clone(),
                file_data: format!("data:{media_type};base64,{data}"),
            },
        },
    }
}

fn chat_message(message: &Message) -> ChatMessage {
    let content = match &message.content {
        MessageContent::Text(text) => ChatContent::Text(text.clone()),
        MessageContent::Parts(parts) => ChatContent::Parts(parts.iter().map(chat_part).collect()),
    };
    ChatMessage {
        role: message.role.as_str().to_string(),
        content,
    }
}

pub fn build_messages_request(history: &[Message], settings: &GenerationSettings) -> MessagesRequest {
    let mut request = MessagesRequest {
        model: settings.model.clone(),
        max_tokens: settings.max_tokens,
        temperature: settings.temperature,
        stream: true,
        messages: history.iter().map(anthropic_message).collect(),
        system: settings.system_prompt().map(str::to_string),
        thinking: None,
    };

    if let Some(intensity) = settings.thinking_for_model() {
        let budget =
            anthropic_thinking_budget(&settings.model, settings.thinking_budget, intensity);
        request.thinking = Some(ThinkingConfig::enabled(budget));
        // Extended thinking only accepts temperature 1.
        request.temperature = 1.0;
        request.max_tokens = request
            .max_tokens
            .max(budget.saturating_add(THINKING_ANSWER_HEADROOM));
    }
    request
}

pub fn build_chat_request(history: &[Message], settings: &GenerationSettings) -> ChatRequest {
    let mut messages = Vec::with_capacity(history.len() + 1);
    if let Some(system) = settings.system_prompt() {
        messages.push(ChatMessage {
            role: "system".to_string(),
            content: ChatContent::Text(system.to_string()),
        });
    }
    messages.extend(history.iter().map(chat_message));

    let reasoning_effort = settings
        .thinking_for_model()
        .map(|intensity| intensity.reasoning_effort().to_string());

    let o_series = is_o_series(&settings.model);
    ChatRequest {
        model: settings.model.clone(),
        messages,
        stream: true,
        temperature: (!o_series).then_some(settings.temperature),
        max_tokens: (!o_series).then_some(settings.max_tokens),
        max_completion_tokens: o_series.then_some(settings.max_tokens),
        reasoning_effort,
        stream_options: StreamOptions {
            include_usage: true,
        },
    }
}

pub fn build_body(
    family: ProtocolFamily,
    history: &[Message],
    settings: &GenerationSettings,
) -> RequestBody {
    match family {
        ProtocolFamily::Messages => RequestBody::Messages(build_messages_request(history, settings)),
        ProtocolFamily::ChatCompletions => {
            RequestBody::ChatCompletions(build_chat_request(history, settings))
        }
    }
}

/// Address and build the request. The URL must pass the outbound policy.
pub fn prepare_request(
    resolved: &ResolvedModel,
    router: &RequestRouter,
    history: &[Message],
    settings: &GenerationSettings,
) -> Result<PreparedRequest, UrlPolicyError> {
    let family = resolved.provider.family();
    let url = router.route(&chat_url(&resolved.provider, &resolved.endpoint))?;
    Ok(PreparedRequest {
        url,
        kind: resolved.provider.kind,
        family,
        api_key: resolved.provider.api_key.clone(),
        body: build_body(family, history, settings),
    })
}
