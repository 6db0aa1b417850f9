use std::error::Error;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::builtin_providers::find_builtin_provider;
use crate::utils::url::{construct_api_url, normalize_base_url};

/// Separator inside a composite model id: `providerId::modelId`.
pub const MODEL_ID_SEPARATOR: &str = "::";

const QUICK_FIXES: &[&str] = &[
    "kiconnect provider list            # Check configured providers",
    "kiconnect provider add             # Add a provider and API key",
    "kiconnect model set <provider::id> # Select a model",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    OpenaiCompat,
    Anthropic,
    OpenaiDirect,
    Openrouter,
    Mistral,
    Gemini,
    Xai,
    Groq,
}

/// The two wire protocols spoken by supported providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolFamily {
    /// Event-typed SSE (`/v1/messages`).
    Messages,
    /// Flat-delta SSE (`/chat/completions`).
    ChatCompletions,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 8] = [
        ProviderKind::OpenaiCompat,
        ProviderKind::Anthropic,
        ProviderKind::OpenaiDirect,
        ProviderKind::Openrouter,
        ProviderKind::Mistral,
        ProviderKind::Gemini,
        ProviderKind::Xai,
        ProviderKind::Groq,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::OpenaiCompat => "openai-compat",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::OpenaiDirect => "openai-direct",
            ProviderKind::Openrouter => "openrouter",
            ProviderKind::Mistral => "mistral",
            ProviderKind::Gemini => "gemini",
            ProviderKind::Xai => "xai",
            ProviderKind::Groq => "groq",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(value.trim()))
    }

    pub fn display_name(self) -> &'static str {
        match find_builtin_provider(self.as_str()) {
            Some(builtin) => builtin.display_name.as_str(),
            None => "OpenAI-compatible",
        }
    }

    pub fn family(self) -> ProtocolFamily {
        match find_builtin_provider(self.as_str()) {
            Some(builtin) if builtin.is_anthropic_mode() => ProtocolFamily::Messages,
            _ => ProtocolFamily::ChatCompletions,
        }
    }

    /// Whether the endpoint comes from the user rather than the built-in table.
    pub fn requires_server_url(self) -> bool {
        self == ProviderKind::OpenaiCompat
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ProviderKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_url: Option<String>,
    /// Plaintext in memory; replaced by vault ciphertext when persisted.
    #[serde(default)]
    pub api_key: String,
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("server_url", &self.server_url)
            .field("has_api_key", &!self.api_key.is_empty())
            .finish()
    }
}

impl Provider {
    pub fn new(name: impl Into<String>, kind: ProviderKind) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            kind,
            server_url: None,
            api_key: String::new(),
        }
    }

    pub fn with_server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = Some(url.into());
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = key.into();
        self
    }

    pub fn family(&self) -> ProtocolFamily {
        self.kind.family()
    }

    /// Name required; a server URL is required for generic providers.
    pub fn validate(&self) -> Result<(), ProviderResolutionError> {
        if self.name.trim().is_empty() {
            return Err(ProviderResolutionError::invalid_provider(
                "Provider name is required",
            ));
        }
        if self.kind.requires_server_url()
            && self
                .server_url
                .as_deref()
                .map(str::trim)
                .unwrap_or("")
                .is_empty()
        {
            return Err(ProviderResolutionError::invalid_provider(
                "A server URL is required for OpenAI-compatible providers",
            ));
        }
        Ok(())
    }
}

/// Base URL for a provider: the built-in table for hosted vendors, the
/// trimmed user URL for generic ones.
pub fn resolve_endpoint(provider: &Provider) -> Option<String> {
    if provider.kind.requires_server_url() {
        return provider
            .server_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(normalize_base_url)
            .filter(|url| !url.is_empty());
    }
    find_builtin_provider(provider.kind.as_str()).map(|builtin| builtin.base_url.clone())
}

/// Streaming endpoint for the provider's protocol family.
pub fn chat_url(provider: &Provider, endpoint: &str) -> String {
    match provider.family() {
        ProtocolFamily::Messages => construct_api_url(endpoint, "v1/messages"),
        ProtocolFamily::ChatCompletions => construct_api_url(endpoint, "chat/completions"),
    }
}

pub fn models_url(provider: &Provider, endpoint: &str) -> String {
    match provider.family() {
        ProtocolFamily::Messages => construct_api_url(endpoint, "v1/models"),
        ProtocolFamily::ChatCompletions => construct_api_url(endpoint, "models"),
    }
}

/// Split `providerId::modelId`. Ids without a separator have no provider.
pub fn split_model_id(full_id: &str) -> (Option<&str>, &str) {
    match full_id.split_once(MODEL_ID_SEPARATOR) {
        Some((provider_id, model_id)) => (Some(provider_id), model_id),
        None => (None, full_id),
    }
}

pub fn make_model_id(provider_id: &str, model_id: &str) -> String {
    format!("{provider_id}{MODEL_ID_SEPARATOR}{model_id}")
}

pub fn provider_for_model<'a>(providers: &'a [Provider], full_model_id: &str) -> Option<&'a Provider> {
    let (provider_id, _) = split_model_id(full_model_id);
    let provider_id = provider_id?;
    providers.iter().find(|p| p.id == provider_id)
}

/// Everything needed to address a request for the selected model.
#[derive(Debug, Clone)]
pub struct ResolvedModel {
    pub provider: Provider,
    pub model_id: String,
    pub endpoint: String,
}

pub fn resolve_model(
    providers: &[Provider],
    full_model_id: &str,
) -> Result<ResolvedModel, ProviderResolutionError> {
    if full_model_id.trim().is_empty() {
        return Err(ProviderResolutionError::no_model_selected());
    }
    let provider = provider_for_model(providers, full_model_id)
        .ok_or_else(|| ProviderResolutionError::unknown_provider(full_model_id))?;
    let endpoint = resolve_endpoint(provider)
        .ok_or_else(|| ProviderResolutionError::missing_endpoint(&provider.name))?;
    if provider.api_key.is_empty() {
        return Err(ProviderResolutionError::missing_api_key(&provider.name));
    }
    let (_, model_id) = split_model_id(full_model_id);
    Ok(ResolvedModel {
        provider: provider.clone(),
        model_id: model_id.to_string(),
        endpoint,
    })
}

#[derive(Debug)]
pub struct ProviderResolutionError {
    message: String,
    quick_fixes: &'static [&'static str],
    exit_code: i32,
}

impl ProviderResolutionError {
    pub fn no_model_selected() -> Self {
        Self::new(
            "No model selected. Choose one with 'kiconnect model set'.",
            QUICK_FIXES,
            2,
        )
    }

    pub fn unknown_provider(full_model_id: &str) -> Self {
        Self::new(
            format!("No configured provider matches model '{full_model_id}'."),
            QUICK_FIXES,
            2,
        )
    }

    pub fn missing_endpoint(provider: &str) -> Self {
        Self::new(
            format!("Provider '{provider}' has no usable endpoint."),
            QUICK_FIXES,
            2,
        )
    }

    pub fn missing_api_key(provider: &str) -> Self {
        Self::new(
            format!("No API key stored for provider '{provider}'."),
            QUICK_FIXES,
            2,
        )
    }

    pub fn invalid_provider(message: impl Into<String>) -> Self {
        Self::new(message, &[], 1)
    }

    fn new(
        message: impl Into<String>,
        quick_fixes: &'static [&'static str],
        exit_code: i32,
    ) -> Self {
        Self {
            message: message.into(),
            quick_fixes,
            exit_code,
        }
    }

    pub fn quick_fixes(&self) -> &'static [&'static str] {
        self.quick_fixes
    }

    pub fn exit_code(&self) -> i32 {
        self.exit_code
    }
}

impl fmt::Display for ProviderResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for ProviderResolutionError {}
