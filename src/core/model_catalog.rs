//! Static knowledge about models: output limits, labels and which reasoning
//! controls a model accepts.
//!
//! Thinking support comes in two shapes. Anthropic models take a token
//! budget (`thinking.budget_tokens`); OpenAI-style reasoning models take a
//! discrete `reasoning_effort` of `low`, `medium` or `high`.

use std::collections::BTreeMap;

/// Fallback when no model is selected.
pub const UNKNOWN_MODEL_MAX: u32 = 8096;
pub const DEFAULT_THINKING_BUDGET: u32 = 8000;
/// Headroom kept above the thinking budget for the visible answer.
pub const THINKING_ANSWER_HEADROOM: u32 = 2000;
/// Overrides below this are ignored.
pub const MIN_MODEL_MAX_OVERRIDE: u32 = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownModel {
    pub id: &'static str,
    pub label: &'static str,
    pub max_output: u32,
    pub vision: bool,
}

const fn known(id: &'static str, label: &'static str, max_output: u32, vision: bool) -> KnownModel {
    KnownModel {
        id,
        label,
        max_output,
        vision,
    }
}

pub const KNOWN_MODELS: &[KnownModel] = &[
    known("claude-opus-4-6", "Claude Opus 4.6", 32000, true),
    known("claude-sonnet-4-6", "Claude Sonnet 4.6", 16000, true),
    known("claude-haiku-4-5-20251001", "Claude Haiku 4.5", 8096, true),
    known("claude-3-7-sonnet-20250219", "Claude 3.7 Sonnet", 16000, true),
    known("claude-3-5-sonnet-20241022", "Claude 3.5 Sonnet", 8096, true),
    known("claude-3-5-haiku-20241022", "Claude 3.5 Haiku", 8096, true),
    known("claude-3-opus-20240229", "Claude 3 Opus", 4096, true),
    known("gpt-4.1", "GPT-4.1", 32768, true),
    known("gpt-4.1-mini", "GPT-4.1 mini", 32768, true),
    known("gpt-4.1-nano", "GPT-4.1 nano", 32768, true),
    known("gpt-4o", "GPT-4o", 16384, true),
    known("gpt-4o-mini", "GPT-4o mini", 16384, true),
    known("gpt-4o-search-preview", "GPT-4o Search Preview", 16384, true),
    known("gpt-4.5-preview", "GPT-4.5 Preview", 16384, true),
    known("gpt-4-turbo", "GPT-4 Turbo", 4096, true),
    known("o4-mini", "o4-mini (Thinking)", 100000, true),
    known("o4-mini-high", "o4-mini high (Thinking)", 100000, true),
    known("o3", "o3 (Thinking)", 100000, true),
    known("o3-mini", "o3-mini (Thinking)", 100000, false),
    known("o1", "o1 (Thinking)", 32768, false),
    known("o1-mini", "o1-mini (Thinking)", 65536, false),
    known("o1-pro", "o1-pro (Thinking)", 32768, false),
];

const THINKING_MODELS: &[&str] = &[
    "claude-opus-4-6",
    "claude-sonnet-4-6",
    "claude-3-7-sonnet-20250219",
    "o1",
    "o1-mini",
    "o1-pro",
    "o3",
    "o3-mini",
    "o4-mini",
    "o4-mini-high",
    "gpt-4.5-preview",
    "gpt-4.1",
    "gpt-4.1-mini",
];

pub fn find_known_model(model_id: &str) -> Option<&'static KnownModel> {
    KNOWN_MODELS.iter().find(|model| model.id == model_id)
}

pub fn known_models_with_prefix(prefixes: &[&str]) -> Vec<&'static KnownModel> {
    KNOWN_MODELS
        .iter()
        .filter(|model| prefixes.iter().any(|prefix| model.id.starts_with(prefix)))
        .collect()
}

pub fn label_for(model_id: &str) -> &str {
    find_known_model(model_id)
        .map(|model| model.label)
        .unwrap_or(model_id)
}

fn contains_in_order(haystack: &str, first: &str, then: &str) -> bool {
    haystack
        .find(first)
        .is_some_and(|pos| haystack[pos + first.len()..].contains(then))
}

/// `o1`, `o3-mini`, `o4-mini-high`, ...
pub fn is_o_series(model_id: &str) -> bool {
    let mut chars = model_id.chars();
    chars.next() == Some('o') && chars.next().is_some_and(|c| c.is_ascii_digit())
}

/// Output ceiling before user overrides.
pub fn default_max_output(model_id: &str) -> u32 {
    if model_id.is_empty() {
        return UNKNOWN_MODEL_MAX;
    }
    if let Some(model) = find_known_model(model_id) {
        return model.max_output;
    }
    let lower = model_id.to_ascii_lowercase();
    if lower.contains("70b") || lower.contains("llama-3") {
        8192
    } else if lower.contains("mixtral") || lower.contains("mistral") {
        4096
    } else if lower.contains("gpt-4") {
        8192
    } else {
        4096
    }
}

/// Output ceiling honoring a positive per-model user override.
pub fn max_output(model_id: &str, overrides: &BTreeMap<String, u32>) -> u32 {
    if model_id.is_empty() {
        return UNKNOWN_MODEL_MAX;
    }
    match overrides.get(model_id) {
        Some(&limit) if limit > 0 => limit,
        _ => default_max_output(model_id),
    }
}

/// The profile limit wins only when it is below the model ceiling.
pub fn effective_max_tokens(
    model_id: &str,
    overrides: &BTreeMap<String, u32>,
    profile_limit: Option<u32>,
) -> u32 {
    let model_max = max_output(model_id, overrides);
    match profile_limit {
        Some(limit) if limit > 0 => limit.min(model_max),
        _ => model_max,
    }
}

pub fn is_thinking_capable(model_id: &str) -> bool {
    if model_id.is_empty() {
        return false;
    }
    let bare = model_id
        .rsplit('/')
        .next()
        .unwrap_or(model_id)
        .to_ascii_lowercase();
    THINKING_MODELS.contains(&model_id)
        || THINKING_MODELS.contains(&bare.as_str())
        || is_o_series(&bare)
        || bare.contains("claude-opus-4")
        || bare.contains("claude-sonnet-4")
        || bare.contains("claude-3-7")
        || bare.contains("thinking")
        || bare.contains("reason")
        || bare.contains("deepseek-r")
        || contains_in_order(&bare, "qwen", "think")
        || bare.contains("qwq")
        || contains_in_order(&bare, "llama", "reason")
}

/// Anthropic models that accept a continuous `budget_tokens` value.
pub fn uses_token_budget(model_id: &str) -> bool {
    let lower = model_id.to_ascii_lowercase();
    ["claude-opus-4", "claude-sonnet-4", "claude-3-7-sonnet"]
        .iter()
        .any(|prefix| lower.starts_with(prefix))
}

/// Discrete intensity (1..=3) chosen by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThinkingIntensity {
    Low,
    Medium,
    High,
}

impl ThinkingIntensity {
    /// Out-of-range values fall back to medium.
    pub fn from_level(level: u8) -> Self {
        match level {
            1 => ThinkingIntensity::Low,
            3 => ThinkingIntensity::High,
            _ => ThinkingIntensity::Medium,
        }
    }

    pub fn reasoning_effort(self) -> &'static str {
        match self {
            ThinkingIntensity::Low => "low",
            ThinkingIntensity::Medium => "medium",
            ThinkingIntensity::High => "high",
        }
    }

    pub fn claude_budget(self) -> u32 {
        match self {
            ThinkingIntensity::Low => 2000,
            ThinkingIntensity::Medium => 8000,
            ThinkingIntensity::High => 20000,
        }
    }
}

/// Budget sent to Anthropic: the configured budget for budget-capable
/// models, otherwise the intensity table.
pub fn anthropic_thinking_budget(model_id: &str, configured: u32, intensity: ThinkingIntensity) -> u32 {
    if uses_token_budget(model_id) {
        if configured > 0 {
            configured
        } else {
            DEFAULT_THINKING_BUDGET
        }
    } else {
        intensity.claude_budget()
    }
}

const OPENAI_PRIORITY: &[&str] = &[
    "gpt-4.1", "gpt-4o", "o4", "o3", "o1", "gpt-4.5", "gpt-4-turbo", "gpt-3",
];

fn is_openai_chat_model(id: &str) -> bool {
    let chat = id.starts_with("gpt-") || id.starts_with("chatgpt-") || is_o_series(id);
    if !chat {
        return false;
    }
    let excluded = ["embed", "whisper", "tts", "dall-e", "realtime", "audio", "transcribe"]
        .iter()
        .any(|needle| id.contains(needle))
        || id.ends_with("search")
        || has_dated_preview(id);
    !excluded
}

/// `...preview-2024...` snapshot ids.
fn has_dated_preview(id: &str) -> bool {
    id.match_indices("preview-").any(|(pos, needle)| {
        let rest = &id[pos + needle.len()..];
        rest.len() >= 4 && rest.as_bytes()[..4].iter().all(u8::is_ascii_digit)
    })
}

fn openai_rank(id: &str) -> usize {
    OPENAI_PRIORITY
        .iter()
        .position(|prefix| id.starts_with(prefix))
        .unwrap_or(usize::MAX)
}

/// Keep chat-capable OpenAI models, ordered by family priority and then
/// reverse lexical id.
pub fn filter_openai_chat_models(ids: Vec<String>) -> Vec<String> {
    let mut models: Vec<String> = ids
        .into_iter()
        .filter(|id| is_openai_chat_model(id))
        .collect();
    models.sort_by(|a, b| {
        openai_rank(a)
            .cmp(&openai_rank(b))
            .then_with(|| b.cmp(a))
    });
    models
}
