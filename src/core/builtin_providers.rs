//! Built-in provider configuration
//!
//! Hosted vendors with fixed endpoints are described in
//! `builtin_providers.toml`, embedded at build time.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use tracing::error;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltinProvider {
    pub id: String,
    pub display_name: String,
    pub base_url: String,
    pub mode: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct BuiltinProvidersConfig {
    providers: Vec<BuiltinProvider>,
}

impl BuiltinProvider {
    /// Wire protocol family, `openai` unless stated otherwise
    pub fn auth_mode(&self) -> &str {
        self.mode.as_deref().unwrap_or("openai")
    }

    /// Check if this provider speaks the Anthropic Messages protocol
    pub fn is_anthropic_mode(&self) -> bool {
        self.auth_mode() == "anthropic"
    }
}

/// Load built-in providers from the embedded configuration
pub fn load_builtin_providers() -> &'static [BuiltinProvider] {
    static PROVIDERS: OnceLock<Vec<BuiltinProvider>> = OnceLock::new();
    PROVIDERS.get_or_init(|| {
        const CONFIG_CONTENT: &str = include_str!("../builtin_providers.toml");
        match toml::from_str::<BuiltinProvidersConfig>(CONFIG_CONTENT) {
            Ok(config) => config.providers,
            Err(err) => {
                error!(error = %err, "Embedded provider table is invalid");
                Vec::new()
            }
        }
    })
}

/// Find a built-in provider by ID (case-insensitive)
pub fn find_builtin_provider(id: &str) -> Option<&'static BuiltinProvider> {
    load_builtin_providers()
        .iter()
        .find(|p| p.id.eq_ignore_ascii_case(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::url::is_safe_api_url;

    #[test]
    fn test_load_builtin_providers() {
        let providers = load_builtin_providers();
        let provider_ids: Vec<&str> = providers.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(
            provider_ids,
            ["anthropic", "openai-direct", "openrouter", "mistral", "gemini", "xai", "groq"]
        );
    }

    #[test]
    fn test_find_builtin_provider() {
        let provider = find_builtin_provider("OpenRouter").expect("case-insensitive");
        assert_eq!(provider.id, "openrouter");
        assert_eq!(provider.base_url, "https://openrouter.ai/api/v1");

        assert!(find_builtin_provider("openai-compat").is_none());
    }

    #[test]
    fn test_anthropic_mode() {
        let anthropic = find_builtin_provider("anthropic").unwrap();
        assert!(anthropic.is_anthropic_mode());

        let groq = find_builtin_provider("groq").unwrap();
        assert!(!groq.is_anthropic_mode());
        assert_eq!(groq.auth_mode(), "openai");
    }

    #[test]
    fn builtin_endpoints_pass_the_allow_list() {
        for provider in load_builtin_providers() {
            assert!(
                is_safe_api_url(&provider.base_url),
                "{} is not allow-listed",
                provider.base_url
            );
        }
    }
}
