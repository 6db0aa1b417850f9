//! Authentication utilities for API requests
//!
//! This module adds provider-specific authentication headers to HTTP
//! requests. The header set depends only on the provider kind.

use crate::core::providers::{ProtocolFamily, ProviderKind};

pub const ANTHROPIC_VERSION: &str = "2023-06-01";
/// Sent to OpenRouter for attribution.
pub const APP_REFERER: &str = "https://chat.kiconnect.nrw";
pub const APP_TITLE: &str = "KI Connect NRW";

/// Add provider-specific authentication headers to an HTTP request
///
/// - Anthropic: `x-api-key` with `anthropic-version` and the direct-access opt-in
/// - OpenRouter: `Authorization: Bearer` plus attribution headers
/// - All others: `Authorization: Bearer`
pub fn add_auth_headers(
    request: reqwest::RequestBuilder,
    kind: ProviderKind,
    api_key: &str,
) -> reqwest::RequestBuilder {
    if kind.family() == ProtocolFamily::Messages {
        return request
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("anthropic-dangerous-direct-browser-access", "true");
    }

    let request = request.header("Authorization", format!("Bearer {api_key}"));
    if kind == ProviderKind::Openrouter {
        request
            .header("HTTP-Referer", APP_REFERER)
            .header("X-Title", APP_TITLE)
    } else {
        request
    }
}
