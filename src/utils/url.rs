//! URL utilities for consistent URL handling
//!
//! This module normalizes base URLs, enforces the outbound host allow-list,
//! and routes requests through the local development proxy when the client
//! is served from a loopback host.

use reqwest::Url;
use std::error::Error;
use std::fmt;
use std::net::IpAddr;

/// Hosts the client is permitted to contact. A URL matches when its host is
/// one of these or a subdomain of one of these.
pub const ALLOWED_API_DOMAINS: &[&str] = &[
    "api.anthropic.com",
    "api.openai.com",
    "chat.kiconnect.nrw",
    "openrouter.ai",
    "api.mistral.ai",
    "generativelanguage.googleapis.com",
    "api.x.ai",
    "api.groq.com",
];

/// Path prefix under which the local proxy forwards absolute URLs.
pub const PROXY_PATH_PREFIX: &str = "/proxy/";

/// Normalize a base URL by removing trailing slashes
///
/// This ensures consistent URL construction when appending endpoints,
/// preventing double slashes in the final URLs.
///
/// # Examples
///
/// ```
/// use kiconnect::utils::url::normalize_base_url;
///
/// assert_eq!(normalize_base_url("https://api.example.com/v1"), "https://api.example.com/v1");
/// assert_eq!(normalize_base_url("https://api.example.com/v1/"), "https://api.example.com/v1");
/// assert_eq!(normalize_base_url("https://api.example.com/v1///"), "https://api.example.com/v1");
/// ```
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// Construct a complete API endpoint URL from a base URL and endpoint path
///
/// # Examples
///
/// ```
/// use kiconnect::utils::url::construct_api_url;
///
/// assert_eq!(
///     construct_api_url("https://api.example.com/v1", "chat/completions"),
///     "https://api.example.com/v1/chat/completions"
/// );
/// assert_eq!(
///     construct_api_url("https://api.example.com/v1/", "/chat/completions"),
///     "https://api.example.com/v1/chat/completions"
/// );
/// ```
pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    let normalized_base = normalize_base_url(base_url);
    let endpoint = endpoint.trim_start_matches('/');
    format!("{}/{}", normalized_base, endpoint)
}

/// Reasons an outbound URL is refused before any request is issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlPolicyError {
    Invalid { url: String, reason: String },
    UnsupportedScheme { scheme: String },
    MissingHost,
    IpLiteral { host: String },
    HostNotAllowed { host: String },
}

impl fmt::Display for UrlPolicyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UrlPolicyError::Invalid { url, reason } => {
                write!(f, "Blocked request: '{url}' is not a valid URL ({reason})")
            }
            UrlPolicyError::UnsupportedScheme { scheme } => {
                write!(f, "Blocked request: only http and https are allowed, got '{scheme}'")
            }
            UrlPolicyError::MissingHost => write!(f, "Blocked request: URL has no hostname"),
            UrlPolicyError::IpLiteral { host } => {
                write!(f, "Blocked request: direct IP addresses are not allowed ({host})")
            }
            UrlPolicyError::HostNotAllowed { host } => {
                write!(f, "Blocked request: API domain '{host}' is not on the allow-list")
            }
        }
    }
}

impl Error for UrlPolicyError {}

fn host_is_allowed(host: &str) -> bool {
    ALLOWED_API_DOMAINS.iter().any(|domain| {
        host == *domain
            || host
                .strip_suffix(domain)
                .is_some_and(|prefix| prefix.ends_with('.'))
    })
}

/// Validate a URL against the outbound allow-list.
///
/// Matching is exact or by subdomain (`eu.api.openai.com` passes,
/// `api.openai.com.evil.example` and `notapi.openai.com`-style lookalikes do not).
pub fn check_api_url(url: &str) -> Result<Url, UrlPolicyError> {
    let parsed = Url::parse(url).map_err(|err| UrlPolicyError::Invalid {
        url: url.to_string(),
        reason: err.to_string(),
    })?;

    match parsed.scheme() {
        "http" | "https" => {}
        other => {
            return Err(UrlPolicyError::UnsupportedScheme {
                scheme: other.to_string(),
            })
        }
    }

    let host = match parsed.host_str() {
        None | Some("") => return Err(UrlPolicyError::MissingHost),
        Some(host) => host.to_ascii_lowercase(),
    };

    let bare = host.trim_start_matches('[').trim_end_matches(']');
    if bare.parse::<IpAddr>().is_ok() {
        return Err(UrlPolicyError::IpLiteral { host });
    }

    if !host_is_allowed(&host) {
        return Err(UrlPolicyError::HostNotAllowed { host });
    }

    Ok(parsed)
}

pub fn is_safe_api_url(url: &str) -> bool {
    check_api_url(url).is_ok()
}

/// True when the application itself is served from a loopback host, in
/// which case outbound traffic goes through the local proxy.
pub fn is_local_host(served_from: &str) -> bool {
    let host = served_from
        .split_once(':')
        .map(|(host, _)| host)
        .unwrap_or(served_from);
    host.eq_ignore_ascii_case("localhost") || host == "127.0.0.1"
}

/// Decides how validated URLs are dispatched: directly, or through the
/// development proxy at `{proxy_base}/proxy/{absolute-url}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestRouter {
    proxy_base: Option<String>,
}

impl RequestRouter {
    pub fn direct() -> Self {
        Self { proxy_base: None }
    }

    pub fn via_proxy(proxy_base: &str) -> Self {
        Self {
            proxy_base: Some(normalize_base_url(proxy_base)),
        }
    }

    /// Pick the route purely from the host the application is served from.
    pub fn for_environment(served_from: Option<&str>, proxy_base: &str) -> Self {
        match served_from {
            Some(host) if is_local_host(host) => Self::via_proxy(proxy_base),
            _ => Self::direct(),
        }
    }

    pub fn uses_proxy(&self) -> bool {
        self.proxy_base.is_some()
    }

    /// Validate `url` and return the address to dispatch to.
    pub fn route(&self, url: &str) -> Result<String, UrlPolicyError> {
        if let Err(err) = check_api_url(url) {
            tracing::warn!(error = %err, "Refusing outbound request");
            return Err(err);
        }
        Ok(match &self.proxy_base {
            Some(base) => format!("{base}{PROXY_PATH_PREFIX}{url}"),
            None => url.to_string(),
        })
    }
}

impl Default for RequestRouter {
    fn default() -> Self {
        Self::direct()
    }
}
