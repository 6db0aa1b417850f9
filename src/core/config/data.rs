use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::core::config::io::ConfigError;
use crate::core::model_catalog::ThinkingIntensity;
use crate::core::session_gate::DEFAULT_SESSION_MINUTES;

pub const DEFAULT_STORAGE_QUOTA_BYTES: u64 = 5 * 1024 * 1024;
pub const DEFAULT_PROXY_BASE: &str = "http://localhost:5000";
pub const DEFAULT_LOG_FILTER: &str = "warn";

pub fn default_temperature() -> f32 {
    0.7
}

fn default_thinking_intensity() -> u8 {
    2
}

fn default_thinking_budget() -> u32 {
    crate::core::model_catalog::DEFAULT_THINKING_BUDGET
}

fn default_session_minutes() -> u32 {
    DEFAULT_SESSION_MINUTES
}

/// Machine-local settings read from `settings.toml`.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct Settings {
    /// Directory holding the persisted entities. Defaults to the platform
    /// data directory.
    pub data_dir: Option<PathBuf>,
    /// Capacity of the entity store in bytes.
    pub storage_quota_bytes: Option<u64>,
    /// Host the client is served from; loopback hosts route through the proxy.
    pub served_from: Option<String>,
    /// Base URL of the development proxy.
    pub proxy_base: Option<String>,
    /// `tracing` filter used when `KICONNECT_LOG` is not set.
    pub log_filter: Option<String>,
}

impl Settings {
    pub fn storage_quota(&self) -> u64 {
        self.storage_quota_bytes
            .unwrap_or(DEFAULT_STORAGE_QUOTA_BYTES)
    }

    pub fn proxy_base(&self) -> &str {
        self.proxy_base.as_deref().unwrap_or(DEFAULT_PROXY_BASE)
    }

    pub fn log_filter(&self) -> &str {
        self.log_filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER)
    }

    /// Change one key by its command-line name. `None` or a blank value
    /// restores the default.
    pub fn set_value(&mut self, key: &str, value: Option<&str>) -> Result<(), ConfigError> {
        let value = value.map(str::trim).filter(|value| !value.is_empty());
        match key {
            "data-dir" => self.data_dir = value.map(PathBuf::from),
            "storage-quota" => {
                self.storage_quota_bytes = value
                    .map(|raw| {
                        raw.parse::<u64>()
                            .ok()
                            .filter(|bytes| *bytes > 0)
                            .ok_or_else(|| ConfigError::InvalidValue {
                                key: key.to_string(),
                                value: raw.to_string(),
                            })
                    })
                    .transpose()?
            }
            "served-from" => self.served_from = value.map(str::to_string),
            "proxy-base" => self.proxy_base = value.map(str::to_string),
            "log-filter" => self.log_filter = value.map(str::to_string),
            _ => {
                return Err(ConfigError::UnknownKey {
                    key: key.to_string(),
                })
            }
        }
        Ok(())
    }

    pub fn summary_lines(&self) -> Vec<String> {
        let or_unset = |value: Option<&str>| value.unwrap_or("(unset)").to_string();
        vec![
            format!(
                "data-dir: {}",
                self.data_dir
                    .as_ref()
                    .map(path_display)
                    .unwrap_or_else(|| "(platform default)".to_string())
            ),
            format!("storage-quota: {} bytes", self.storage_quota()),
            format!("served-from: {}", or_unset(self.served_from.as_deref())),
            format!("proxy-base: {}", self.proxy_base()),
            format!("log-filter: {}", self.log_filter()),
        ]
    }

    pub fn print_all(&self) {
        println!("Current settings:");
        for line in self.summary_lines() {
            println!("  {line}");
        }
    }
}

/// Keys accepted by [`Settings::set_value`].
pub const SETTING_KEYS: &[&str] = &[
    "data-dir",
    "storage-quota",
    "served-from",
    "proxy-base",
    "log-filter",
];

/// User preferences persisted under the `config` key. Missing fields take
/// their defaults so older records keep loading.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Composite `providerId::modelId` of the selected model.
    pub model: String,
    pub temperature: f32,
    pub system_prompt: String,
    pub active_profile_id: Option<String>,
    /// Per-model output ceilings set by the user, keyed by bare model id.
    pub user_model_max_overrides: BTreeMap<String, u32>,
    pub thinking_enabled: bool,
    pub thinking_intensity: u8,
    pub thinking_budget: u32,
    pub session_duration_minutes: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: String::new(),
            temperature: default_temperature(),
            system_prompt: String::new(),
            active_profile_id: None,
            user_model_max_overrides: BTreeMap::new(),
            thinking_enabled: false,
            thinking_intensity: default_thinking_intensity(),
            thinking_budget: default_thinking_budget(),
            session_duration_minutes: default_session_minutes(),
        }
    }
}

impl Config {
    pub fn thinking_intensity(&self) -> ThinkingIntensity {
        ThinkingIntensity::from_level(self.thinking_intensity)
    }
}

/// Get a user-friendly display string for a path
/// Converts absolute paths to use ~ notation on Unix-like systems when possible
///
/// # Examples
/// - Unix: `/home/user/.config/kiconnect/settings.toml` → `~/.config/kiconnect/settings.toml`
/// - Windows: paths are shown unchanged
pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}
