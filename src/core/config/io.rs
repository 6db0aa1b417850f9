use crate::core::config::data::{path_display, Settings, SETTING_KEYS};
use directories::ProjectDirs;
use std::error::Error as StdError;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

const SETTINGS_FILE: &str = "settings.toml";

/// Errors that can occur when loading or editing settings.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the settings file from disk.
    Read {
        /// Path to the settings file that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the settings file as valid TOML.
    Parse {
        /// Path to the settings file with invalid TOML.
        path: PathBuf,
        /// The TOML deserialization error.
        source: toml::de::Error,
    },

    /// The platform has no usable home or config directory.
    NoConfigDir,

    /// `set`/`unset` named a key that does not exist.
    UnknownKey { key: String },

    /// The value given for a key could not be parsed.
    InvalidValue { key: String, value: String },
}

impl ConfigError {
    fn display_path(path: &Path) -> String {
        path_display(path)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(
                    f,
                    "Failed to read settings at {}: {}",
                    Self::display_path(path),
                    source
                )
            }
            ConfigError::Parse { path, source } => {
                write!(
                    f,
                    "Failed to parse settings at {}: {}",
                    Self::display_path(path),
                    source
                )
            }
            ConfigError::NoConfigDir => write!(f, "Could not determine the configuration directory"),
            ConfigError::UnknownKey { key } => write!(
                f,
                "Unknown settings key '{key}'. Known keys: {}",
                SETTING_KEYS.join(", ")
            ),
            ConfigError::InvalidValue { key, value } => {
                write!(f, "Invalid value '{value}' for {key}")
            }
        }
    }
}

impl StdError for ConfigError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::NoConfigDir
            | ConfigError::UnknownKey { .. }
            | ConfigError::InvalidValue { .. } => None,
        }
    }
}

fn project_dirs() -> Result<ProjectDirs, ConfigError> {
    ProjectDirs::from("nrw", "kiconnect", "kiconnect").ok_or(ConfigError::NoConfigDir)
}

impl Settings {
    pub fn load_from_path(settings_path: &Path) -> Result<Settings, ConfigError> {
        if !settings_path.exists() {
            return Ok(Settings::default());
        }
        let contents = fs::read_to_string(settings_path).map_err(|source| ConfigError::Read {
            path: settings_path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: settings_path.to_path_buf(),
            source,
        })
    }

    pub fn save_to_path(&self, settings_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let parent = settings_path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty());

        if let Some(dir) = parent {
            fs::create_dir_all(dir)?;
        }

        let contents = toml::to_string_pretty(self)?;
        let mut temp_file = match parent {
            Some(dir) => NamedTempFile::new_in(dir)?,
            None => NamedTempFile::new()?,
        };

        temp_file.write_all(contents.as_bytes())?;
        temp_file.as_file_mut().sync_all()?;
        temp_file
            .persist(settings_path)
            .map_err(|err| -> Box<dyn std::error::Error> { Box::new(err) })?;
        Ok(())
    }

    pub fn default_path() -> Result<PathBuf, ConfigError> {
        Ok(project_dirs()?.config_dir().join(SETTINGS_FILE))
    }

    /// Directory for persisted entities: the configured one, or the platform
    /// data directory.
    pub fn resolve_data_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(project_dirs()?.data_dir().to_path_buf()),
        }
    }
}
