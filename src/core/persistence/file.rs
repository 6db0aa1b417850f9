use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use super::{validate_key, Storage, StorageError};

const ENTRY_EXTENSION: &str = "json";

/// One file per key inside a data directory. Writes go through a temporary
/// file that is synced and renamed over the target, so an interrupted or
/// rejected write leaves the previous value intact.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
    quota: Option<u64>,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            quota: None,
        }
    }

    pub fn with_quota(dir: impl Into<PathBuf>, quota: u64) -> Self {
        Self {
            dir: dir.into(),
            quota: Some(quota),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.{ENTRY_EXTENSION}"))
    }

    fn entry_len(path: &Path) -> u64 {
        fs::metadata(path).map(|meta| meta.len()).unwrap_or(0)
    }

    fn used_bytes(&self) -> Result<u64, std::io::Error> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(err),
        };
        let mut total = 0;
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) == Some(ENTRY_EXTENSION) {
                total += Self::entry_len(&path);
            }
        }
        Ok(total)
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        validate_key(key)?;
        match fs::read_to_string(self.entry_path(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        validate_key(key)?;
        let io_err = |source| StorageError::Io {
            key: key.to_string(),
            source,
        };
        let path = self.entry_path(key);

        if let Some(quota) = self.quota {
            let used = self.used_bytes().map_err(io_err)?;
            let available = quota.saturating_sub(used - Self::entry_len(&path).min(used));
            let needed = value.len() as u64;
            if needed > available {
                return Err(StorageError::QuotaExceeded {
                    key: key.to_string(),
                    needed,
                    available,
                });
            }
        }

        fs::create_dir_all(&self.dir).map_err(io_err)?;
        let mut temp_file = NamedTempFile::new_in(&self.dir).map_err(io_err)?;
        temp_file.write_all(value.as_bytes()).map_err(io_err)?;
        temp_file.as_file_mut().sync_all().map_err(io_err)?;
        temp_file
            .persist(&path)
            .map_err(|err| io_err(err.error))?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        validate_key(key)?;
        match fs::remove_file(self.entry_path(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn clear(&mut self) -> Result<(), StorageError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
            Err(source) => {
                return Err(StorageError::Io {
                    key: "*".to_string(),
                    source,
                })
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) == Some(ENTRY_EXTENSION) {
                fs::remove_file(&path).map_err(|source| StorageError::Io {
                    key: path.display().to_string(),
                    source,
                })?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn values_round_trip_through_files() {
        let temp_dir = TempDir::new().expect("tempdir");
        let mut storage = FileStorage::new(temp_dir.path().join("data"));

        assert_eq!(storage.get("config").unwrap(), None);
        storage.set("config", r#"{"model":"x"}"#).expect("write");
        assert_eq!(
            storage.get("config").unwrap().as_deref(),
            Some(r#"{"model":"x"}"#)
        );
        assert!(temp_dir.path().join("data/config.json").exists());

        storage.remove("config").expect("remove");
        assert_eq!(storage.get("config").unwrap(), None);
    }

    #[test]
    fn quota_rejection_keeps_previous_value() {
        let temp_dir = TempDir::new().expect("tempdir");
        let mut storage = FileStorage::with_quota(temp_dir.path(), 16);

        storage.set("chats", "[1,2,3]").expect("fits");
        let err = storage
            .set("chats", "[1,2,3,4,5,6,7,8,9]")
            .expect_err("too large");
        assert!(err.is_quota_exceeded());
        assert_eq!(storage.get("chats").unwrap().as_deref(), Some("[1,2,3]"));
    }

    #[test]
    fn clear_only_removes_entries() {
        let temp_dir = TempDir::new().expect("tempdir");
        std::fs::write(temp_dir.path().join("settings.toml"), "x = 1").expect("seed file");
        let mut storage = FileStorage::new(temp_dir.path());
        storage.set("folders", "[]").expect("write");

        storage.clear().expect("clear");
        assert_eq!(storage.get("folders").unwrap(), None);
        assert!(temp_dir.path().join("settings.toml").exists());
    }
}
