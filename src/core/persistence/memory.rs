use std::collections::BTreeMap;

use super::{validate_key, Storage, StorageError};

/// In-process storage. Capacity is counted as the sum of key and value
/// lengths, the same way browser storage meters its quota.
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    entries: BTreeMap<String, String>,
    quota: Option<u64>,
    rejected_writes: usize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota: u64) -> Self {
        Self {
            quota: Some(quota),
            ..Self::default()
        }
    }

    pub fn used_bytes(&self) -> u64 {
        self.entries
            .iter()
            .map(|(key, value)| (key.len() + value.len()) as u64)
            .sum()
    }

    /// Number of writes refused for lack of space since creation.
    pub fn rejected_writes(&self) -> usize {
        self.rejected_writes
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        validate_key(key)?;
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        validate_key(key)?;
        if let Some(quota) = self.quota {
            let existing = self
                .entries
                .get(key)
                .map(|old| (key.len() + old.len()) as u64)
                .unwrap_or(0);
            let available = quota.saturating_sub(self.used_bytes() - existing);
            let needed = (key.len() + value.len()) as u64;
            if needed > available {
                self.rejected_writes += 1;
                return Err(StorageError::QuotaExceeded {
                    key: key.to_string(),
                    needed,
                    available,
                });
            }
        }
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        validate_key(key)?;
        self.entries.remove(key);
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StorageError> {
        self.entries.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_counts_replacement_not_addition() {
        let mut storage = MemoryStorage::with_quota(20);
        storage.set("k", "0123456789").expect("fits");
        // Replacing the value frees the old bytes first.
        storage.set("k", "0123456789abcdef").expect("replacement fits");
        let err = storage.set("other", "0123456789").expect_err("over quota");
        assert!(err.is_quota_exceeded());
        assert_eq!(storage.rejected_writes(), 1);
        assert_eq!(storage.get("k").unwrap().as_deref(), Some("0123456789abcdef"));
    }

    #[test]
    fn rejects_path_like_keys() {
        let mut storage = MemoryStorage::new();
        assert!(matches!(
            storage.set("../escape", "x"),
            Err(StorageError::InvalidKey(_))
        ));
    }
}
