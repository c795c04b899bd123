//! Local key-value store
//!
//! Flat string map persisted as a JSON object, the native counterpart of
//! the browser's `localStorage`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use super::error::TokenStoreResult;
use super::{read_json_file, write_json_file, KeyValueStore};

/// String key/value store, optionally backed by a file
#[derive(Debug, Default)]
pub struct LocalStore {
    entries: RwLock<BTreeMap<String, String>>,
    path: Option<PathBuf>,
}

impl LocalStore {
    /// Store that lives only as long as the process
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open a file-backed store, starting empty if the file does not exist yet
    pub fn open(path: impl AsRef<Path>) -> TokenStoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = read_json_file(&path)?.unwrap_or_default();

        Ok(Self {
            entries: RwLock::new(entries),
            path: Some(path),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> TokenStoreResult<()> {
        match &self.path {
            Some(path) => write_json_file(path, entries),
            None => Ok(()),
        }
    }
}

impl KeyValueStore for LocalStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) -> TokenStoreResult<()> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        self.flush(&entries)
    }

    fn remove(&self, key: &str) -> TokenStoreResult<()> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.remove(key).is_some() {
            self.flush(&entries)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_in_memory_set_get_remove() {
        let store = LocalStore::in_memory();
        assert!(store.get("access_token").is_none());

        store.set("access_token", "abc").unwrap();
        assert_eq!(store.get("access_token").as_deref(), Some("abc"));

        store.remove("access_token").unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("local_storage.json");

        {
            let store = LocalStore::open(&path).unwrap();
            store.set("refresh_token", "r-1").unwrap();
        }

        let reopened = LocalStore::open(&path).unwrap();
        assert_eq!(reopened.get("refresh_token").as_deref(), Some("r-1"));
        assert_eq!(reopened.path(), Some(path.as_path()));
    }

    #[test]
    fn test_corrupt_file_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("local_storage.json");
        std::fs::write(&path, "not json").unwrap();

        let err = LocalStore::open(&path).unwrap_err();
        assert!(matches!(err, super::super::TokenStoreError::Serialization(_)));
    }
}
