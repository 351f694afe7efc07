//! Secure key-value storage for credentials and the pending-payment marker.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::errors::{ClientError, Result};

/// Storage keys
pub mod keys {
    pub const ACCESS_TOKEN: &str = "accessToken";
    pub const REFRESH_TOKEN: &str = "refreshToken";
    pub const ROLE: &str = "role";
    pub const PENDING_PAYMENT: &str = "pendingPayment";
}

/// Point read/write store. Implementations back onto whatever the platform
/// offers as app-local secure storage.
///
/// `set_many` and `remove_many` must apply all entries or none; the session
/// relies on this to swap a credential pair in one step.
pub trait SecureStore: Send + Sync {
    /// Get a value by key
    fn get(&self, key: &str) -> Option<String>;

    /// Set a value by key
    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.set_many(&[(key, value)])
    }

    /// Set several values at once
    fn set_many(&self, entries: &[(&str, &str)]) -> Result<()>;

    /// Remove a value by key
    fn remove(&self, key: &str) -> Result<()> {
        self.remove_many(&[key])
    }

    /// Remove several values at once
    fn remove_many(&self, keys: &[&str]) -> Result<()>;
}

fn poisoned<T>(_: T) -> ClientError {
    ClientError::Storage("store lock poisoned".to_string())
}

/// In-memory store. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecureStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.data.read().ok()?.get(key).cloned()
    }

    fn set_many(&self, entries: &[(&str, &str)]) -> Result<()> {
        let mut data = self.data.write().map_err(poisoned)?;
        for (key, value) in entries {
            data.insert(key.to_string(), value.to_string());
        }
        Ok(())
    }

    fn remove_many(&self, keys: &[&str]) -> Result<()> {
        let mut data = self.data.write().map_err(poisoned)?;
        for key in keys {
            data.remove(*key);
        }
        Ok(())
    }
}

/// File-backed store.
///
/// Keeps everything in `{dir}/paynotice.json`. Every write replaces the file
/// through a temporary sibling and a rename, so a crash mid-write leaves the
/// previous contents intact.
pub struct FileStore {
    path: PathBuf,
    cache: RwLock<HashMap<String, String>>,
}

impl FileStore {
    /// Open the store in `dir`, which must already exist.
    pub fn open(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(ClientError::Storage(format!(
                "{} is not a directory",
                dir.display()
            )));
        }

        let path = dir.join("paynotice.json");
        let cache = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ClientError::Storage(e.to_string()))?;
            serde_json::from_str(&contents).map_err(|e| ClientError::Storage(e.to_string()))?
        } else {
            HashMap::new()
        };

        Ok(Self {
            path,
            cache: RwLock::new(cache),
        })
    }

    fn flush(&self, data: &HashMap<String, String>) -> Result<()> {
        let contents =
            serde_json::to_string_pretty(data).map_err(|e| ClientError::Storage(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, contents).map_err(|e| ClientError::Storage(e.to_string()))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| ClientError::Storage(e.to_string()))
    }

    fn apply(&self, change: impl FnOnce(&mut HashMap<String, String>)) -> Result<()> {
        let mut cache = self.cache.write().map_err(poisoned)?;
        let mut next = cache.clone();
        change(&mut next);
        self.flush(&next)?;
        *cache = next;
        Ok(())
    }
}

impl SecureStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.cache.read().ok()?.get(key).cloned()
    }

    fn set_many(&self, entries: &[(&str, &str)]) -> Result<()> {
        self.apply(|data| {
            for (key, value) in entries {
                data.insert(key.to_string(), value.to_string());
            }
        })
    }

    fn remove_many(&self, keys: &[&str]) -> Result<()> {
        self.apply(|data| {
            for key in keys {
                data.remove(*key);
            }
        })
    }
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore").field("path", &self.path).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_set_many_and_remove_many() {
        let store = MemoryStore::new();
        store
            .set_many(&[(keys::ACCESS_TOKEN, "a1"), (keys::REFRESH_TOKEN, "r1")])
            .unwrap();
        assert_eq!(store.get(keys::ACCESS_TOKEN).as_deref(), Some("a1"));
        assert_eq!(store.get(keys::REFRESH_TOKEN).as_deref(), Some("r1"));

        store
            .remove_many(&[keys::ACCESS_TOKEN, keys::REFRESH_TOKEN])
            .unwrap();
        assert!(store.get(keys::ACCESS_TOKEN).is_none());
        assert!(store.get(keys::REFRESH_TOKEN).is_none());
    }

    #[test]
    fn file_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileStore::open(dir.path()).unwrap();
            store.set(keys::ACCESS_TOKEN, "a1").unwrap();
            store.set(keys::PENDING_PAYMENT, "{}").unwrap();
            store.remove(keys::PENDING_PAYMENT).unwrap();
        }

        let reopened = FileStore::open(dir.path()).unwrap();
        assert_eq!(reopened.get(keys::ACCESS_TOKEN).as_deref(), Some("a1"));
        assert!(reopened.get(keys::PENDING_PAYMENT).is_none());
    }

    #[test]
    fn file_store_rejects_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            FileStore::open(&missing),
            Err(ClientError::Storage(_))
        ));
    }
}
