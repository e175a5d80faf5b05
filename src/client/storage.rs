//! Client-held key-value storage backing the offline mirrors.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::common::error::{InboxError, Result};

/// Whole-blob string storage. Every write replaces the value for its key;
/// there is no partial update and no locking across writers.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// One file per key under a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Bytes outside `[A-Za-z0-9-]` become `_xx` (hex), so distinct keys
    /// never share a file and no key can leave `dir`.
    fn path_for(&self, key: &str) -> PathBuf {
        let mut name = String::with_capacity(key.len() + 5);
        for byte in key.bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'-' {
                name.push(byte as char);
            } else {
                name.push_str(&format!("_{:02x}", byte));
            }
        }
        name.push_str(".json");
        self.dir.join(name)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        match std::fs::read_to_string(&path) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(InboxError::Storage(format!("read {}: {}", path.display(), e))),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| InboxError::Storage(format!("create {}: {}", self.dir.display(), e)))?;
        let path = self.path_for(key);
        // write-then-rename so a crash never leaves half a blob behind
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value).map_err(|e| InboxError::Storage(format!("write {}: {}", tmp.display(), e)))?;
        std::fs::rename(&tmp, &path).map_err(|e| InboxError::Storage(format!("rename {}: {}", path.display(), e)))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(InboxError::Storage(format!("remove {}: {}", path.display(), e))),
        }
    }
}

/// Process-local storage.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| InboxError::Storage("memory store poisoned".to_string()))
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for std::sync::Arc<S> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_store_round_trips_and_removes() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("mirror"));
        assert_eq!(store.get("pawpost_inbox_1").unwrap(), None);
        store.set("pawpost_inbox_1", "{\"a\":1}").unwrap();
        assert_eq!(store.get("pawpost_inbox_1").unwrap().as_deref(), Some("{\"a\":1}"));
        store.set("pawpost_inbox_1", "{}").unwrap();
        assert_eq!(store.get("pawpost_inbox_1").unwrap().as_deref(), Some("{}"));
        store.remove("pawpost_inbox_1").unwrap();
        store.remove("pawpost_inbox_1").unwrap();
        assert_eq!(store.get("pawpost_inbox_1").unwrap(), None);
    }

    #[test]
    fn file_store_keys_cannot_escape_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        store.set("../../etc/x", "v").unwrap();
        assert!(dir.path().join("_2e_2e_2f_2e_2e_2fetc_2fx.json").exists());
    }

    #[test]
    fn file_store_keeps_similar_keys_apart() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        store.set("pawpost_inbox_sam.k", "dot").unwrap();
        store.set("pawpost_inbox_sam_k", "underscore").unwrap();
        store.set("pawpost_inbox_sam_2ek", "literal").unwrap();
        assert_eq!(store.get("pawpost_inbox_sam.k").unwrap().as_deref(), Some("dot"));
        assert_eq!(store.get("pawpost_inbox_sam_k").unwrap().as_deref(), Some("underscore"));
        assert_eq!(store.get("pawpost_inbox_sam_2ek").unwrap().as_deref(), Some("literal"));
    }

    #[test]
    fn memory_store_is_shared_through_arc() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let other = store.clone();
        store.set("k", "v").unwrap();
        assert_eq!(other.get("k").unwrap().as_deref(), Some("v"));
    }
}
