use std::path::PathBuf;

use keyring::Entry;

use crate::client::storage::FileStore;
use crate::client::storage::KeyValueStore;
use crate::common::error::{InboxError, Result};

const SERVICE: &str = "pawpost";
const USER: &str = "pawpost_session";
const FALLBACK_KEY: &str = "session_token";

/// Where the client keeps its session credential between runs.
///
/// The OS keyring is tried first. A plain file is only used when the fallback
/// was explicitly enabled (`KEYRING_FALLBACK=true`).
pub struct SessionStore {
    keyring: bool,
    fallback: Option<FileStore>,
}

impl SessionStore {
    pub fn new(fallback_dir: Option<PathBuf>) -> Self {
        Self { keyring: true, fallback: fallback_dir.map(FileStore::new) }
    }

    /// Keeps the token in `dir` only, never touching the keyring.
    pub fn file_only(dir: impl Into<PathBuf>) -> Self {
        Self { keyring: false, fallback: Some(FileStore::new(dir)) }
    }

    pub fn from_config(config: &crate::server::config::ClientConfig) -> Self {
        let dir = config.keyring_fallback.then(|| PathBuf::from("data"));
        Self::new(dir)
    }

    fn entry(&self) -> Option<Entry> {
        self.keyring.then(|| Entry::new(SERVICE, USER))
    }

    pub fn save(&self, token: &str) -> Result<()> {
        let keyring_error = match self.entry() {
            Some(entry) => match entry.set_password(token) {
                Ok(()) => return Ok(()),
                Err(e) => e.to_string(),
            },
            None => "keyring disabled".to_string(),
        };
        match &self.fallback {
            Some(store) => {
                store.set(FALLBACK_KEY, token)?;
                // never log the token itself
                log::warn!("[SESSION_STORE] Keyring unavailable ({}), persisted token to fallback file", keyring_error);
                Ok(())
            }
            None => Err(InboxError::Storage(format!(
                "keyring unavailable and file fallback disabled: {}",
                keyring_error
            ))),
        }
    }

    pub fn load(&self) -> Option<String> {
        if let Some(entry) = self.entry() {
            if let Ok(t) = entry.get_password() {
                if !t.trim().is_empty() {
                    return Some(t);
                }
            }
        }
        self.fallback
            .as_ref()
            .and_then(|store| store.get(FALLBACK_KEY).ok().flatten())
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
    }

    pub fn clear(&self) -> Result<()> {
        if let Some(entry) = self.entry() {
            if let Err(e) = entry.delete_password() {
                log::debug!("[SESSION_STORE] nothing removed from keyring: {}", e);
            }
        }
        if let Some(store) = &self.fallback {
            store.remove(FALLBACK_KEY)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_fallback_round_trips_and_clears() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = SessionStore::file_only(dir.path());
        assert_eq!(sessions.load(), None);

        sessions.save("tok-123").unwrap();
        assert_eq!(sessions.load().as_deref(), Some("tok-123"));
        // a second store over the same directory sees the token
        assert_eq!(SessionStore::file_only(dir.path()).load().as_deref(), Some("tok-123"));

        sessions.clear().unwrap();
        assert_eq!(sessions.load(), None);
        sessions.clear().unwrap();
    }

    #[test]
    fn blank_fallback_token_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        FileStore::new(dir.path()).set(FALLBACK_KEY, "  \n").unwrap();
        assert_eq!(SessionStore::file_only(dir.path()).load(), None);
    }

    #[test]
    fn fallback_token_is_trimmed() {
        let dir = tempfile::tempdir().unwrap();
        FileStore::new(dir.path()).set(FALLBACK_KEY, "tok-9\n").unwrap();
        assert_eq!(SessionStore::file_only(dir.path()).load().as_deref(), Some("tok-9"));
    }

    #[test]
    fn unusable_fallback_dir_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocked = dir.path().join("blocked");
        std::fs::write(&blocked, "not a directory").unwrap();
        let sessions = SessionStore::file_only(&blocked);
        assert!(matches!(sessions.save("tok"), Err(InboxError::Storage(_))));
        assert!(sessions.clear().is_err());
        assert_eq!(sessions.load(), None);
    }
}
