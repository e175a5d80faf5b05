use async_trait::async_trait;

use crate::client::inbox::session::Session;
use crate::client::inbox::thread::Thread;
use crate::common::error::Result;
use crate::common::models::{Message, UserProfile};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboxMode {
    /// Threads come from the remote message store.
    Synced,
    /// Threads live in per-user mirrors in client-held storage.
    Offline,
}

/// Where threads come from. Exactly one implementation is live per inbox.
#[async_trait]
pub trait ThreadSource: Send {
    fn mode(&self) -> InboxMode;

    /// Rebuild the thread list from source data. On failure the previous
    /// list is kept.
    async fn refresh(&mut self, session: &Session) -> Result<()>;

    fn threads(&self) -> &[Thread];

    fn thread(&self, counterpart_id: &str) -> Option<&Thread> {
        self.threads().iter().find(|t| t.id() == counterpart_id)
    }

    /// Create the thread on first contact, or refresh its counterpart snapshot.
    fn ensure_thread(&mut self, session: &Session, counterpart: &UserProfile);

    /// Fetch full history for a thread if it has not been fetched yet.
    async fn load_history(&mut self, session: &Session, counterpart_id: &str) -> Result<()>;

    async fn mark_read(&mut self, session: &Session, counterpart_id: &str) -> Result<()>;

    /// Send `text` and append the result to the thread. The returned message
    /// is the last entry of the thread when this resolves.
    async fn send(&mut self, session: &Session, counterpart: &UserProfile, text: &str) -> Result<Message>;

    /// Forget everything held in memory.
    fn reset(&mut self);
}
