//! Offline mode: every user owns a mirror blob holding all of their threads.
//!
//! Sending writes the outgoing copy into the sender's mirror and an incoming
//! copy into the recipient's. The two writes are independent; a failed
//! recipient write is logged and reported through [`MirrorDelivery`] but the
//! send still succeeds. Two writers on the same mirror race, last write wins.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::client::inbox::session::Session;
use crate::client::inbox::source::{InboxMode, ThreadSource};
use crate::client::inbox::thread::Thread;
use crate::client::storage::KeyValueStore;
use crate::common::error::{InboxError, Result};
use crate::common::models::{
    now_millis, validate_text, Direction, LastMessage, Message, UserProfile, MAX_MESSAGE_CHARS,
};

pub const MIRROR_KEY_PREFIX: &str = "pawpost_inbox_";

pub fn mirror_key(user_id: &str) -> String {
    format!("{}{}", MIRROR_KEY_PREFIX, user_id)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mirror {
    pub owner_id: String,
    #[serde(default)]
    pub threads: Vec<MirrorThread>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorThread {
    pub counterpart: UserProfile,
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl Mirror {
    pub fn empty(owner_id: &str) -> Self {
        Self { owner_id: owner_id.to_string(), threads: Vec::new() }
    }

    pub fn thread(&self, counterpart_id: &str) -> Option<&MirrorThread> {
        self.threads.iter().find(|t| t.counterpart.id == counterpart_id)
    }

    /// The thread with `counterpart`, created if missing. The stored snapshot
    /// is refreshed from `counterpart`.
    pub fn thread_mut(&mut self, counterpart: &UserProfile) -> &mut MirrorThread {
        let idx = match self.threads.iter().position(|t| t.counterpart.id == counterpart.id) {
            Some(idx) => {
                self.threads[idx].counterpart.refresh_from(counterpart);
                idx
            }
            None => {
                self.threads.push(MirrorThread { counterpart: counterpart.clone(), messages: Vec::new() });
                self.threads.len() - 1
            }
        };
        &mut self.threads[idx]
    }

    /// Repair a blob read from storage: wrong owner, invalid messages,
    /// duplicated counterparts and stale directions.
    fn sanitize(&mut self, owner_id: &str) {
        if self.owner_id != owner_id {
            if !self.owner_id.is_empty() {
                log::warn!("[MIRROR] blob for {} claims owner {}", owner_id, self.owner_id);
            }
            self.owner_id = owner_id.to_string();
        }

        let mut merged: Vec<MirrorThread> = Vec::with_capacity(self.threads.len());
        for mut thread in std::mem::take(&mut self.threads) {
            if thread.counterpart.id.trim().is_empty() {
                log::warn!("[MIRROR] dropping thread without counterpart id");
                continue;
            }
            let before = thread.messages.len();
            thread.messages.retain(|m| {
                !m.id.is_empty() && !m.author_id.is_empty() && validate_text(&m.text, MAX_MESSAGE_CHARS).is_ok()
            });
            if thread.messages.len() != before {
                log::warn!(
                    "[MIRROR] dropped {} invalid messages with {}",
                    before - thread.messages.len(),
                    thread.counterpart.id
                );
            }
            for message in &mut thread.messages {
                message.direction = Direction::for_author(&message.author_id, owner_id);
                if message.direction == Direction::Outgoing {
                    message.read = true;
                }
            }

            match merged.iter_mut().find(|t| t.counterpart.id == thread.counterpart.id) {
                Some(existing) => {
                    existing.counterpart.refresh_from(&thread.counterpart);
                    existing.messages.append(&mut thread.messages);
                    existing.messages.sort_by_key(|m| m.timestamp);
                    existing.messages.dedup_by(|a, b| a.id == b.id);
                }
                None => merged.push(thread),
            }
        }
        self.threads = merged;
    }

    /// Threads keep empty entries created on first contact that the stored
    /// copy does not know about yet.
    fn adopt_empty_threads(&mut self, previous: &Mirror) {
        for thread in previous.threads.iter().filter(|t| t.messages.is_empty()) {
            if self.thread(&thread.counterpart.id).is_none() {
                self.threads.push(thread.clone());
            }
        }
    }

    pub fn to_threads(&self) -> Vec<Thread> {
        self.threads
            .iter()
            .map(|t| {
                let mut thread = Thread::new(t.counterpart.clone());
                thread.messages = t.messages.clone();
                thread.last_message = t.messages.last().map(LastMessage::from);
                thread.unread = thread.count_unread();
                thread.messages_loaded = true;
                thread
            })
            .collect()
    }
}

/// Outcome of an offline send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorDelivery {
    pub message: Message,
    /// Whether the incoming copy reached the recipient's mirror.
    pub recipient_synced: bool,
}

/// Reads and writes whole mirrors in a [`KeyValueStore`].
pub struct MirrorStore<S> {
    store: S,
}

impl<S: KeyValueStore> MirrorStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// A blob that cannot be decoded is logged and read as empty.
    pub fn load(&self, owner_id: &str) -> Result<Mirror> {
        let Some(raw) = self.store.get(&mirror_key(owner_id))? else {
            return Ok(Mirror::empty(owner_id));
        };
        let mut mirror = match serde_json::from_str::<Mirror>(&raw) {
            Ok(mirror) => mirror,
            Err(e) => {
                log::warn!("[MIRROR] unreadable mirror for {}, starting empty: {}", owner_id, e);
                return Ok(Mirror::empty(owner_id));
            }
        };
        mirror.sanitize(owner_id);
        Ok(mirror)
    }

    pub fn save(&self, mirror: &Mirror) -> Result<()> {
        let raw = serde_json::to_string(mirror)?;
        self.store.set(&mirror_key(&mirror.owner_id), &raw)
    }

    /// Write the incoming copy of `message` into the recipient's mirror.
    pub fn deliver(&self, sender: &UserProfile, recipient_id: &str, message: &Message) -> Result<()> {
        let mut mirror = self.load(recipient_id)?;
        let thread = mirror.thread_mut(sender);
        if thread.messages.iter().any(|m| m.id == message.id) {
            return Ok(());
        }
        thread.messages.push(Message {
            read: false,
            direction: Direction::Incoming,
            ..message.clone()
        });
        self.save(&mirror)
    }
}

/// [`ThreadSource`] over per-user mirrors.
pub struct MirrorThreads<S> {
    mirrors: MirrorStore<S>,
    mirror: Mirror,
    threads: Vec<Thread>,
    last_delivery: Option<MirrorDelivery>,
}

impl<S: KeyValueStore> MirrorThreads<S> {
    pub fn new(store: S) -> Self {
        Self {
            mirrors: MirrorStore::new(store),
            mirror: Mirror::default(),
            threads: Vec::new(),
            last_delivery: None,
        }
    }

    pub fn mirrors(&self) -> &MirrorStore<S> {
        &self.mirrors
    }

    pub fn last_delivery(&self) -> Option<&MirrorDelivery> {
        self.last_delivery.as_ref()
    }

    fn rebuild(&mut self) {
        self.threads = self.mirror.to_threads();
    }

    /// Replace the in-memory copy with the stored one, keeping threads opened
    /// on first contact.
    fn reload(&mut self, owner_id: &str) -> Result<()> {
        let mut fresh = self.mirrors.load(owner_id)?;
        if self.mirror.owner_id == owner_id {
            fresh.adopt_empty_threads(&self.mirror);
        }
        self.mirror = fresh;
        self.rebuild();
        Ok(())
    }

    /// Read-modify-write of the owner's mirror. `self` only changes when the
    /// write succeeds.
    fn update<T>(&mut self, owner_id: &str, change: impl FnOnce(&mut Mirror) -> T) -> Result<T> {
        let mut fresh = self.mirrors.load(owner_id)?;
        if self.mirror.owner_id == owner_id {
            fresh.adopt_empty_threads(&self.mirror);
        }
        let out = change(&mut fresh);
        self.mirrors.save(&fresh)?;
        self.mirror = fresh;
        self.rebuild();
        Ok(out)
    }
}

#[async_trait]
impl<S: KeyValueStore> ThreadSource for MirrorThreads<S> {
    fn mode(&self) -> InboxMode {
        InboxMode::Offline
    }

    async fn refresh(&mut self, session: &Session) -> Result<()> {
        self.mirror = self.mirrors.load(session.user_id())?;
        self.rebuild();
        log::info!("[MIRROR] loaded {} threads for {}", self.threads.len(), session.user_id());
        Ok(())
    }

    fn threads(&self) -> &[Thread] {
        &self.threads
    }

    fn ensure_thread(&mut self, session: &Session, counterpart: &UserProfile) {
        if self.mirror.owner_id != session.user_id() {
            self.mirror = Mirror::empty(session.user_id());
        }
        self.mirror.thread_mut(counterpart);
        self.rebuild();
    }

    /// Another writer may have delivered into this mirror since the last
    /// refresh, so opening a thread re-reads the stored copy.
    async fn load_history(&mut self, session: &Session, counterpart_id: &str) -> Result<()> {
        self.reload(session.user_id())?;
        log::debug!("[MIRROR] reloaded mirror of {} to open {}", session.user_id(), counterpart_id);
        Ok(())
    }

    /// Decided on the stored copy, never on the in-memory one.
    async fn mark_read(&mut self, session: &Session, counterpart_id: &str) -> Result<()> {
        let changed = self.update(session.user_id(), |mirror| {
            let mut changed = 0;
            if let Some(thread) = mirror.threads.iter_mut().find(|t| t.counterpart.id == counterpart_id) {
                for message in thread.messages.iter_mut().filter(|m| m.is_unread_incoming()) {
                    message.read = true;
                    changed += 1;
                }
            }
            changed
        })?;
        log::debug!("[MIRROR] marked {} messages read with {}", changed, counterpart_id);
        Ok(())
    }

    async fn send(&mut self, session: &Session, counterpart: &UserProfile, text: &str) -> Result<Message> {
        let text = validate_text(text, MAX_MESSAGE_CHARS).map_err(InboxError::InvalidMessage)?;
        if counterpart.id.trim().is_empty() {
            return Err(InboxError::InvalidMessage("Invalid user id".to_string()));
        }
        if counterpart.id == session.user_id() {
            return Err(InboxError::InvalidMessage("Cannot message yourself".to_string()));
        }

        let author_id = session.user_id().to_string();
        let message = self.update(session.user_id(), |mirror| {
            let thread = mirror.thread_mut(counterpart);
            let last = thread.messages.iter().map(|m| m.timestamp).max().unwrap_or(0);
            let message = Message {
                id: Uuid::new_v4().to_string(),
                text,
                author_id,
                timestamp: now_millis().max(last + 1),
                read: true,
                direction: Direction::Outgoing,
            };
            thread.messages.push(message.clone());
            message
        })?;

        let recipient_synced = match self.mirrors.deliver(session.user(), &counterpart.id, &message) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("[MIRROR] copy of {} for {} not written: {}", message.id, counterpart.id, e);
                false
            }
        };
        log::info!("[MIRROR] sent {} to {} (recipient synced: {})", message.id, counterpart.id, recipient_synced);
        self.last_delivery = Some(MirrorDelivery { message: message.clone(), recipient_synced });
        Ok(message)
    }

    fn reset(&mut self) {
        self.mirror = Mirror::default();
        self.threads.clear();
        self.last_delivery = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::client::storage::MemoryStore;

    /// Refuses writes to one key.
    struct RejectKey {
        inner: MemoryStore,
        key: String,
    }

    impl KeyValueStore for RejectKey {
        fn get(&self, key: &str) -> Result<Option<String>> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<()> {
            if key == self.key {
                return Err(InboxError::Storage("quota exceeded".into()));
            }
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) -> Result<()> {
            self.inner.remove(key)
        }
    }

    fn alex() -> UserProfile {
        UserProfile::new("1", "Alex").with_city("Turin")
    }

    fn sam() -> UserProfile {
        UserProfile::new("2", "Sam").with_phone("555-0101")
    }

    fn session_of(user: UserProfile) -> Session {
        Session::new(user, None)
    }

    #[tokio::test]
    async fn send_writes_both_mirrors() {
        let store = Arc::new(MemoryStore::new());
        let mut a = MirrorThreads::new(store.clone());
        let alex_session = session_of(alex());
        a.refresh(&alex_session).await.unwrap();

        let sent = a.send(&alex_session, &sam(), "Is Luna still available?").await.unwrap();
        assert!(a.last_delivery().unwrap().recipient_synced);
        let own = a.thread("2").unwrap();
        assert_eq!(own.messages.last(), Some(&sent));
        assert_eq!(own.unread, 0);

        let mut b = MirrorThreads::new(store.clone());
        let sam_session = session_of(sam());
        b.refresh(&sam_session).await.unwrap();
        let theirs = b.thread("1").unwrap();
        assert_eq!(theirs.unread, 1);
        assert_eq!(theirs.counterpart.city, "Turin");
        let copy = theirs.messages.last().unwrap();
        assert_eq!(copy.id, sent.id);
        assert_eq!(copy.direction, Direction::Incoming);
        assert!(!copy.read);

        b.mark_read(&sam_session, "1").await.unwrap();
        assert_eq!(b.thread("1").unwrap().unread, 0);
        let stored = b.mirrors().load("2").unwrap();
        assert!(stored.thread("1").unwrap().messages.iter().all(|m| m.read));
    }

    #[tokio::test]
    async fn recipient_write_failure_is_swallowed() {
        let store = RejectKey { inner: MemoryStore::new(), key: mirror_key("2") };
        let mut a = MirrorThreads::new(store);
        let alex_session = session_of(alex());
        let sent = a.send(&alex_session, &sam(), "hello").await.unwrap();
        let delivery = a.last_delivery().unwrap();
        assert!(!delivery.recipient_synced);
        assert_eq!(delivery.message, sent);
        assert_eq!(a.mirrors().load("1").unwrap().thread("2").unwrap().messages.len(), 1);
        assert!(a.mirrors().store().get(&mirror_key("2")).unwrap().is_none());
    }

    #[tokio::test]
    async fn sender_write_failure_leaves_state_unchanged() {
        let store = RejectKey { inner: MemoryStore::new(), key: mirror_key("1") };
        let mut a = MirrorThreads::new(store);
        let alex_session = session_of(alex());
        let err = a.send(&alex_session, &sam(), "hello").await.unwrap_err();
        assert!(matches!(err, InboxError::Storage(_)));
        assert!(a.thread("2").is_none());
        assert!(a.last_delivery().is_none());
    }

    #[tokio::test]
    async fn timestamps_strictly_increase_within_a_thread() {
        let mut a = MirrorThreads::new(MemoryStore::new());
        let alex_session = session_of(alex());
        for i in 0..5 {
            a.send(&alex_session, &sam(), &format!("note {}", i)).await.unwrap();
        }
        let stamps: Vec<i64> = a.thread("2").unwrap().messages.iter().map(|m| m.timestamp).collect();
        assert!(stamps.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn corrupt_blob_reads_as_empty() {
        let store = MemoryStore::new();
        store.set(&mirror_key("1"), "{not json").unwrap();
        let mut a = MirrorThreads::new(store);
        a.refresh(&session_of(alex())).await.unwrap();
        assert!(a.threads().is_empty());
    }

    #[test]
    fn load_repairs_directions_and_duplicates() {
        let store = MemoryStore::new();
        let raw = r#"{"owner_id":"1","threads":[
            {"counterpart":{"id":"2","name":"Sam"},"messages":[
                {"id":"a","text":"hi","authorId":"2","timestamp":10,"read":false,"direction":"outgoing"},
                {"id":"b","text":"   ","authorId":"2","timestamp":11,"read":false,"direction":"incoming"}]},
            {"counterpart":{"id":"2","name":"Samantha"},"messages":[
                {"id":"c","text":"yo","authorId":"1","timestamp":5,"read":false,"direction":"incoming"}]}
        ]}"#;
        store.set(&mirror_key("1"), raw).unwrap();
        let mirror = MirrorStore::new(store).load("1").unwrap();
        assert_eq!(mirror.threads.len(), 1);
        let thread = &mirror.threads[0];
        assert_eq!(thread.counterpart.name, "Samantha");
        let ids: Vec<&str> = thread.messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a"]);
        assert_eq!(thread.messages[0].direction, Direction::Outgoing);
        assert!(thread.messages[0].read);
        assert_eq!(thread.messages[1].direction, Direction::Incoming);
    }

    #[tokio::test]
    async fn opening_sees_messages_delivered_after_refresh() {
        let store = Arc::new(MemoryStore::new());
        let sam_session = session_of(sam());
        let mut b = MirrorThreads::new(store.clone());
        b.refresh(&sam_session).await.unwrap();
        assert!(b.threads().is_empty());

        let mut a = MirrorThreads::new(store.clone());
        let sent = a.send(&session_of(alex()), &sam(), "hi").await.unwrap();

        b.ensure_thread(&sam_session, &alex());
        b.load_history(&sam_session, "1").await.unwrap();
        b.mark_read(&sam_session, "1").await.unwrap();
        let thread = b.thread("1").unwrap();
        assert_eq!(thread.messages.len(), 1);
        assert_eq!(thread.messages[0].id, sent.id);
        assert_eq!(thread.unread, 0);
        let stored = b.mirrors().load("2").unwrap();
        assert!(stored.thread("1").unwrap().messages.iter().all(|m| m.read));
    }

    #[tokio::test]
    async fn mark_read_uses_the_stored_copy() {
        let store = Arc::new(MemoryStore::new());
        let sam_session = session_of(sam());
        let mut b = MirrorThreads::new(store.clone());
        b.ensure_thread(&sam_session, &alex());
        assert_eq!(b.thread("1").unwrap().unread, 0);

        MirrorThreads::new(store.clone()).send(&session_of(alex()), &sam(), "hi").await.unwrap();
        b.mark_read(&sam_session, "1").await.unwrap();
        assert_eq!(b.thread("1").unwrap().messages.len(), 1);
        let stored = b.mirrors().load("2").unwrap();
        assert!(stored.thread("1").unwrap().messages.iter().all(|m| m.read));
    }

    #[tokio::test]
    async fn opened_threads_survive_unrelated_writes() {
        let store = Arc::new(MemoryStore::new());
        let mut a = MirrorThreads::new(store);
        let alex_session = session_of(alex());
        a.refresh(&alex_session).await.unwrap();
        a.ensure_thread(&alex_session, &UserProfile::new("3", "Kim"));
        a.send(&alex_session, &sam(), "hello").await.unwrap();
        assert!(a.thread("3").is_some());
        assert!(a.thread("3").unwrap().last_message.is_none());
    }
}
