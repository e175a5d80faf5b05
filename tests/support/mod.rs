#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use pawpost::client::services::remote_api::RemoteApi;
use pawpost::common::error::{InboxError, Result};
use pawpost::common::models::{
    from_millis, validate_text, MessagePayload, ThreadSummary, UserProfile, MAX_MESSAGE_CHARS,
};
use pawpost::common::threads::{aggregate_threads, MessageRecord};

/// In-process message store with the same observable behavior as the server.
#[derive(Default)]
pub struct FakeRemote {
    state: Mutex<State>,
    fail_next: AtomicBool,
}

#[derive(Default)]
struct State {
    users: HashMap<String, UserProfile>,
    tokens: HashMap<String, String>,
    /// Oldest first.
    log: Vec<MessageRecord>,
    clock: i64,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `profile` and return its token.
    pub fn add_user(&self, profile: UserProfile) -> String {
        let mut state = self.state.lock().unwrap();
        let token = format!("tok-{}", profile.id);
        state.tokens.insert(token.clone(), profile.id.clone());
        state.users.insert(profile.id.clone(), profile);
        token
    }

    /// The next call fails with a transport error.
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn message_count(&self) -> usize {
        self.state.lock().unwrap().log.len()
    }

    fn check(&self, token: &str) -> Result<String> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(InboxError::Transport("connection reset".into()));
        }
        self.state
            .lock()
            .unwrap()
            .tokens
            .get(token)
            .cloned()
            .ok_or_else(|| InboxError::Unauthorized("Invalid or expired session".into()))
    }
}

#[async_trait]
impl RemoteApi for FakeRemote {
    async fn fetch_threads(&self, token: &str) -> Result<Vec<ThreadSummary>> {
        let user = self.check(token)?;
        let state = self.state.lock().unwrap();
        let newest_first: Vec<MessageRecord> = state.log.iter().rev().cloned().collect();
        Ok(aggregate_threads(&user, &newest_first))
    }

    async fn fetch_history(&self, token: &str, counterpart_id: &str) -> Result<Vec<MessagePayload>> {
        let user = self.check(token)?;
        let mut state = self.state.lock().unwrap();
        let mut out = Vec::new();
        for record in state.log.iter_mut() {
            let pair = (record.sender.id == user && record.receiver.id == counterpart_id)
                || (record.sender.id == counterpart_id && record.receiver.id == user);
            if !pair {
                continue;
            }
            out.push(MessagePayload {
                id: record.id.clone(),
                text: record.text.clone(),
                timestamp: record.created_at,
                author_id: record.sender.id.clone(),
                read: Some(record.read),
                receiver_id: None,
            });
            if record.receiver.id == user {
                record.read = true;
            }
        }
        Ok(out)
    }

    async fn send_message(&self, token: &str, counterpart_id: &str, text: &str) -> Result<MessagePayload> {
        let user = self.check(token)?;
        let text = validate_text(text, MAX_MESSAGE_CHARS).map_err(InboxError::Remote)?;
        let mut state = self.state.lock().unwrap();
        let receiver = state
            .users
            .get(counterpart_id)
            .cloned()
            .ok_or_else(|| InboxError::Remote("User not found".into()))?;
        let sender = state.users.get(&user).cloned().unwrap_or_default();
        state.clock += 1_000;
        let record = MessageRecord {
            id: format!("m{}", state.log.len() + 1),
            text,
            created_at: from_millis(1_700_000_000_000 + state.clock),
            sender,
            receiver,
            read: false,
        };
        state.log.push(record.clone());
        Ok(MessagePayload {
            id: record.id,
            text: record.text,
            timestamp: record.created_at,
            author_id: user,
            read: None,
            receiver_id: Some(counterpart_id.to_string()),
        })
    }

    async fn whoami(&self, token: &str) -> Result<UserProfile> {
        let user = self.check(token)?;
        let state = self.state.lock().unwrap();
        state
            .users
            .get(&user)
            .cloned()
            .ok_or_else(|| InboxError::Remote("User not found".into()))
    }
}
