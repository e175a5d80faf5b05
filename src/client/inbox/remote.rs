use std::sync::Arc;

use async_trait::async_trait;

use crate::client::inbox::session::Session;
use crate::client::inbox::source::{InboxMode, ThreadSource};
use crate::client::inbox::thread::Thread;
use crate::client::services::remote_api::RemoteApi;
use crate::common::error::{InboxError, Result};
use crate::common::models::{validate_text, Message, UserProfile, MAX_MESSAGE_CHARS};

/// Server mode: the thread list and histories come from the message store,
/// this only caches them for the session.
pub struct RemoteThreads {
    api: Arc<dyn RemoteApi>,
    threads: Vec<Thread>,
}

impl RemoteThreads {
    pub fn new(api: Arc<dyn RemoteApi>) -> Self {
        Self { api, threads: Vec::new() }
    }

    fn thread_mut(&mut self, counterpart_id: &str) -> Option<&mut Thread> {
        self.threads.iter_mut().find(|t| t.id() == counterpart_id)
    }
}

#[async_trait]
impl ThreadSource for RemoteThreads {
    fn mode(&self) -> InboxMode {
        InboxMode::Synced
    }

    async fn refresh(&mut self, session: &Session) -> Result<()> {
        let Some(token) = session.token() else {
            log::debug!("[INBOX] no credential, clearing thread list");
            self.threads.clear();
            return Ok(());
        };
        let summaries = self.api.fetch_threads(token).await?;

        let mut threads = Vec::with_capacity(summaries.len());
        for summary in &summaries {
            match Thread::from_summary(summary) {
                Ok(thread) if threads.iter().any(|t: &Thread| t.id() == thread.id()) => {
                    log::warn!("[INBOX] duplicate thread for {} in summary, skipped", thread.id());
                }
                Ok(thread) => threads.push(thread),
                Err(e) => log::warn!("[INBOX] dropping thread summary: {}", e),
            }
        }
        log::info!("[INBOX] loaded {} threads for {}", threads.len(), session.user_id());
        self.threads = threads;
        Ok(())
    }

    fn threads(&self) -> &[Thread] {
        &self.threads
    }

    fn ensure_thread(&mut self, _session: &Session, counterpart: &UserProfile) {
        match self.thread_mut(&counterpart.id) {
            Some(thread) => thread.counterpart.refresh_from(counterpart),
            None => self.threads.push(Thread::new(counterpart.clone())),
        }
    }

    async fn load_history(&mut self, session: &Session, counterpart_id: &str) -> Result<()> {
        match self.thread(counterpart_id) {
            Some(thread) if !thread.messages_loaded => {}
            _ => return Ok(()),
        }
        let token = session.require_token()?;
        let payloads = self.api.fetch_history(token, counterpart_id).await?;
        let messages = payloads
            .iter()
            .map(|p| Message::from_payload(p, session.user_id()))
            .collect::<Result<Vec<_>>>()?;

        // The thread may have been reset while the fetch was in flight.
        let Some(thread) = self.thread_mut(counterpart_id) else {
            log::debug!("[INBOX] thread {} gone before history arrived", counterpart_id);
            return Ok(());
        };
        thread.replace_history(messages);
        thread.unread = 0;
        Ok(())
    }

    async fn mark_read(&mut self, _session: &Session, counterpart_id: &str) -> Result<()> {
        // Fetching history already marked the messages read remotely.
        if let Some(thread) = self.thread_mut(counterpart_id) {
            thread.mark_all_read();
        }
        Ok(())
    }

    async fn send(&mut self, session: &Session, counterpart: &UserProfile, text: &str) -> Result<Message> {
        let token = session.require_token()?;
        let text = validate_text(text, MAX_MESSAGE_CHARS).map_err(InboxError::InvalidMessage)?;
        if counterpart.id.trim().is_empty() {
            return Err(InboxError::InvalidMessage("Invalid user id".to_string()));
        }

        let payload = self.api.send_message(token, &counterpart.id, &text).await?;
        let message = Message::from_payload(&payload, session.user_id())?;

        self.ensure_thread(session, counterpart);
        if let Some(thread) = self.thread_mut(&counterpart.id) {
            thread.push(message.clone());
            thread.unread = 0;
        }
        log::info!("[INBOX] sent {} to {}", message.id, counterpart.id);
        Ok(message)
    }

    fn reset(&mut self) {
        self.threads.clear();
    }
}
