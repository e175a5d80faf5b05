//! The messaging widget: thread list, one open conversation and the send path.
//!
//! [`Inbox`] owns the session, the live [`ThreadSource`] and the conversation
//! state. Every mutation emits [`InboxEvent`]s to subscribers right after the
//! state change, so a front end can re-render from [`Inbox::thread_list`] and
//! [`Inbox::conversation`].

pub mod conversation;
pub mod events;
pub mod mirror;
pub mod presenter;
pub mod remote;
pub mod session;
pub mod source;
pub mod thread;

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::client::services::remote_api::RemoteApi;
use crate::client::storage::KeyValueStore;
use crate::common::error::{InboxError, Result};
use crate::common::models::{Message, UserProfile};

use self::conversation::{ConversationRender, ConversationView};
use self::events::{EventBus, InboxEvent, Notice};
use self::mirror::MirrorThreads;
use self::presenter::{InboxPresenter, ThreadListView};
use self::remote::RemoteThreads;
use self::session::Session;
use self::source::{InboxMode, ThreadSource};
use self::thread::Thread;

pub struct Inbox {
    source: Box<dyn ThreadSource>,
    session: Option<Session>,
    view: ConversationView,
    events: EventBus,
}

impl Inbox {
    pub fn new(source: Box<dyn ThreadSource>) -> Self {
        Self {
            source,
            session: None,
            view: ConversationView::new(),
            events: EventBus::new(),
        }
    }

    /// Server mode over `api`.
    pub fn synced(api: Arc<dyn RemoteApi>) -> Self {
        Self::new(Box::new(RemoteThreads::new(api)))
    }

    /// Offline mode over client-held storage.
    pub fn offline<S: KeyValueStore + 'static>(store: S) -> Self {
        Self::new(Box::new(MirrorThreads::new(store)))
    }

    pub fn mode(&self) -> InboxMode {
        self.source.mode()
    }

    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<InboxEvent> {
        self.events.subscribe()
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Replace the identity. `None`, or a user without an id, signs out.
    pub async fn set_current_user(&mut self, user: Option<UserProfile>, token: Option<String>) {
        self.source.reset();
        self.view.close();
        self.view.clear_draft();

        match user.filter(|u| !u.id.trim().is_empty()) {
            Some(user) => {
                log::info!("[INBOX] signed in as {} ({:?} mode)", user.id, self.source.mode());
                self.session = Some(Session::new(user, token));
                // a failed first load is logged only; the list stays empty
                let _ = self.refresh(false).await;
            }
            None => {
                log::info!("[INBOX] signed out");
                self.session = None;
                self.events.emit(InboxEvent::ThreadListChanged);
            }
        }
    }

    /// Rebuild the thread list. Errors are always logged and surfaced as a
    /// notice only when `show_errors` is set.
    pub async fn refresh(&mut self, show_errors: bool) -> Result<()> {
        let Some(session) = self.session.as_ref() else {
            log::debug!("[INBOX] refresh skipped, nobody signed in");
            return Ok(());
        };
        match self.source.refresh(session).await {
            Ok(()) => {
                self.events.emit(InboxEvent::ThreadListChanged);
                if let Some(active) = self.view.active().map(str::to_string) {
                    self.events.emit(InboxEvent::ThreadUpdated { counterpart_id: active });
                }
                Ok(())
            }
            Err(e) => {
                log::error!("[INBOX] refresh failed: {}", e);
                if show_errors {
                    self.events.notify(Notice::error(format!("Could not load conversations: {}", e.user_prompt())));
                }
                Err(e)
            }
        }
    }

    /// Open the conversation with `counterpart`: create the thread if needed,
    /// fetch its history once, mark it read and focus the input.
    pub async fn open(&mut self, counterpart: &UserProfile) -> Result<()> {
        let Some(session) = self.session.as_ref() else {
            self.events.notify(Notice::info(InboxError::NotSignedIn.user_prompt()));
            return Err(InboxError::NotSignedIn);
        };
        if counterpart.id.trim().is_empty() {
            return Err(InboxError::InvalidMessage("Invalid user id".to_string()));
        }

        self.source.ensure_thread(session, counterpart);
        self.view.open(&counterpart.id);
        self.events.emit(InboxEvent::ThreadListChanged);

        if let Err(e) = self.source.load_history(session, &counterpart.id).await {
            log::error!("[INBOX] history with {} failed: {}", counterpart.id, e);
            let notice = if e.is_auth() {
                Notice::info(e.user_prompt())
            } else {
                Notice::error(format!("Could not load messages: {}", e.user_prompt()))
            };
            self.events.notify(notice);
            self.events.emit(InboxEvent::ThreadUpdated { counterpart_id: counterpart.id.clone() });
            return Err(e);
        }

        if let Err(e) = self.source.mark_read(session, &counterpart.id).await {
            log::warn!("[INBOX] could not mark {} read: {}", counterpart.id, e);
        }
        self.events.emit(InboxEvent::ThreadUpdated { counterpart_id: counterpart.id.clone() });
        self.events.emit(InboxEvent::ThreadListChanged);
        Ok(())
    }

    /// Clears the active-thread reference. Thread state is kept.
    pub fn close(&mut self) {
        self.view.close();
    }

    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.view.set_draft(text);
    }

    pub fn draft(&self) -> &str {
        self.view.draft()
    }

    pub async fn send(&mut self, counterpart: &UserProfile, text: &str) -> Result<Message> {
        let Some(session) = self.session.as_ref() else {
            self.events.notify(Notice::info(InboxError::NotSignedIn.user_prompt()));
            return Err(InboxError::NotSignedIn);
        };

        match self.source.send(session, counterpart, text).await {
            Ok(message) => {
                if self.view.active() == Some(counterpart.id.as_str()) {
                    self.view.clear_draft();
                }
                let name = self
                    .source
                    .thread(&counterpart.id)
                    .map(|t| t.counterpart.display_name().to_string())
                    .unwrap_or_else(|| counterpart.display_name().to_string());
                self.events.emit(InboxEvent::ThreadUpdated { counterpart_id: counterpart.id.clone() });
                self.events.emit(InboxEvent::ThreadListChanged);
                self.events.notify(Notice::success(format!("Message sent to {}", name)));
                Ok(message)
            }
            Err(e) => {
                log::error!("[INBOX] send to {} failed: {}", counterpart.id, e);
                let notice = if e.is_auth() { Notice::info(e.user_prompt()) } else { Notice::error(e.user_prompt()) };
                self.events.notify(notice);
                Err(e)
            }
        }
    }

    /// Send the draft of the open conversation. A blank draft is a no-op.
    pub async fn submit(&mut self) -> Result<Option<Message>> {
        let Some(active) = self.view.active().map(str::to_string) else {
            return Ok(None);
        };
        if self.view.draft().trim().is_empty() {
            return Ok(None);
        }
        let counterpart = match self.source.thread(&active) {
            Some(thread) => thread.counterpart.clone(),
            None => UserProfile::new(active, ""),
        };
        let draft = self.view.draft().to_string();
        self.send(&counterpart, &draft).await.map(Some)
    }

    pub fn threads(&self) -> &[Thread] {
        self.source.threads()
    }

    pub fn thread(&self, counterpart_id: &str) -> Option<&Thread> {
        self.source.thread(counterpart_id)
    }

    pub fn active_thread(&self) -> Option<&Thread> {
        self.view.active().and_then(|id| self.source.thread(id))
    }

    pub fn is_focused(&self) -> bool {
        self.view.is_focused()
    }

    pub fn thread_list(&self) -> ThreadListView {
        let viewer = self.session.as_ref().map(|s| s.user_id());
        InboxPresenter::render(self.source.threads(), viewer)
    }

    pub fn conversation(&self) -> Option<ConversationRender> {
        self.active_thread().map(|t| ConversationView::render(t, self.source.mode()))
    }
}
