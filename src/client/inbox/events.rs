use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

/// Transient user-facing notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

impl Notice {
    pub fn info(text: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Info, text: text.into() }
    }

    pub fn success(text: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Success, text: text.into() }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Error, text: text.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboxEvent {
    /// The set of threads, their order or their unread counts changed.
    ThreadListChanged,
    /// Messages of one thread changed.
    ThreadUpdated { counterpart_id: String },
    Notice(Notice),
}

/// Fan-out of inbox events. Emission happens synchronously with the mutation
/// that caused it; dropped receivers are pruned on the next emit.
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Vec<mpsc::UnboundedSender<InboxEvent>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<InboxEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn emit(&mut self, event: InboxEvent) {
        if let InboxEvent::Notice(notice) = &event {
            match notice.level {
                NoticeLevel::Error => log::warn!("[INBOX] {}", notice.text),
                _ => log::info!("[INBOX] {}", notice.text),
            }
        }
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn notify(&mut self, notice: Notice) {
        self.emit(InboxEvent::Notice(notice));
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}
