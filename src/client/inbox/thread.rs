use crate::common::error::Result;
use crate::common::models::{LastMessage, Message, ThreadSummary, UserProfile};

/// Conversation with one counterpart, from the viewing user's side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thread {
    /// Last-known snapshot, overwritten on each sighting.
    pub counterpart: UserProfile,
    /// Oldest first.
    pub messages: Vec<Message>,
    pub last_message: Option<LastMessage>,
    pub unread: u32,
    /// Whether full history has been fetched for this session.
    pub messages_loaded: bool,
}

impl Thread {
    pub fn new(counterpart: UserProfile) -> Self {
        Self {
            counterpart,
            messages: Vec::new(),
            last_message: None,
            unread: 0,
            messages_loaded: false,
        }
    }

    /// Build a thread from a fetched summary. History is not loaded yet.
    pub fn from_summary(summary: &ThreadSummary) -> Result<Self> {
        summary.counterpart.validate()?;
        let last_message = summary.last_message.as_ref().map(LastMessage::try_from).transpose()?;
        Ok(Self {
            counterpart: summary.counterpart.clone(),
            messages: Vec::new(),
            last_message,
            unread: summary.unread,
            messages_loaded: false,
        })
    }

    pub fn id(&self) -> &str {
        &self.counterpart.id
    }

    /// Unread count recomputed from the loaded messages.
    pub fn count_unread(&self) -> u32 {
        self.messages.iter().filter(|m| m.is_unread_incoming()).count() as u32
    }

    /// Sort key for the thread list; threads without messages sort as 0.
    pub fn last_timestamp(&self) -> i64 {
        self.last_message.as_ref().map(|m| m.timestamp).unwrap_or(0)
    }

    /// Append a message and make it the preview.
    pub fn push(&mut self, message: Message) {
        self.last_message = Some(LastMessage::from(&message));
        self.messages.push(message);
    }

    /// Replace the history with a freshly fetched one.
    pub fn replace_history(&mut self, messages: Vec<Message>) {
        if let Some(last) = messages.last() {
            self.last_message = Some(LastMessage::from(last));
        }
        self.messages = messages;
        self.messages_loaded = true;
    }

    /// Flip every incoming unread message to read. Returns how many changed.
    pub fn mark_all_read(&mut self) -> usize {
        let mut changed = 0;
        for message in self.messages.iter_mut().filter(|m| m.is_unread_incoming()) {
            message.read = true;
            changed += 1;
        }
        self.unread = 0;
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::models::{from_millis, Direction, LastMessagePayload};

    fn message(id: &str, author: &str, ts: i64, read: bool) -> Message {
        Message {
            id: id.into(),
            text: format!("text {}", id),
            author_id: author.into(),
            timestamp: ts,
            read,
            direction: Direction::for_author(author, "1"),
        }
    }

    #[test]
    fn push_updates_preview() {
        let mut thread = Thread::new(UserProfile::new("2", "Sam"));
        assert_eq!(thread.last_timestamp(), 0);
        thread.push(message("a", "2", 10, false));
        thread.push(message("b", "1", 20, true));
        assert_eq!(thread.last_message.as_ref().unwrap().text, "text b");
        assert_eq!(thread.last_timestamp(), 20);
        assert_eq!(thread.count_unread(), 1);
    }

    #[test]
    fn mark_all_read_leaves_own_messages_alone() {
        let mut thread = Thread::new(UserProfile::new("2", "Sam"));
        thread.push(message("a", "2", 1, false));
        thread.push(message("b", "1", 2, true));
        thread.push(message("c", "2", 3, false));
        thread.push(message("d", "2", 4, false));
        thread.unread = 3;
        let own_before: Vec<Message> =
            thread.messages.iter().filter(|m| m.direction == Direction::Outgoing).cloned().collect();
        assert_eq!(thread.mark_all_read(), 3);
        assert_eq!(thread.unread, 0);
        assert_eq!(thread.count_unread(), 0);
        let own_after: Vec<Message> =
            thread.messages.iter().filter(|m| m.direction == Direction::Outgoing).cloned().collect();
        assert_eq!(own_before, own_after);
        assert_eq!(thread.mark_all_read(), 0);
    }

    #[test]
    fn summary_without_counterpart_id_is_rejected() {
        let summary = ThreadSummary {
            counterpart: UserProfile::new("", "Ghost"),
            last_message: None,
            unread: 0,
        };
        assert!(Thread::from_summary(&summary).is_err());

        let summary = ThreadSummary {
            counterpart: UserProfile::new("2", "Sam"),
            last_message: Some(LastMessagePayload {
                text: "hi".into(),
                timestamp: from_millis(5),
                author_id: "2".into(),
            }),
            unread: 4,
        };
        let thread = Thread::from_summary(&summary).unwrap();
        assert_eq!(thread.unread, 4);
        assert_eq!(thread.last_timestamp(), 5);
        assert!(!thread.messages_loaded);
    }
}
