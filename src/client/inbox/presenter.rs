use chrono::{Local, TimeZone};

use crate::client::inbox::thread::Thread;

/// Totals above this show as "99+".
pub const BADGE_CEILING: u32 = 99;
pub const NO_MESSAGES_PREVIEW: &str = "No messages yet";
pub const OWN_MESSAGE_PREFIX: &str = "You: ";
pub const EMPTY_LIST_PLACEHOLDER: &str = "No conversations yet";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadEntry {
    pub counterpart_id: String,
    pub name: String,
    pub preview: String,
    /// Empty when the thread has no messages.
    pub time: String,
    pub unread: u32,
    /// Per-entry badge text, `None` when nothing is unread.
    pub badge: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UnreadBadge {
    pub total: u32,
}

impl UnreadBadge {
    pub fn label(&self) -> Option<String> {
        badge_label(self.total)
    }

    pub fn is_hidden(&self) -> bool {
        self.total == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ThreadListView {
    /// Most recent activity first.
    pub entries: Vec<ThreadEntry>,
    pub badge: UnreadBadge,
}

impl ThreadListView {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Turns threads into the list the inbox panel shows.
pub struct InboxPresenter;

impl InboxPresenter {
    pub fn render(threads: &[Thread], viewer_id: Option<&str>) -> ThreadListView {
        let mut ordered: Vec<&Thread> = threads.iter().collect();
        // stable: ties keep their source order
        ordered.sort_by(|a, b| b.last_timestamp().cmp(&a.last_timestamp()));

        let entries = ordered
            .into_iter()
            .map(|thread| ThreadEntry {
                counterpart_id: thread.id().to_string(),
                name: thread.counterpart.display_name().to_string(),
                preview: preview(thread, viewer_id),
                time: thread.last_message.as_ref().map(|m| format_time(m.timestamp)).unwrap_or_default(),
                unread: thread.unread,
                badge: badge_label(thread.unread),
            })
            .collect();

        let total = threads.iter().fold(0u32, |sum, t| sum.saturating_add(t.unread));
        ThreadListView { entries, badge: UnreadBadge { total } }
    }
}

fn preview(thread: &Thread, viewer_id: Option<&str>) -> String {
    match &thread.last_message {
        Some(last) if Some(last.author_id.as_str()) == viewer_id => format!("{}{}", OWN_MESSAGE_PREFIX, last.text),
        Some(last) => last.text.clone(),
        None => NO_MESSAGES_PREVIEW.to_string(),
    }
}

pub fn badge_label(count: u32) -> Option<String> {
    match count {
        0 => None,
        n if n > BADGE_CEILING => Some(format!("{}+", BADGE_CEILING)),
        n => Some(n.to_string()),
    }
}

/// Local time as "Mar 4, 09:15".
pub fn format_time(ms: i64) -> String {
    match Local.timestamp_millis_opt(ms).single() {
        Some(dt) => dt.format("%b %-d, %H:%M").to_string(),
        None => String::new(),
    }
}
