use crate::client::inbox::presenter::format_time;
use crate::client::inbox::source::InboxMode;
use crate::client::inbox::thread::Thread;
use crate::common::models::Direction;

pub const EMPTY_CONVERSATION_PROMPT: &str =
    "Start the conversation by introducing yourself and the pet you're interested in";
pub const SYNCED_HINT: &str = "Messages sync with your account. Follow up with a call or DM if it's urgent.";
pub const OFFLINE_HINT: &str = "Messages are kept on this device only.";
pub const CITY_UNKNOWN: &str = "City not specified";
pub const PHONE_UNKNOWN: &str = "Phone not provided";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bubble {
    pub text: String,
    pub direction: Direction,
    pub time: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationBody {
    Empty(String),
    Messages(Vec<Bubble>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationRender {
    pub counterpart_id: String,
    pub title: String,
    pub meta: String,
    pub hint: String,
    pub body: ConversationBody,
}

/// State of the single open conversation: which thread, the unsent draft and
/// whether the input has focus. Holds a reference to a thread by id only.
#[derive(Debug, Clone, Default)]
pub struct ConversationView {
    active: Option<String>,
    draft: String,
    focused: bool,
}

impl ConversationView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&mut self, counterpart_id: &str) {
        if self.active.as_deref() != Some(counterpart_id) {
            self.draft.clear();
        }
        self.active = Some(counterpart_id.to_string());
        self.focused = true;
    }

    /// Clears the active-thread reference; the thread itself stays.
    pub fn close(&mut self) {
        self.active = None;
        self.focused = false;
    }

    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn is_open(&self) -> bool {
        self.active.is_some()
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    pub fn clear_draft(&mut self) {
        self.draft.clear();
    }

    pub fn render(thread: &Thread, mode: InboxMode) -> ConversationRender {
        let counterpart = &thread.counterpart;
        let city = if counterpart.city.is_empty() { CITY_UNKNOWN } else { counterpart.city.as_str() };
        let phone = if counterpart.phone.is_empty() { PHONE_UNKNOWN } else { counterpart.phone.as_str() };
        let hint = match mode {
            InboxMode::Synced => SYNCED_HINT,
            InboxMode::Offline => OFFLINE_HINT,
        };

        let body = if thread.messages.is_empty() {
            ConversationBody::Empty(EMPTY_CONVERSATION_PROMPT.to_string())
        } else {
            ConversationBody::Messages(
                thread
                    .messages
                    .iter()
                    .map(|m| Bubble {
                        text: m.text.clone(),
                        direction: m.direction,
                        time: format_time(m.timestamp),
                    })
                    .collect(),
            )
        };

        ConversationRender {
            counterpart_id: thread.id().to_string(),
            title: counterpart.display_name().to_string(),
            meta: format!("{} • {}", city, phone),
            hint: hint.to_string(),
            body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::models::{Message, UserProfile};

    #[test]
    fn empty_thread_shows_prompt_and_fallbacks() {
        let thread = Thread::new(UserProfile::new("2", ""));
        let render = ConversationView::render(&thread, InboxMode::Offline);
        assert_eq!(render.title, "Pet Owner");
        assert_eq!(render.meta, "City not specified • Phone not provided");
        assert_eq!(render.hint, OFFLINE_HINT);
        assert_eq!(render.body, ConversationBody::Empty(EMPTY_CONVERSATION_PROMPT.to_string()));
    }

    #[test]
    fn bubbles_follow_direction() {
        let mut thread = Thread::new(UserProfile::new("2", "Sam").with_city("Turin").with_phone("555"));
        thread.push(Message {
            id: "m".into(),
            text: "hi".into(),
            author_id: "2".into(),
            timestamp: 1,
            read: true,
            direction: Direction::Incoming,
        });
        let render = ConversationView::render(&thread, InboxMode::Synced);
        assert_eq!(render.meta, "Turin • 555");
        match render.body {
            ConversationBody::Messages(bubbles) => {
                assert_eq!(bubbles.len(), 1);
                assert_eq!(bubbles[0].direction, Direction::Incoming);
            }
            other => panic!("unexpected body {:?}", other),
        }
    }

    #[test]
    fn switching_threads_drops_the_draft() {
        let mut view = ConversationView::new();
        view.open("2");
        view.set_draft("half a thought");
        view.open("2");
        assert_eq!(view.draft(), "half a thought");
        view.open("3");
        assert_eq!(view.draft(), "");
        view.close();
        assert!(!view.is_open());
        assert!(!view.is_focused());
    }
}
