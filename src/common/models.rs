// Models shared between client and server
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::common::error::{InboxError, Result};

/// Maximum message length, counted in characters.
pub const MAX_MESSAGE_CHARS: usize = 1000;

/// Name shown when a counterpart has no display name.
pub const FALLBACK_NAME: &str = "Pet Owner";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct UserProfile {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub phone: String,
}

impl UserProfile {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            city: String::new(),
            phone: String::new(),
        }
    }

    pub fn with_city(mut self, city: impl Into<String>) -> Self {
        self.city = city.into();
        self
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = phone.into();
        self
    }

    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            FALLBACK_NAME
        } else {
            &self.name
        }
    }

    /// Overwrite this snapshot with a newer sighting of the same user.
    /// Empty fields in the newer sighting keep the old value.
    pub fn refresh_from(&mut self, newer: &UserProfile) {
        if !newer.name.is_empty() {
            self.name = newer.name.clone();
        }
        if !newer.city.is_empty() {
            self.city = newer.city.clone();
        }
        if !newer.phone.is_empty() {
            self.phone = newer.phone.clone();
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(InboxError::InvalidRecord("user without id".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Outgoing,
    Incoming,
}

impl Direction {
    pub fn for_author(author_id: &str, viewer_id: &str) -> Self {
        if author_id == viewer_id {
            Direction::Outgoing
        } else {
            Direction::Incoming
        }
    }
}

/// A message as seen by one viewing user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub text: String,
    pub author_id: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub read: bool,
    pub direction: Direction,
}

impl Message {
    /// Map a wire payload for `viewer_id`. History fetches mark messages read on
    /// the server, so the mapped copy is always read.
    pub fn from_payload(payload: &MessagePayload, viewer_id: &str) -> Result<Self> {
        payload.validate()?;
        Ok(Self {
            id: payload.id.clone(),
            text: payload.text.clone(),
            author_id: payload.author_id.clone(),
            timestamp: to_millis(&payload.timestamp),
            read: true,
            direction: Direction::for_author(&payload.author_id, viewer_id),
        })
    }

    pub fn is_unread_incoming(&self) -> bool {
        self.direction == Direction::Incoming && !self.read
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LastMessage {
    pub text: String,
    pub timestamp: i64,
    pub author_id: String,
}

impl From<&Message> for LastMessage {
    fn from(message: &Message) -> Self {
        Self {
            text: message.text.clone(),
            timestamp: message.timestamp,
            author_id: message.author_id.clone(),
        }
    }
}

impl TryFrom<&LastMessagePayload> for LastMessage {
    type Error = InboxError;

    fn try_from(payload: &LastMessagePayload) -> Result<Self> {
        if payload.author_id.is_empty() {
            return Err(InboxError::InvalidRecord("last message without author".to_string()));
        }
        Ok(Self {
            text: payload.text.clone(),
            timestamp: to_millis(&payload.timestamp),
            author_id: payload.author_id.clone(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    pub id: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub author_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_id: Option<String>,
}

impl MessagePayload {
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(InboxError::InvalidRecord("message without id".to_string()));
        }
        if self.author_id.trim().is_empty() {
            return Err(InboxError::InvalidRecord(format!("message {} without author", self.id)));
        }
        validate_text(&self.text, MAX_MESSAGE_CHARS).map_err(InboxError::InvalidRecord)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LastMessagePayload {
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub author_id: String,
}

/// Per-counterpart summary returned by the thread list fetch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ThreadSummary {
    pub counterpart: UserProfile,
    #[serde(default)]
    pub last_message: Option<LastMessagePayload>,
    #[serde(default)]
    pub unread: u32,
}

/// Trim and check a message body. Returns the trimmed text.
pub fn validate_text(text: &str, max_chars: usize) -> std::result::Result<String, String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err("Message text is empty".to_string());
    }
    let len = trimmed.chars().count();
    if len > max_chars {
        return Err(format!("Message too long ({} chars, max {})", len, max_chars));
    }
    Ok(trimmed.to_string())
}

pub fn to_millis(ts: &DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

pub fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_else(Utc::now)
}

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(author: &str, text: &str) -> MessagePayload {
        MessagePayload {
            id: "m1".into(),
            text: text.into(),
            timestamp: from_millis(1_700_000_000_000),
            author_id: author.into(),
            read: Some(false),
            receiver_id: None,
        }
    }

    #[test]
    fn direction_follows_author() {
        let out = Message::from_payload(&payload("1", "hello"), "1").unwrap();
        assert_eq!(out.direction, Direction::Outgoing);
        let inc = Message::from_payload(&payload("2", "hello"), "1").unwrap();
        assert_eq!(inc.direction, Direction::Incoming);
        assert!(inc.read);
        assert_eq!(inc.timestamp, 1_700_000_000_000);
    }

    #[test]
    fn text_validation_trims_and_bounds() {
        assert_eq!(validate_text("  hi  ", 1000).unwrap(), "hi");
        assert!(validate_text("   ", 1000).is_err());
        let exact: String = "é".repeat(1000);
        assert!(validate_text(&exact, 1000).is_ok());
        let over: String = "a".repeat(1001);
        assert!(validate_text(&over, 1000).is_err());
    }

    #[test]
    fn payload_rejects_empty_text_at_boundary() {
        let err = Message::from_payload(&payload("2", ""), "1").unwrap_err();
        assert!(matches!(err, InboxError::InvalidRecord(_)));
    }

    #[test]
    fn payload_uses_camel_case_on_the_wire() {
        let json = serde_json::to_value(payload("2", "hi")).unwrap();
        assert_eq!(json["authorId"], "2");
        assert!(json.get("receiverId").is_none());
        let summary: ThreadSummary = serde_json::from_str(
            r#"{"counterpart":{"id":"2","name":"Sam"},"lastMessage":null,"unread":3}"#,
        )
        .unwrap();
        assert_eq!(summary.counterpart.city, "");
        assert_eq!(summary.unread, 3);
        assert!(summary.last_message.is_none());
    }

    #[test]
    fn snapshot_refresh_keeps_known_fields() {
        let mut sam = UserProfile::new("2", "Sam").with_city("Turin").with_phone("555");
        sam.refresh_from(&UserProfile::new("2", "Samantha"));
        assert_eq!(sam.name, "Samantha");
        assert_eq!(sam.city, "Turin");
        assert_eq!(UserProfile::new("3", " ").display_name(), FALLBACK_NAME);
    }
}
