//! Thread aggregation: turns a flat message log into one summary per counterpart.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::common::models::{LastMessagePayload, ThreadSummary, UserProfile, FALLBACK_NAME};

/// One row of the shared message log, with both participants resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRecord {
    pub id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub sender: UserProfile,
    pub receiver: UserProfile,
    pub read: bool,
}

impl MessageRecord {
    pub fn involves(&self, user_id: &str) -> bool {
        self.sender.id == user_id || self.receiver.id == user_id
    }

    /// The participant that is not `user_id`.
    pub fn counterpart_of(&self, user_id: &str) -> &UserProfile {
        if self.sender.id == user_id {
            &self.receiver
        } else {
            &self.sender
        }
    }
}

/// Aggregate `records` (newest first) into thread summaries for `user_id`.
///
/// The first record seen for a counterpart is its most recent one and becomes
/// `last_message`. `unread` counts every record addressed to `user_id` that is
/// still unread. Output keeps first-sighting order, so it is newest first too.
pub fn aggregate_threads(user_id: &str, records: &[MessageRecord]) -> Vec<ThreadSummary> {
    let mut summaries: Vec<ThreadSummary> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for record in records {
        if !record.involves(user_id) {
            log::debug!("[THREADS] skipping message {} not involving {}", record.id, user_id);
            continue;
        }
        let counterpart = record.counterpart_of(user_id);
        let slot = match index.get(counterpart.id.as_str()) {
            Some(&slot) => slot,
            None => {
                summaries.push(ThreadSummary {
                    counterpart: UserProfile {
                        id: counterpart.id.clone(),
                        name: if counterpart.name.is_empty() {
                            FALLBACK_NAME.to_string()
                        } else {
                            counterpart.name.clone()
                        },
                        city: counterpart.city.clone(),
                        phone: counterpart.phone.clone(),
                    },
                    last_message: Some(LastMessagePayload {
                        text: record.text.clone(),
                        timestamp: record.created_at,
                        author_id: record.sender.id.clone(),
                    }),
                    unread: 0,
                });
                index.insert(counterpart.id.as_str(), summaries.len() - 1);
                summaries.len() - 1
            }
        };

        if record.receiver.id == user_id && !record.read {
            summaries[slot].unread += 1;
        }
    }

    summaries
}

/// Total unread across summaries.
pub fn total_unread(summaries: &[ThreadSummary]) -> u32 {
    summaries.iter().map(|s| s.unread).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::models::from_millis;

    fn user(id: &str, name: &str) -> UserProfile {
        UserProfile::new(id, name)
    }

    fn record(id: &str, from: &UserProfile, to: &UserProfile, at: i64, read: bool) -> MessageRecord {
        MessageRecord {
            id: id.to_string(),
            text: format!("text {}", id),
            created_at: from_millis(at),
            sender: from.clone(),
            receiver: to.clone(),
            read,
        }
    }

    fn sample_log() -> (UserProfile, Vec<MessageRecord>) {
        let me = user("1", "Alex");
        let sam = user("2", "Sam");
        let kim = user("3", "");
        // newest first
        let log = vec![
            record("m6", &kim, &me, 600, false),
            record("m5", &me, &sam, 500, false),
            record("m4", &sam, &me, 400, false),
            record("m3", &sam, &me, 300, true),
            record("m2", &kim, &me, 200, false),
            record("m1", &sam, &me, 100, false),
        ];
        (me, log)
    }

    #[test]
    fn one_summary_per_counterpart_newest_first() {
        let (me, log) = sample_log();
        let threads = aggregate_threads(&me.id, &log);
        assert_eq!(threads.len(), 2);
        assert_eq!(threads[0].counterpart.id, "3");
        assert_eq!(threads[0].counterpart.name, FALLBACK_NAME);
        assert_eq!(threads[0].last_message.as_ref().unwrap().text, "text m6");
        assert_eq!(threads[1].counterpart.id, "2");
        // latest message for Sam is the one I sent
        let last = threads[1].last_message.as_ref().unwrap();
        assert_eq!(last.author_id, "1");
        assert_eq!(last.text, "text m5");
    }

    #[test]
    fn unread_counts_only_incoming_unread() {
        let (me, log) = sample_log();
        let threads = aggregate_threads(&me.id, &log);
        assert_eq!(threads[0].unread, 2);
        // m5 is unread but outgoing, m3 is read
        assert_eq!(threads[1].unread, 2);
    }

    #[test]
    fn unread_total_matches_log() {
        let (me, log) = sample_log();
        let expected = log
            .iter()
            .filter(|r| r.receiver.id == me.id && !r.read)
            .count() as u32;
        assert_eq!(total_unread(&aggregate_threads(&me.id, &log)), expected);

        // and from the other side of the conversation
        let sam_view = aggregate_threads("2", &log);
        let sam_expected = log.iter().filter(|r| r.receiver.id == "2" && !r.read).count() as u32;
        assert_eq!(total_unread(&sam_view), sam_expected);
    }

    #[test]
    fn aggregation_is_idempotent_and_pure() {
        let (me, log) = sample_log();
        let before = log.clone();
        let first = aggregate_threads(&me.id, &log);
        let second = aggregate_threads(&me.id, &log);
        assert_eq!(first, second);
        assert_eq!(log, before);
    }

    #[test]
    fn foreign_records_are_ignored() {
        let a = user("7", "A");
        let b = user("8", "B");
        let threads = aggregate_threads("1", &[record("x", &a, &b, 1, false)]);
        assert!(threads.is_empty());
    }
}
