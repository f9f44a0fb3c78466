//! In-memory record of event reminders already sent.
//!
//! Keyed by (event, user). Best effort: entries are lost on restart and purged
//! once older than the configured TTL, by which point the event has started
//! and falls outside the reminder window anyway.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

#[derive(Default)]
pub struct SentRegistry {
    sent: DashMap<(String, i64), DateTime<Utc>>,
}

impl SentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a send. Returns `false` if this (event, user) was already
    /// recorded, in which case nothing should be sent.
    pub fn mark_if_new(&self, event_id: &str, user_id: i64, now: DateTime<Utc>) -> bool {
        use dashmap::mapref::entry::Entry;
        match self.sent.entry((event_id.to_string(), user_id)) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(now);
                true
            }
        }
    }

    /// Forget a send, so a failed delivery can be retried on the next tick.
    pub fn unmark(&self, event_id: &str, user_id: i64) {
        self.sent.remove(&(event_id.to_string(), user_id));
    }

    pub fn contains(&self, event_id: &str, user_id: i64) -> bool {
        self.sent.contains_key(&(event_id.to_string(), user_id))
    }

    /// Drop entries recorded more than `ttl` before `now`. Returns how many
    /// were removed.
    pub fn purge_older_than(&self, ttl: Duration, now: DateTime<Utc>) -> usize {
        let cutoff = now - ttl;
        let before = self.sent.len();
        self.sent.retain(|_, sent_at| *sent_at >= cutoff);
        let removed = before.saturating_sub(self.sent.len());
        if removed > 0 {
            log::debug!("SentRegistry: purged {} entries older than {}", removed, cutoff);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sent.is_empty()
    }
}
