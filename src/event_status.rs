//! Time-driven event status transitions.
//!
//! `scheduled -> in_progress -> completed`, with `scheduled -> completed`
//! allowed when an event both started and ended between two scans.
//! `completed` and `cancelled` are terminal; `cancelled` is only ever set by
//! an explicit user action, never here.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::DbEvent;
use crate::types::EventStatus;

/// The slice of an event the status scan needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventWindow {
    pub id: String,
    pub status: EventStatus,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

impl From<&DbEvent> for EventWindow {
    fn from(event: &DbEvent) -> Self {
        Self {
            id: event.id.clone(),
            status: event.status,
            start_date: event.start_date,
            end_date: event.end_date,
        }
    }
}

/// Events needing a status change, split by target status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChanges {
    pub to_in_progress: Vec<String>,
    pub to_completed: Vec<String>,
}

impl StatusChanges {
    pub fn is_empty(&self) -> bool {
        self.to_in_progress.is_empty() && self.to_completed.is_empty()
    }
}

/// The status an event should move to at `now`, or `None` if it stays put.
pub fn next_status(
    status: EventStatus,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Option<EventStatus> {
    match status {
        // End is checked first so a short event missed entirely by the
        // scanner goes straight to completed.
        EventStatus::Scheduled if now >= end_date => Some(EventStatus::Completed),
        EventStatus::Scheduled if now >= start_date => Some(EventStatus::InProgress),
        EventStatus::InProgress if now >= end_date => Some(EventStatus::Completed),
        EventStatus::Scheduled | EventStatus::InProgress => None,
        EventStatus::Completed | EventStatus::Cancelled => None,
    }
}

/// Partition events by the transition they need at `now`. Events needing no
/// change are dropped.
pub fn classify(events: &[EventWindow], now: DateTime<Utc>) -> StatusChanges {
    let mut changes = StatusChanges::default();
    for event in events {
        match next_status(event.status, event.start_date, event.end_date, now) {
            Some(EventStatus::InProgress) => changes.to_in_progress.push(event.id.clone()),
            Some(EventStatus::Completed) => changes.to_completed.push(event.id.clone()),
            _ => {}
        }
    }
    changes
}

/// Whether `from -> to` is a legal automatic transition.
pub fn is_valid_transition(from: EventStatus, to: EventStatus) -> bool {
    matches!(
        (from, to),
        (EventStatus::Scheduled, EventStatus::InProgress)
            | (EventStatus::Scheduled, EventStatus::Completed)
            | (EventStatus::InProgress, EventStatus::Completed)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const ALL: [EventStatus; 4] = [
        EventStatus::Scheduled,
        EventStatus::InProgress,
        EventStatus::Completed,
        EventStatus::Cancelled,
    ];

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 1, h, m, 0).unwrap()
    }

    fn window(id: &str, status: EventStatus, start: DateTime<Utc>, end: DateTime<Utc>) -> EventWindow {
        EventWindow {
            id: id.to_string(),
            status,
            start_date: start,
            end_date: end,
        }
    }

    #[test]
    fn test_scheduled_transitions() {
        let (start, end) = (at(10, 0), at(11, 0));
        assert_eq!(next_status(EventStatus::Scheduled, start, end, at(9, 59)), None);
        assert_eq!(
            next_status(EventStatus::Scheduled, start, end, at(10, 0)),
            Some(EventStatus::InProgress)
        );
        assert_eq!(
            next_status(EventStatus::Scheduled, start, end, at(11, 0)),
            Some(EventStatus::Completed)
        );
    }

    #[test]
    fn test_short_event_skips_in_progress() {
        let changes = classify(
            &[window("short", EventStatus::Scheduled, at(10, 0), at(10, 5))],
            at(10, 7),
        );
        assert_eq!(changes.to_completed, vec!["short".to_string()]);
        assert!(changes.to_in_progress.is_empty());
    }

    #[test]
    fn test_in_progress_completes_at_end() {
        let (start, end) = (at(10, 0), at(11, 0));
        assert_eq!(next_status(EventStatus::InProgress, start, end, at(10, 30)), None);
        assert_eq!(
            next_status(EventStatus::InProgress, start, end, at(11, 0)),
            Some(EventStatus::Completed)
        );
    }

    #[test]
    fn test_terminal_states_closed() {
        let (start, end) = (at(10, 0), at(11, 0));
        for now in [at(9, 0), at(10, 30), at(12, 0)] {
            assert_eq!(next_status(EventStatus::Completed, start, end, now), None);
            assert_eq!(next_status(EventStatus::Cancelled, start, end, now), None);
        }
        for to in ALL {
            assert!(!is_valid_transition(EventStatus::Completed, to));
            assert!(!is_valid_transition(EventStatus::Cancelled, to));
        }
    }

    #[test]
    fn test_classify_partitions_and_drops_unchanged() {
        let now = at(10, 30);
        let events = vec![
            window("future", EventStatus::Scheduled, at(11, 0), at(12, 0)),
            window("started", EventStatus::Scheduled, at(10, 0), at(11, 0)),
            window("running", EventStatus::InProgress, at(10, 0), at(11, 0)),
            window("ended", EventStatus::InProgress, at(9, 0), at(10, 0)),
            window("missed", EventStatus::Scheduled, at(8, 0), at(9, 0)),
            window("cancelled", EventStatus::Cancelled, at(8, 0), at(9, 0)),
        ];
        let changes = classify(&events, now);
        assert_eq!(changes.to_in_progress, vec!["started".to_string()]);
        assert_eq!(changes.to_completed, vec!["ended".to_string(), "missed".to_string()]);
    }

    #[test]
    fn test_classify_idempotent_after_apply() {
        let now = at(10, 30);
        let mut events = vec![
            window("a", EventStatus::Scheduled, at(10, 0), at(11, 0)),
            window("b", EventStatus::Scheduled, at(9, 0), at(10, 0)),
        ];
        let first = classify(&events, now);
        // Apply, as the driver would after re-fetching.
        for e in events.iter_mut() {
            if let Some(to) = next_status(e.status, e.start_date, e.end_date, now) {
                assert!(is_valid_transition(e.status, to));
                e.status = to;
            }
        }
        assert!(!first.is_empty());
        assert!(classify(&events, now).is_empty());
    }

    #[test]
    fn test_valid_transition_table() {
        assert!(is_valid_transition(EventStatus::Scheduled, EventStatus::InProgress));
        assert!(is_valid_transition(EventStatus::Scheduled, EventStatus::Completed));
        assert!(is_valid_transition(EventStatus::InProgress, EventStatus::Completed));
        assert!(!is_valid_transition(EventStatus::InProgress, EventStatus::Scheduled));
        assert!(!is_valid_transition(EventStatus::Scheduled, EventStatus::Cancelled));
        for s in ALL {
            assert!(!is_valid_transition(s, s), "{:?} -> itself", s);
        }
    }

    #[test]
    fn test_no_sequence_leaves_terminal_state() {
        let mut status = EventStatus::Scheduled;
        let (start, end) = (at(10, 0), at(11, 0));
        for minute in (0..180).step_by(7) {
            let now = at(9, 0) + chrono::Duration::minutes(minute);
            if let Some(next) = next_status(status, start, end, now) {
                assert!(is_valid_transition(status, next));
                status = next;
            }
        }
        assert_eq!(status, EventStatus::Completed);
    }
}
