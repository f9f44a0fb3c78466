//! Reminder due engine: decides which tracked contacts need a nudge today.
//!
//! Pure functions over already-fetched contacts. Calendar dates are compared
//! in UTC; the scan driver decides what "today" is in the configured timezone.

use chrono::{DateTime, Days, NaiveDate, Utc};
use uuid::Uuid;

use crate::cadence::days_for_cadence;
use crate::db::{DbContact, DbReminder};

/// Next due timestamp computed from the cadence: last contact (or creation,
/// if never contacted) plus the cadence interval in calendar days.
pub fn next_due_date(contact: &DbContact) -> DateTime<Utc> {
    let base = contact.last_contact_date.unwrap_or(contact.created_at);
    let days = days_for_cadence(&contact.cadence, contact.custom_days).max(1) as u64;
    base.checked_add_days(Days::new(days))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Calendar date the contact is due on: the cached `next_reminder_date` when
/// present, otherwise the computed one.
pub fn due_date(contact: &DbContact) -> NaiveDate {
    contact
        .next_reminder_date
        .unwrap_or_else(|| next_due_date(contact))
        .date_naive()
}

/// Whether a reminder is due for this contact on `today`.
/// Untracked contacts are never due.
pub fn is_due(contact: &DbContact, today: NaiveDate) -> bool {
    if !contact.tracked {
        return false;
    }
    due_date(contact) <= today
}

/// The due contacts, in input order.
pub fn due_subset(contacts: &[DbContact], today: NaiveDate) -> Vec<&DbContact> {
    contacts.iter().filter(|c| is_due(c, today)).collect()
}

/// A fresh open reminder for a due contact. The storage layer drops it if an
/// open reminder for the same contact and due date already exists.
pub fn new_reminder(contact: &DbContact, now: DateTime<Utc>) -> DbReminder {
    DbReminder {
        id: format!("rem-{}", Uuid::new_v4()),
        contact_id: contact.id.clone(),
        user_id: contact.user_id,
        due_date: due_date(contact),
        completed: false,
        completed_at: None,
        notification_sent: false,
        created_at: now,
    }
}
