// Reminder service: completing a reach-out.
//
// Completion is the main gamified action: it marks the reminder done, moves
// the contact's due date forward, updates the streak, awards XP and checks
// achievements, all or nothing.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::json;

use super::{commit_gamification, load_user, GamificationOutcome};
use crate::db::{DbReminder, RapportDb};
use crate::error::AppError;
use crate::gamification::{award_xp, update_streak, StreakOutcome};
use crate::locks::UserLocks;
use crate::reminders::next_due_date;
use crate::types::ActionType;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderCompletion {
    pub reminder: DbReminder,
    /// True when the reminder was already done; nothing changed.
    pub already_completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_reminder_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gamification: Option<GamificationOutcome>,
}

/// Complete a reminder on `today` (the user's calendar day).
///
/// Completing an already-completed reminder is a no-op that returns the
/// stored state.
pub fn complete_reminder(
    db: &RapportDb,
    locks: &UserLocks,
    user_id: i64,
    reminder_id: &str,
    now: DateTime<Utc>,
    today: NaiveDate,
) -> Result<ReminderCompletion, AppError> {
    locks.with_user_lock(user_id, || {
        db.with_transaction(|db| {
            let reminder = db
                .get_reminder(reminder_id)?
                .filter(|r| r.user_id == user_id)
                .ok_or_else(|| AppError::not_found("reminder", reminder_id))?;

            if reminder.completed || !db.mark_reminder_completed(reminder_id, now)? {
                log::debug!("Reminders: {} already completed, nothing to do", reminder_id);
                let current = db
                    .get_reminder(reminder_id)?
                    .ok_or_else(|| AppError::not_found("reminder", reminder_id))?;
                return Ok(ReminderCompletion {
                    reminder: current,
                    already_completed: true,
                    next_reminder_date: None,
                    gamification: None,
                });
            }

            let mut contact = db
                .get_contact(&reminder.contact_id)?
                .ok_or_else(|| AppError::not_found("contact", &reminder.contact_id))?;
            contact.last_contact_date = Some(now);
            let next = next_due_date(&contact);
            db.record_contact_made(&contact.id, now, next)?;

            let mut user = load_user(db, user_id)?;
            let level_before = user.level;
            let streak = update_streak(&mut user, today);

            let mut awards = vec![award_xp(
                &mut user,
                ActionType::ReminderCompleted,
                now,
                Some(json!({ "reminderId": reminder.id, "contactId": contact.id })),
            )];
            if streak == StreakOutcome::Extended {
                let streak_len = user.current_streak;
                awards.push(award_xp(
                    &mut user,
                    ActionType::StreakMaintained,
                    now,
                    Some(json!({ "streak": streak_len })),
                ));
            }

            let gamification =
                commit_gamification(db, &mut user, level_before, Some(streak), &awards, now)?;

            log::info!(
                "Reminders: user {} completed {} ({}), next due {}",
                user_id,
                reminder.id,
                contact.name,
                next.date_naive()
            );

            let completed = db
                .get_reminder(reminder_id)?
                .ok_or_else(|| AppError::not_found("reminder", reminder_id))?;
            Ok(ReminderCompletion {
                reminder: completed,
                already_completed: false,
                next_reminder_date: Some(next),
                gamification: Some(gamification),
            })
        })
    })
}
