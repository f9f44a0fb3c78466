// User service: registration, progress snapshot, activity summary.

use chrono::{DateTime, Days, NaiveDate, TimeZone, Utc};
use serde::Serialize;

use super::load_user;
use crate::db::{DbUser, DbUserAchievement, RapportDb};
use crate::error::AppError;
use crate::gamification::{aggregate, ActivityPeriod, ActivitySummary, LevelProgress};

/// Register a Telegram user on first sight, or refresh their profile fields.
pub fn ensure_user(
    db: &RapportDb,
    user_id: i64,
    username: Option<&str>,
    first_name: Option<&str>,
    now: DateTime<Utc>,
) -> Result<DbUser, AppError> {
    let mut user = DbUser::new(user_id, now);
    user.username = username.map(str::to_string);
    user.first_name = first_name.map(str::to_string);
    db.upsert_user(&user)?;
    load_user(db, user_id)
}

/// Everything the profile screen shows.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub user_id: i64,
    pub level: LevelProgress,
    pub current_streak: i64,
    pub longest_streak: i64,
    pub last_activity_date: Option<NaiveDate>,
    pub contact_count: i64,
    pub reminders_completed: i64,
    pub achievements: Vec<DbUserAchievement>,
}

pub fn user_progress(db: &RapportDb, user_id: i64) -> Result<ProgressSnapshot, AppError> {
    let user = load_user(db, user_id)?;
    Ok(ProgressSnapshot {
        user_id,
        level: LevelProgress::for_xp(user.total_xp),
        current_streak: user.current_streak,
        longest_streak: user.longest_streak,
        last_activity_date: user.last_activity_date,
        contact_count: db.count_contacts(user_id)?,
        reminders_completed: db.count_completed_reminders(user_id)?,
        achievements: db.list_user_achievements(user_id)?,
    })
}

/// Per-day activity for the trailing window ending on `today` (in `tz`).
pub fn activity_summary<Tz: TimeZone>(
    db: &RapportDb,
    user_id: i64,
    period: ActivityPeriod,
    today: NaiveDate,
    tz: &Tz,
) -> Result<ActivitySummary, AppError> {
    load_user(db, user_id)?;
    // One extra day of slack covers any UTC offset; aggregation drops rows
    // outside the window.
    let since = period
        .window_start(today)
        .checked_sub_days(Days::new(1))
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|d| d.and_utc())
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    let log = db.list_activity_since(user_id, since)?;
    Ok(aggregate(&log, period, today, tz))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils::{seed_user, test_db, ts};
    use crate::gamification::award_xp;
    use crate::types::ActionType;

    #[test]
    fn test_ensure_user_is_idempotent_and_keeps_progress() {
        let db = test_db();
        let user = ensure_user(&db, 5, Some("ann"), Some("Ann"), ts(2024, 1, 1, 0, 0)).unwrap();
        assert_eq!(user.level, 1);

        let mut stored = user.clone();
        stored.total_xp = 150;
        stored.level = 2;
        db.save_user_progress(&stored).unwrap();

        let again = ensure_user(&db, 5, Some("ann_new"), None, ts(2024, 2, 1, 0, 0)).unwrap();
        assert_eq!(again.username.as_deref(), Some("ann_new"));
        assert_eq!(again.first_name.as_deref(), Some("Ann"));
        assert_eq!(again.total_xp, 150);
        assert_eq!(again.created_at, ts(2024, 1, 1, 0, 0));
    }

    #[test]
    fn test_user_progress_snapshot() {
        let db = test_db();
        let mut user = seed_user(&db, 1);
        user.total_xp = 110;
        user.level = 2;
        user.current_streak = 1;
        user.longest_streak = 3;
        db.save_user_progress(&user).unwrap();

        let snap = user_progress(&db, 1).unwrap();
        assert_eq!(snap.level.level, 2);
        assert_eq!(snap.level.xp_to_next_level, 290);
        assert_eq!(snap.longest_streak, 3);
        assert_eq!(snap.contact_count, 0);
        assert!(snap.achievements.is_empty());
    }

    #[test]
    fn test_unknown_user_not_found() {
        let db = test_db();
        let err = user_progress(&db, 404).unwrap_err();
        assert!(matches!(err, AppError::NotFound { entity: "user", .. }));
    }

    #[test]
    fn test_activity_summary_reads_log() {
        let db = test_db();
        let mut user = seed_user(&db, 1);
        for at in [ts(2024, 3, 1, 9, 0), ts(2024, 3, 3, 9, 0), ts(2024, 2, 1, 9, 0)] {
            let award = award_xp(&mut user, ActionType::ReminderCompleted, at, None);
            db.insert_activity(&award.activity).unwrap();
        }

        let summary = activity_summary(
            &db,
            1,
            ActivityPeriod::Week,
            NaiveDate::from_ymd_opt(2024, 3, 3).unwrap(),
            &Utc,
        )
        .unwrap();
        assert_eq!(summary.days.len(), 7);
        assert_eq!(summary.total_reminders_completed, 2);
        assert_eq!(summary.total_xp, 40);
    }
}
