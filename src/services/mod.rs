// Service layer: the operations an HTTP or bot adapter calls.
// Each function validates input first, then does all of its writes inside one
// storage transaction. Anything touching a user's streak/XP also holds that
// user's lock for the whole read-modify-write.

pub mod contacts;
pub mod events;
pub mod reminders;
pub mod users;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::{DbUser, RapportDb};
use crate::error::AppError;
use crate::gamification::{
    check_achievements, level_for_xp, AchievementUnlock, StreakOutcome, UserProgress, XpAward,
};

/// What a gamified action did to the user, for the adapter to celebrate.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GamificationOutcome {
    pub xp_awarded: i64,
    pub total_xp: i64,
    pub level: i64,
    pub leveled_up: bool,
    pub current_streak: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub streak: Option<StreakOutcome>,
    pub unlocked_achievements: Vec<String>,
}

pub(crate) fn load_user(db: &RapportDb, user_id: i64) -> Result<DbUser, AppError> {
    db.get_user(user_id)?
        .ok_or_else(|| AppError::not_found("user", user_id))
}

/// Persist awards already applied to `user`, evaluate achievements against
/// the resulting state, and save the user's counters. Must run inside the
/// caller's transaction.
pub(crate) fn commit_gamification(
    db: &RapportDb,
    user: &mut DbUser,
    level_before: i64,
    streak: Option<StreakOutcome>,
    awards: &[XpAward],
    now: DateTime<Utc>,
) -> Result<GamificationOutcome, AppError> {
    for award in awards {
        db.insert_activity(&award.activity)?;
    }
    let mut xp_awarded: i64 = awards.iter().map(|a| a.activity.xp_awarded).sum();

    let progress = UserProgress::from_user(
        user,
        db.count_contacts(user.id)?,
        db.count_completed_reminders(user.id)?,
    );
    let catalog = db.list_achievements()?;
    let unlocked = db.unlocked_achievement_ids(user.id)?;

    let unlocks = check_achievements(user, &progress, &catalog, &unlocked, now);
    let (unlocked_now, unlock_xp) = record_unlocks(db, user, unlocks)?;
    xp_awarded += unlock_xp;

    db.save_user_progress(user)?;

    if user.level > level_before {
        log::info!("Gamification: user {} reached level {}", user.id, user.level);
    }

    Ok(GamificationOutcome {
        xp_awarded,
        total_xp: user.total_xp,
        level: user.level,
        leveled_up: user.level > level_before,
        current_streak: user.current_streak,
        streak,
        unlocked_achievements: unlocked_now,
    })
}

/// Store unlocks already applied to `user`. Returns the ids that were
/// recorded and the XP they carried. An unlock another writer recorded first
/// is skipped and its XP comes back off `user`.
pub(crate) fn record_unlocks(
    db: &RapportDb,
    user: &mut DbUser,
    unlocks: Vec<AchievementUnlock>,
) -> Result<(Vec<String>, i64), AppError> {
    let mut recorded = Vec::new();
    let mut awarded = 0;
    let mut revoked = 0;
    for unlock in unlocks {
        if db.insert_user_achievement(&unlock.user_achievement)? {
            db.insert_activity(&unlock.award.activity)?;
            awarded += unlock.award.activity.xp_awarded;
            log::info!(
                "Gamification: user {} unlocked '{}' (+{} XP)",
                user.id,
                unlock.achievement_id,
                unlock.award.activity.xp_awarded
            );
            recorded.push(unlock.achievement_id);
        } else {
            revoked += unlock.award.activity.xp_awarded;
        }
    }
    if revoked > 0 {
        log::warn!(
            "Gamification: user {} lost an unlock race, revoking {} XP",
            user.id,
            revoked
        );
        user.total_xp -= revoked;
        user.level = level_for_xp(user.total_xp);
    }
    Ok((recorded, awarded))
}
