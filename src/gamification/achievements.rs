//! Achievement criteria and evaluation.
//!
//! Criteria are a closed record of optional thresholds. Every present
//! threshold must be met (AND semantics); a record with no thresholds never
//! matches.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::xp::{award_xp_amount, XpAward};
use crate::db::{DbAchievement, DbUser, DbUserAchievement};
use crate::types::ActionType;

/// Thresholds an achievement requires. Stored as JSON in the catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementCriteria {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_streak: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_level: Option<i64>,
    #[serde(
        default,
        rename = "minXP",
        alias = "minXp",
        skip_serializing_if = "Option::is_none"
    )]
    pub min_xp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_contacts: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_reminders_completed: Option<i64>,
}

/// The user state criteria are evaluated against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProgress {
    pub current_streak: i64,
    pub level: i64,
    pub total_xp: i64,
    pub contact_count: i64,
    pub reminders_completed: i64,
}

impl UserProgress {
    pub fn from_user(user: &DbUser, contact_count: i64, reminders_completed: i64) -> Self {
        Self {
            current_streak: user.current_streak,
            level: user.level,
            total_xp: user.total_xp,
            contact_count,
            reminders_completed,
        }
    }
}

impl AchievementCriteria {
    pub fn is_empty(&self) -> bool {
        self.min_streak.is_none()
            && self.min_level.is_none()
            && self.min_xp.is_none()
            && self.min_contacts.is_none()
            && self.min_reminders_completed.is_none()
    }

    pub fn is_satisfied_by(&self, progress: &UserProgress) -> bool {
        if self.is_empty() {
            return false;
        }
        let checks = [
            (self.min_streak, progress.current_streak),
            (self.min_level, progress.level),
            (self.min_xp, progress.total_xp),
            (self.min_contacts, progress.contact_count),
            (self.min_reminders_completed, progress.reminders_completed),
        ];
        checks
            .iter()
            .all(|(threshold, actual)| threshold.map_or(true, |min| *actual >= min))
    }
}

/// One newly unlocked achievement: the join row and its XP award to persist.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementUnlock {
    pub achievement_id: String,
    pub user_achievement: DbUserAchievement,
    pub award: XpAward,
}

/// Evaluate every catalog entry not in `unlocked` against `progress`.
///
/// Each match grants the catalog reward as `ACHIEVEMENT_UNLOCKED` XP on
/// `user`. All criteria are evaluated against the same `progress` snapshot;
/// XP granted here does not trigger further checks in the same call. The
/// storage layer inserts the join rows with `INSERT OR IGNORE`, and callers
/// must only persist awards for rows that were actually inserted.
pub fn check_achievements(
    user: &mut DbUser,
    progress: &UserProgress,
    catalog: &[DbAchievement],
    unlocked: &HashSet<String>,
    now: DateTime<Utc>,
) -> Vec<AchievementUnlock> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut unlocks = Vec::new();

    for achievement in catalog {
        if unlocked.contains(&achievement.id) || !seen.insert(achievement.id.as_str()) {
            continue;
        }
        if !achievement.criteria.is_satisfied_by(progress) {
            continue;
        }
        let award = award_xp_amount(
            user,
            ActionType::AchievementUnlocked,
            achievement.xp_reward,
            now,
            Some(json!({ "achievementId": achievement.id })),
        );
        unlocks.push(AchievementUnlock {
            achievement_id: achievement.id.clone(),
            user_achievement: DbUserAchievement {
                user_id: user.id,
                achievement_id: achievement.id.clone(),
                unlocked_at: now,
            },
            award,
        });
    }
    unlocks
}
