//! XP awards and level recomputation.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::level::level_for_xp;
use crate::db::{DbActivity, DbUser};
use crate::types::ActionType;

/// Result of one award: the activity row to persist plus the level change.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct XpAward {
    pub activity: DbActivity,
    pub previous_level: i64,
    pub new_level: i64,
}

impl XpAward {
    pub fn leveled_up(&self) -> bool {
        self.new_level > self.previous_level
    }
}

/// Award the fixed reward for `action`.
pub fn award_xp(
    user: &mut DbUser,
    action: ActionType,
    now: DateTime<Utc>,
    metadata: Option<serde_json::Value>,
) -> XpAward {
    award_xp_amount(user, action, action.xp_reward(), now, metadata)
}

/// Award an explicit amount under `action`. Used for achievements, whose
/// reward comes from the catalog. Negative amounts are treated as zero so
/// total XP never decreases.
pub fn award_xp_amount(
    user: &mut DbUser,
    action: ActionType,
    amount: i64,
    now: DateTime<Utc>,
    metadata: Option<serde_json::Value>,
) -> XpAward {
    let amount = amount.max(0);
    let previous_level = user.level;
    user.total_xp = user.total_xp.saturating_add(amount);
    user.level = level_for_xp(user.total_xp);

    XpAward {
        activity: DbActivity {
            id: format!("act-{}", Uuid::new_v4()),
            user_id: user.id,
            action,
            xp_awarded: amount,
            created_at: now,
            metadata,
        },
        previous_level,
        new_level: user.level,
    }
}
