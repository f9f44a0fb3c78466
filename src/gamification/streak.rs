//! Day-granular activity streaks.

use chrono::NaiveDate;
use serde::Serialize;

use crate::db::DbUser;

/// What an activity did to the streak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreakOutcome {
    /// First recorded activity.
    Started,
    /// Already active today.
    Unchanged,
    /// Active yesterday; streak grew by one.
    Extended,
    /// Gap of more than a day; streak restarted at one.
    Reset,
}

/// Apply an activity on `today` to the user's streak counters.
///
/// Sets `last_activity_date` to `today`. Keeps
/// `longest_streak >= current_streak >= 0`; the longest streak never drops.
pub fn update_streak(user: &mut DbUser, today: NaiveDate) -> StreakOutcome {
    let outcome = match user.last_activity_date {
        None => {
            user.current_streak = 1;
            StreakOutcome::Started
        }
        Some(last) => match (today - last).num_days() {
            1 => {
                user.current_streak += 1;
                StreakOutcome::Extended
            }
            gap if gap > 1 => {
                user.current_streak = 1;
                StreakOutcome::Reset
            }
            // Same day, or a clock that moved backwards.
            _ => {
                user.current_streak = user.current_streak.max(1);
                StreakOutcome::Unchanged
            }
        },
    };

    user.longest_streak = user.longest_streak.max(user.current_streak);
    user.last_activity_date = Some(match user.last_activity_date {
        Some(last) if last > today => last,
        _ => today,
    });
    outcome
}
