//! Gamification engine: streaks, XP and levels, achievements, and activity
//! aggregation.
//!
//! Everything here mutates an in-memory `DbUser` and returns the rows the
//! caller must persist. Callers hold the per-user lock and a storage
//! transaction around the whole read-modify-write (see `services::reminders`).

pub mod achievements;
pub mod activity;
pub mod level;
pub mod streak;
pub mod xp;

pub use achievements::{check_achievements, AchievementCriteria, AchievementUnlock, UserProgress};
pub use activity::{aggregate, ActivityPeriod, ActivitySummary, DayActivity};
pub use level::{level_for_xp, level_progress, xp_for_level, LevelProgress};
pub use streak::{update_streak, StreakOutcome};
pub use xp::{award_xp, XpAward};
