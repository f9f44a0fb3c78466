//! Activity log aggregation into per-day buckets.

use std::collections::BTreeMap;

use chrono::{Days, NaiveDate, TimeZone};
use serde::{Deserialize, Serialize};

use crate::db::DbActivity;
use crate::types::ActionType;

/// Trailing window, inclusive of today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityPeriod {
    Week,
    Month,
}

impl ActivityPeriod {
    pub fn days(&self) -> u64 {
        match self {
            ActivityPeriod::Week => 7,
            ActivityPeriod::Month => 30,
        }
    }

    /// First day of the window ending on `today`.
    pub fn window_start(&self, today: NaiveDate) -> NaiveDate {
        today
            .checked_sub_days(Days::new(self.days() - 1))
            .unwrap_or(NaiveDate::MIN)
    }
}

impl std::str::FromStr for ActivityPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "week" => Ok(ActivityPeriod::Week),
            "month" => Ok(ActivityPeriod::Month),
            other => Err(format!("Unknown activity period: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayActivity {
    pub date: NaiveDate,
    pub reminders_completed: i64,
    pub xp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivitySummary {
    pub period: ActivityPeriod,
    /// One entry per day, oldest first, zero-filled.
    pub days: Vec<DayActivity>,
    pub total_reminders_completed: i64,
    pub total_xp: i64,
}

/// Bucket `log` by calendar day in `tz` over the window ending on `today`.
/// Rows outside the window are ignored.
pub fn aggregate<Tz: TimeZone>(
    log: &[DbActivity],
    period: ActivityPeriod,
    today: NaiveDate,
    tz: &Tz,
) -> ActivitySummary {
    let start = period.window_start(today);
    let mut buckets: BTreeMap<NaiveDate, DayActivity> = start
        .iter_days()
        .take_while(|d| *d <= today)
        .map(|date| {
            (
                date,
                DayActivity {
                    date,
                    reminders_completed: 0,
                    xp: 0,
                },
            )
        })
        .collect();

    for entry in log {
        let day = entry.created_at.with_timezone(tz).date_naive();
        if let Some(bucket) = buckets.get_mut(&day) {
            bucket.xp += entry.xp_awarded;
            if entry.action == ActionType::ReminderCompleted {
                bucket.reminders_completed += 1;
            }
        }
    }

    let days: Vec<DayActivity> = buckets.into_values().collect();
    ActivitySummary {
        period,
        total_reminders_completed: days.iter().map(|d| d.reminders_completed).sum(),
        total_xp: days.iter().map(|d| d.xp).sum(),
        days,
    }
}
