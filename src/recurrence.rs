//! Recurrence generator for event series.
//!
//! Given an origin start, a pattern and a count, produces the concrete
//! (start, end) pairs of the occurrences that follow the origin. Generation
//! is pure: the same spec always yields the same sequence.
//!
//! Monthly stepping clamps to the last day of shorter months and steps from
//! the previous occurrence, so once a series is clamped it stays clamped:
//! Jan 31 -> Feb 29 -> Mar 29 -> Apr 29 ...

use chrono::{DateTime, Days, Months, NaiveDate, NaiveDateTime, TimeDelta, Utc};

use crate::error::AppError;
use crate::types::RecurrencePattern;

/// Occurrences generated when the caller does not ask for a count.
pub const DEFAULT_OCCURRENCES: u32 = 10;

/// Upper bound on generated occurrences per series.
pub const MAX_OCCURRENCES: u32 = 52;

/// Longest accepted event: 31 days.
pub const MAX_DURATION_MINUTES: i64 = 31 * 24 * 60;

/// Longest accepted custom step: one leap year.
pub const MAX_INTERVAL_DAYS: i64 = 366;

/// A validated recurrence request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecurrenceSpec {
    pub start: DateTime<Utc>,
    pub pattern: RecurrencePattern,
    /// Day step for `Custom`; ignored otherwise.
    pub interval: Option<i64>,
    /// Occurrences after the origin.
    pub count: u32,
    pub duration_minutes: i64,
}

/// One generated occurrence. Index 0 is the origin and is never generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occurrence {
    pub index: u32,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl RecurrenceSpec {
    /// Validate raw request fields. Fails before anything is generated.
    pub fn parse(
        start: &str,
        pattern: &str,
        interval: Option<i64>,
        count: Option<i64>,
        duration_minutes: i64,
    ) -> Result<Self, AppError> {
        let start = parse_start(start)?;
        let pattern = pattern
            .parse::<RecurrencePattern>()
            .map_err(AppError::Validation)?;
        Self::new(start, pattern, interval, count, duration_minutes)
    }

    /// Validate typed request fields.
    pub fn new(
        start: DateTime<Utc>,
        pattern: RecurrencePattern,
        interval: Option<i64>,
        count: Option<i64>,
        duration_minutes: i64,
    ) -> Result<Self, AppError> {
        if pattern == RecurrencePattern::Custom {
            match interval {
                Some(days) if days > 0 && days <= MAX_INTERVAL_DAYS => {}
                _ => {
                    return Err(AppError::validation(format!(
                        "custom recurrence requires an interval between 1 and {} days",
                        MAX_INTERVAL_DAYS
                    )))
                }
            }
        }

        let count = match count {
            None => DEFAULT_OCCURRENCES,
            Some(n) if n >= 1 && n <= MAX_OCCURRENCES as i64 => n as u32,
            Some(n) => {
                return Err(AppError::validation(format!(
                    "occurrence count must be between 1 and {}, got {}",
                    MAX_OCCURRENCES, n
                )))
            }
        };

        event_end(start, duration_minutes)?;

        let spec = Self {
            start,
            pattern,
            interval,
            count,
            duration_minutes,
        };
        // Every occurrence must be representable; a short walk means the
        // series ran off the end of the calendar.
        if spec.occurrences().count() != count as usize {
            return Err(AppError::validation(
                "recurrence runs past the supported date range",
            ));
        }
        Ok(spec)
    }

    /// Lazily walk the occurrences. Each call starts over from the origin.
    /// Stops early only if a date is out of range, which `new` rules out.
    pub fn occurrences(&self) -> impl Iterator<Item = Occurrence> + '_ {
        let mut current = self.start;
        (1..=self.count).map_while(move |index| {
            current = next_occurrence(current, self.pattern, self.interval)?;
            let end = event_end(current, self.duration_minutes).ok()?;
            Some(Occurrence {
                index,
                start: current,
                end,
            })
        })
    }
}

/// End of an event starting at `start`. Rejects non-positive or overlong
/// durations, and ends that fall outside the calendar.
pub fn event_end(start: DateTime<Utc>, duration_minutes: i64) -> Result<DateTime<Utc>, AppError> {
    if duration_minutes <= 0 || duration_minutes > MAX_DURATION_MINUTES {
        return Err(AppError::validation(format!(
            "duration must be between 1 and {} minutes, got {}",
            MAX_DURATION_MINUTES, duration_minutes
        )));
    }
    TimeDelta::try_minutes(duration_minutes)
        .and_then(|d| start.checked_add_signed(d))
        .ok_or_else(|| AppError::validation("event end is outside the supported date range"))
}

/// Generate every occurrence of the series (excluding the origin).
pub fn generate(spec: &RecurrenceSpec) -> Vec<Occurrence> {
    spec.occurrences().collect()
}

/// Step one period forward from `date`. `None` when the result is out of
/// range.
pub fn next_occurrence(
    date: DateTime<Utc>,
    pattern: RecurrencePattern,
    interval: Option<i64>,
) -> Option<DateTime<Utc>> {
    match pattern {
        RecurrencePattern::Daily => date.checked_add_days(Days::new(1)),
        RecurrencePattern::Weekly => date.checked_add_days(Days::new(7)),
        // chrono clamps to the last valid day of the target month.
        RecurrencePattern::Monthly => date.checked_add_months(Months::new(1)),
        RecurrencePattern::Custom => {
            let days = interval.unwrap_or(1).max(1) as u64;
            date.checked_add_days(Days::new(days))
        }
    }
}

/// Parse an event start. Accepts RFC 3339, `YYYY-MM-DDTHH:MM[:SS]` (UTC),
/// or a bare `YYYY-MM-DD` (midnight UTC).
pub fn parse_start(raw: &str) -> Result<DateTime<Utc>, AppError> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Ok(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc());
        }
    }
    Err(AppError::validation(format!("invalid start date: '{}'", raw)))
}
