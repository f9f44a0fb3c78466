//! Shared type definitions for the database layer.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::gamification::achievements::AchievementCriteria;
use crate::types::{ActionType, EventStatus, InvitationStatus, RecurrencePattern};

/// Errors specific to database operations.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Failed to create database directory: {0}")]
    CreateDir(std::io::Error),

    #[error("Schema migration failed: {0}")]
    Migration(String),

    #[error("Failed to encode column {column}: {message}")]
    Encode { column: &'static str, message: String },
}

/// Parse a TEXT column into one of the closed domain enums.
pub(crate) fn parse_text<T>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e.into())
    })
}

/// Parse a nullable TEXT column holding JSON.
pub(crate) fn parse_json<T>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: serde::de::DeserializeOwned,
{
    let raw: Option<String> = row.get(idx)?;
    match raw {
        Some(text) => serde_json::from_str(&text).map(Some).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        }),
        None => Ok(None),
    }
}

/// A row from the `users` table: a Telegram user plus gamification counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbUser {
    /// Telegram user id.
    pub id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub current_streak: i64,
    pub longest_streak: i64,
    pub total_xp: i64,
    pub level: i64,
    pub last_activity_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

impl DbUser {
    /// A fresh user with no activity.
    pub fn new(id: i64, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            username: None,
            first_name: None,
            current_streak: 0,
            longest_streak: 0,
            total_xp: 0,
            level: 1,
            last_activity_date: None,
            created_at,
        }
    }
}

/// A row from the `contacts` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbContact {
    pub id: String,
    pub user_id: i64,
    pub name: String,
    /// `weekly`, `monthly`, `quarterly` or `custom`. Kept as text so rows
    /// written by older clients still load; unknown values fall back to 30 days.
    pub cadence: String,
    pub custom_days: Option<i64>,
    pub tracked: bool,
    pub last_contact_date: Option<DateTime<Utc>>,
    /// Cached next due date. Recomputed whenever the contact is reached.
    pub next_reminder_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A row from the `reminders` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbReminder {
    pub id: String,
    pub contact_id: String,
    pub user_id: i64,
    pub due_date: NaiveDate,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub notification_sent: bool,
    pub created_at: DateTime<Utc>,
}

/// A row from the `events` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbEvent {
    pub id: String,
    pub organizer_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub event_type: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub duration_minutes: i64,
    pub status: EventStatus,
    pub recurrence_pattern: Option<RecurrencePattern>,
    pub recurrence_interval: Option<i64>,
    /// Origin of a generated occurrence. Back-reference only; children are
    /// independent rows removed by the FK cascade.
    pub parent_event_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A row from `event_participants`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbEventParticipant {
    pub event_id: String,
    pub user_id: i64,
    pub status: InvitationStatus,
    pub responded_at: Option<DateTime<Utc>>,
}

/// A row from the `achievements` catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbAchievement {
    pub id: String,
    pub name: String,
    pub description: String,
    pub criteria: AchievementCriteria,
    pub xp_reward: i64,
}

/// A row from `user_achievements`. At most one per (user, achievement).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbUserAchievement {
    pub user_id: i64,
    pub achievement_id: String,
    pub unlocked_at: DateTime<Utc>,
}

/// A row from `activity_log`. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbActivity {
    pub id: String,
    pub user_id: i64,
    pub action: ActionType,
    pub xp_awarded: i64,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}
