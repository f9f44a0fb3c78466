//! Shared types: configuration, job identifiers, and the closed domain enums
//! (cadence, recurrence pattern, event status, invitation status, XP action).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Configuration
// =============================================================================

/// Application configuration, read from `~/.rapport/config.json`.
///
/// Every field has a default so a missing or partial file still yields a
/// usable config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// IANA timezone used to decide what "today" is for the drivers.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub schedules: Schedules,
    /// How far ahead of an event's start its reminder goes out.
    #[serde(default = "default_event_reminder_lead_minutes")]
    pub event_reminder_lead_minutes: i64,
    /// Entries in the sent-notification registry older than this are purged.
    #[serde(default = "default_sent_registry_ttl_minutes")]
    pub sent_registry_ttl_minutes: i64,
    #[serde(default)]
    pub telegram: TelegramConfig,
    /// Override for the database location (defaults to `~/.rapport/rapport.db`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            schedules: Schedules::default(),
            event_reminder_lead_minutes: default_event_reminder_lead_minutes(),
            sent_registry_ttl_minutes: default_sent_registry_ttl_minutes(),
            telegram: TelegramConfig::default(),
            database_path: None,
        }
    }
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_event_reminder_lead_minutes() -> i64 {
    15
}

fn default_sent_registry_ttl_minutes() -> i64 {
    120
}

/// Cron schedules for the daily jobs. The per-minute jobs run on every tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedules {
    #[serde(default = "ScheduleEntry::default_reminder_scan")]
    pub reminder_scan: ScheduleEntry,
}

impl Default for Schedules {
    fn default() -> Self {
        Self {
            reminder_scan: ScheduleEntry::default_reminder_scan(),
        }
    }
}

/// A single schedule entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleEntry {
    pub enabled: bool,
    pub cron: String,
    pub timezone: String,
}

impl ScheduleEntry {
    /// Default schedule for the reminder scan: 9 AM daily
    pub fn default_reminder_scan() -> Self {
        Self {
            enabled: true,
            cron: "0 9 * * *".to_string(),
            timezone: "UTC".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelegramConfig {
    /// Bot token. `RAPPORT_BOT_TOKEN` takes precedence when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_token: Option<String>,
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            api_base: default_api_base(),
        }
    }
}

fn default_api_base() -> String {
    "https://api.telegram.org".to_string()
}

// =============================================================================
// Jobs
// =============================================================================

/// Background job identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobId {
    /// Daily: find due contacts, create reminders, notify users.
    ReminderScan,
    /// Per minute: advance event statuses.
    StatusUpdate,
    /// Per minute: notify participants of events about to start.
    EventReminders,
    /// Hourly: drop stale entries from the sent-notification registry.
    PurgeSentRegistry,
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobId::ReminderScan => write!(f, "reminder_scan"),
            JobId::StatusUpdate => write!(f, "status_update"),
            JobId::EventReminders => write!(f, "event_reminders"),
            JobId::PurgeSentRegistry => write!(f, "purge_sent_registry"),
        }
    }
}

impl std::str::FromStr for JobId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "reminder_scan" | "scan-reminders" => Ok(JobId::ReminderScan),
            "status_update" | "update-statuses" => Ok(JobId::StatusUpdate),
            "event_reminders" | "event-reminders" => Ok(JobId::EventReminders),
            "purge_sent_registry" | "purge-sent" => Ok(JobId::PurgeSentRegistry),
            _ => Err(format!("Unknown job: {}", s)),
        }
    }
}

/// What triggered the execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionTrigger {
    Scheduled,
    Manual,
    Missed,
}

/// Record of a job execution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    pub id: String,
    pub job: JobId,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub success: bool,
    pub summary: Option<String>,
    pub error_message: Option<String>,
    pub trigger: ExecutionTrigger,
}

// =============================================================================
// Domain enums
// =============================================================================

/// How often a contact should be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cadence {
    Weekly,
    Monthly,
    Quarterly,
    /// Uses the contact's own day count.
    Custom,
}

impl Cadence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Cadence::Weekly => "weekly",
            Cadence::Monthly => "monthly",
            Cadence::Quarterly => "quarterly",
            Cadence::Custom => "custom",
        }
    }
}

impl std::str::FromStr for Cadence {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "weekly" => Ok(Cadence::Weekly),
            "monthly" => Ok(Cadence::Monthly),
            "quarterly" => Ok(Cadence::Quarterly),
            "custom" => Ok(Cadence::Custom),
            _ => Err(format!("Unknown cadence: {}", s)),
        }
    }
}

/// Recurrence pattern for an event series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecurrencePattern {
    Daily,
    Weekly,
    Monthly,
    Custom,
}

impl RecurrencePattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecurrencePattern::Daily => "daily",
            RecurrencePattern::Weekly => "weekly",
            RecurrencePattern::Monthly => "monthly",
            RecurrencePattern::Custom => "custom",
        }
    }
}

impl std::str::FromStr for RecurrencePattern {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "daily" => Ok(RecurrencePattern::Daily),
            "weekly" => Ok(RecurrencePattern::Weekly),
            "monthly" => Ok(RecurrencePattern::Monthly),
            "custom" => Ok(RecurrencePattern::Custom),
            _ => Err(format!("Unknown recurrence pattern: {}", s)),
        }
    }
}

/// Lifecycle status of a calendar event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Scheduled => "scheduled",
            EventStatus::InProgress => "in_progress",
            EventStatus::Completed => "completed",
            EventStatus::Cancelled => "cancelled",
        }
    }

    /// Completed and cancelled events never change status again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, EventStatus::Completed | EventStatus::Cancelled)
    }
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(EventStatus::Scheduled),
            "in_progress" => Ok(EventStatus::InProgress),
            "completed" => Ok(EventStatus::Completed),
            "cancelled" => Ok(EventStatus::Cancelled),
            _ => Err(format!("Unknown event status: {}", s)),
        }
    }
}

/// A participant's answer to an event invitation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Declined,
}

impl InvitationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvitationStatus::Pending => "pending",
            InvitationStatus::Accepted => "accepted",
            InvitationStatus::Declined => "declined",
        }
    }
}

impl std::str::FromStr for InvitationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(InvitationStatus::Pending),
            "accepted" => Ok(InvitationStatus::Accepted),
            "declined" => Ok(InvitationStatus::Declined),
            _ => Err(format!("Unknown invitation status: {}", s)),
        }
    }
}

/// Actions that earn XP. Logged verbatim in the activity log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    ContactAdded,
    ReminderCompleted,
    StreakMaintained,
    AchievementUnlocked,
}

impl ActionType {
    /// Fixed XP reward table.
    pub fn xp_reward(&self) -> i64 {
        match self {
            ActionType::ContactAdded => 10,
            ActionType::ReminderCompleted => 20,
            ActionType::StreakMaintained => 5,
            ActionType::AchievementUnlocked => 50,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::ContactAdded => "CONTACT_ADDED",
            ActionType::ReminderCompleted => "REMINDER_COMPLETED",
            ActionType::StreakMaintained => "STREAK_MAINTAINED",
            ActionType::AchievementUnlocked => "ACHIEVEMENT_UNLOCKED",
        }
    }
}

impl std::str::FromStr for ActionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CONTACT_ADDED" => Ok(ActionType::ContactAdded),
            "REMINDER_COMPLETED" => Ok(ActionType::ReminderCompleted),
            "STREAK_MAINTAINED" => Ok(ActionType::StreakMaintained),
            "ACHIEVEMENT_UNLOCKED" => Ok(ActionType::AchievementUnlocked),
            _ => Err(format!("Unknown action type: {}", s)),
        }
    }
}
