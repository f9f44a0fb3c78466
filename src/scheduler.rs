//! Scheduler for cron-based and periodic job execution
//!
//! Manages scheduled jobs with support for:
//! - Cron expression parsing (daily reminder scan)
//! - Timezone-aware scheduling
//! - Per-minute status updates and event reminders, hourly registry purge
//! - Sleep/wake detection via time-jump polling
//! - Missed job handling (runs if within grace period)

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use tokio::sync::mpsc;

use crate::error::AppError;
use crate::state::{parse_timezone, AppState};
use crate::types::{ExecutionTrigger, JobId, ScheduleEntry};

/// Grace period for missed jobs (2 hours)
const MISSED_JOB_GRACE_PERIOD_SECS: i64 = 7200;

/// Time jump threshold to detect sleep/wake (5 minutes)
const TIME_JUMP_THRESHOLD_SECS: i64 = 300;

/// Poll interval for scheduler loop (1 minute)
const POLL_INTERVAL_SECS: u64 = 60;

/// How often the sent-notification registry is purged
const PURGE_INTERVAL_MINUTES: i64 = 60;

/// Message sent to trigger job execution
#[derive(Debug, Clone)]
pub struct SchedulerMessage {
    pub job: JobId,
    pub trigger: ExecutionTrigger,
}

/// Scheduler for managing job execution times
pub struct Scheduler {
    state: Arc<AppState>,
    sender: mpsc::Sender<SchedulerMessage>,
}

impl Scheduler {
    pub fn new(state: Arc<AppState>, sender: mpsc::Sender<SchedulerMessage>) -> Self {
        Self { state, sender }
    }

    /// Start the scheduler loop
    ///
    /// This runs indefinitely, ticking every minute. It also handles
    /// sleep/wake detection.
    pub async fn run(&self) {
        let mut last_check = Utc::now();
        let mut last_purge = Utc::now();

        loop {
            tokio::time::sleep(Duration::from_secs(POLL_INTERVAL_SECS)).await;

            let now = Utc::now();

            // Detect sleep: time jumped more than 5 minutes
            let time_jump = (now - last_check).num_seconds();
            if time_jump > TIME_JUMP_THRESHOLD_SECS {
                log::info!(
                    "Scheduler: detected system wake (time jumped {} seconds), checking for missed jobs",
                    time_jump
                );
                self.check_missed_jobs(now).await;
            }

            self.check_and_run_due_jobs(now).await;

            // Both per-minute drivers derive their work from stored state, so
            // a tick after a long sleep catches up on its own.
            self.trigger_job(JobId::StatusUpdate, ExecutionTrigger::Scheduled)
                .await;
            self.trigger_job(JobId::EventReminders, ExecutionTrigger::Scheduled)
                .await;

            if (now - last_purge).num_minutes() >= PURGE_INTERVAL_MINUTES {
                self.trigger_job(JobId::PurgeSentRegistry, ExecutionTrigger::Scheduled)
                    .await;
                last_purge = now;
            }

            last_check = now;
        }
    }

    /// Check for cron jobs that should run now
    async fn check_and_run_due_jobs(&self, now: DateTime<Utc>) {
        let config = self.state.config();
        let entry = &config.schedules.reminder_scan;
        if !entry.enabled {
            return;
        }

        let last_run = self.state.get_last_scheduled_run(JobId::ReminderScan);
        match should_run_now(entry, last_run, now) {
            Ok(Some(scheduled)) => {
                self.state.set_last_scheduled_run(JobId::ReminderScan, scheduled);
                self.trigger_job(JobId::ReminderScan, ExecutionTrigger::Scheduled)
                    .await;
            }
            Ok(None) => {}
            Err(e) => log::warn!("Scheduler: reminder scan schedule unusable: {}", e),
        }
    }

    /// Check for jobs that were missed during sleep
    async fn check_missed_jobs(&self, now: DateTime<Utc>) {
        let config = self.state.config();
        let entry = &config.schedules.reminder_scan;
        if !entry.enabled {
            return;
        }

        let last_run = self.state.get_last_scheduled_run(JobId::ReminderScan);
        if let Ok(Some(scheduled)) = find_missed_job(entry, last_run, now) {
            log::info!("Scheduler: found missed reminder scan ({}), running now", scheduled);
            self.state.set_last_scheduled_run(JobId::ReminderScan, scheduled);
            self.trigger_job(JobId::ReminderScan, ExecutionTrigger::Missed)
                .await;
        }
    }

    /// Trigger a job execution
    async fn trigger_job(&self, job: JobId, trigger: ExecutionTrigger) {
        if self
            .sender
            .send(SchedulerMessage { job, trigger })
            .await
            .is_err()
        {
            log::error!("Scheduler: failed to send message for {}", job);
        }
    }
}

/// The scheduled time matching `now` (within a 2-minute window), unless that
/// time already ran.
pub fn should_run_now(
    entry: &ScheduleEntry,
    last_run: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>, AppError> {
    let schedule = parse_cron(&entry.cron)?;
    let tz: Tz = parse_timezone(&entry.timezone)?;

    let now_local = now.with_timezone(&tz);

    // Find the first scheduled time after (now - 2 min)
    let mut scheduled_times = schedule.after(&(now_local - chrono::Duration::minutes(2)));

    if let Some(next_time) = scheduled_times.next() {
        let next_utc = next_time.with_timezone(&Utc);
        let diff = (now - next_utc).num_seconds().abs();

        if diff < 120 {
            if let Some(last) = last_run {
                if (last - next_utc).num_seconds().abs() < 60 {
                    return Ok(None);
                }
            }
            return Ok(Some(next_utc));
        }
    }

    Ok(None)
}

/// Find a scheduled time inside the grace period that has not run yet.
pub fn find_missed_job(
    entry: &ScheduleEntry,
    last_run: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>, AppError> {
    let schedule = parse_cron(&entry.cron)?;
    let tz: Tz = parse_timezone(&entry.timezone)?;

    let grace_start =
        now.with_timezone(&tz) - chrono::Duration::seconds(MISSED_JOB_GRACE_PERIOD_SECS);

    for scheduled in schedule.after(&grace_start) {
        let scheduled_utc = scheduled.with_timezone(&Utc);

        if scheduled_utc > now {
            break;
        }

        if let Some(last) = last_run {
            if last >= scheduled_utc {
                continue;
            }
        }

        return Ok(Some(scheduled_utc));
    }

    Ok(None)
}

/// Parse a cron expression
pub fn parse_cron(expr: &str) -> Result<Schedule, AppError> {
    // The cron crate expects 6 fields (with seconds), but we use 5-field format
    // Add "0" for seconds at the start
    let full_expr = format!("0 {}", expr);

    full_expr.parse::<Schedule>().map_err(|e| {
        AppError::Configuration(format!("Invalid cron expression '{}': {}", expr, e))
    })
}

/// Get the next scheduled time for an entry
pub fn get_next_run_time(entry: &ScheduleEntry) -> Result<DateTime<Utc>, AppError> {
    let schedule = parse_cron(&entry.cron)?;
    let tz = parse_timezone(&entry.timezone)?;

    let next = schedule.upcoming(tz).next().ok_or_else(|| {
        AppError::Configuration("No upcoming scheduled time".to_string())
    })?;

    Ok(next.with_timezone(&Utc))
}
