//! Job execution engine
//!
//! Runs the background drivers, each of which re-derives its work from
//! persisted state so a manual re-run is always safe:
//! - ReminderScan: create reminders for due contacts, send one digest per user
//! - StatusUpdate: advance event statuses by wall-clock time
//! - EventReminders: notify organizer and participants shortly before start
//! - PurgeSentRegistry: drop stale entries from the in-memory send registry
//!
//! A failure for one user or event is logged and counted, never fatal to the
//! rest of the batch.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, MutexGuard};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::db::{DbEvent, DbReminder, RapportDb};
use crate::error::AppError;
use crate::event_status::classify;
use crate::notification::{send_with_retry, MessageKind, NotificationPayload};
use crate::reminders::{due_subset, new_reminder};
use crate::scheduler::SchedulerMessage;
use crate::state::{create_execution_record, AppState};
use crate::types::{EventStatus, ExecutionTrigger, InvitationStatus, JobId};

/// Counters reported by every driver run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    /// Users, events or registry entries looked at.
    pub examined: usize,
    /// Rows created or updated (reminders, status changes, purged entries).
    pub changed: usize,
    pub notified: usize,
    pub failed: usize,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "examined {}, changed {}, notified {}, failed {}",
            self.examined, self.changed, self.notified, self.failed
        )
    }
}

/// Executor manages job execution
pub struct Executor {
    state: Arc<AppState>,
}

impl Executor {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Start the executor loop
    ///
    /// Listens for job requests from the scheduler until the channel closes.
    pub async fn run(&self, mut receiver: mpsc::Receiver<SchedulerMessage>) {
        while let Some(msg) = receiver.recv().await {
            log::debug!("Executor: running {} (trigger: {:?})", msg.job, msg.trigger);

            if let Err(e) = self.execute_job(msg.job, msg.trigger).await {
                log::error!("Executor: job {} failed: {}", msg.job, e);
            }
        }
    }

    /// Run one job and record it in the execution history.
    pub async fn execute_job(
        &self,
        job: JobId,
        trigger: ExecutionTrigger,
    ) -> Result<RunSummary, AppError> {
        let record = create_execution_record(job, trigger);
        let execution_id = record.id.clone();
        self.state.add_execution_record(record);

        let now = Utc::now();
        let result = match job {
            JobId::ReminderScan => run_reminder_scan(&self.state, now).await,
            JobId::StatusUpdate => run_status_update(&self.state, now),
            JobId::EventReminders => run_event_reminders(&self.state, now).await,
            JobId::PurgeSentRegistry => purge_sent_registry(&self.state, now),
        };

        let finished_at = Utc::now();
        match &result {
            Ok(summary) => {
                self.state.update_execution_record(&execution_id, |r| {
                    r.finished_at = Some(finished_at);
                    r.success = summary.failed == 0;
                    r.summary = Some(summary.to_string());
                });
                // Per-minute jobs are noisy; only log when something happened.
                if summary.changed > 0 || summary.notified > 0 || summary.failed > 0 {
                    log::info!("Executor: {} {}", job, summary);
                }
            }
            Err(e) => {
                let message = e.to_string();
                self.state.update_execution_record(&execution_id, |r| {
                    r.finished_at = Some(finished_at);
                    r.success = false;
                    r.error_message = Some(message);
                });
            }
        }

        result
    }
}

fn lock_db(state: &AppState) -> Result<MutexGuard<'_, RapportDb>, AppError> {
    state
        .db
        .lock()
        .map_err(|_| AppError::Configuration("Database lock poisoned".to_string()))
}

// =============================================================================
// Reminder scan
// =============================================================================

/// Open reminders for one user still waiting for a notification, with the
/// contact names the digest shows.
struct PendingDigest {
    created: usize,
    reminders: Vec<(DbReminder, String)>,
}

/// Create reminders for every due tracked contact and send each user one
/// digest of their open, not-yet-notified reminders.
pub async fn run_reminder_scan(
    state: &AppState,
    now: DateTime<Utc>,
) -> Result<RunSummary, AppError> {
    let today = state.today(now)?;
    let users = lock_db(state)?.list_users_with_tracked_contacts()?;

    let mut summary = RunSummary::default();
    for user_id in users {
        summary.examined += 1;

        let pending = match collect_due_reminders(state, user_id, today, now) {
            Ok(pending) => pending,
            Err(e) => {
                log::warn!("Reminder scan: user {} failed: {}", user_id, e);
                summary.failed += 1;
                continue;
            }
        };
        summary.changed += pending.created;

        if pending.reminders.is_empty() {
            continue;
        }

        match notify_digest(state, user_id, &pending.reminders).await {
            Ok(()) => summary.notified += 1,
            Err(e) => {
                // Left unmarked, so the next scan tries again.
                log::warn!("Reminder scan: digest for user {} not delivered: {}", user_id, e);
                summary.failed += 1;
            }
        }
    }

    log::info!("Reminder scan: {} ({})", summary, today);
    Ok(summary)
}

fn collect_due_reminders(
    state: &AppState,
    user_id: i64,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> Result<PendingDigest, AppError> {
    let db = lock_db(state)?;
    db.with_transaction(|db| {
        let contacts = db.list_tracked_contacts(user_id)?;

        let mut created = 0;
        for contact in due_subset(&contacts, today) {
            if db.insert_reminder_if_absent(&new_reminder(contact, now))? {
                created += 1;
            }
        }

        let names: HashMap<&str, &str> = contacts
            .iter()
            .map(|c| (c.id.as_str(), c.name.as_str()))
            .collect();
        // Reminders of contacts no longer tracked stay open but quiet.
        let reminders = db
            .list_open_reminders(user_id)?
            .into_iter()
            .filter(|r| !r.notification_sent)
            .filter_map(|r| {
                let name = names.get(r.contact_id.as_str())?.to_string();
                Some((r, name))
            })
            .collect();

        Ok::<_, AppError>(PendingDigest { created, reminders })
    })
}

async fn notify_digest(
    state: &AppState,
    user_id: i64,
    reminders: &[(DbReminder, String)],
) -> Result<(), AppError> {
    let payload = digest_payload(reminders);
    let delivery = send_with_retry(
        state.sender.as_ref(),
        user_id,
        MessageKind::ReminderDigest,
        &payload,
        &state.retry_policy,
    )
    .await?;

    let ids: Vec<String> = reminders.iter().map(|(r, _)| r.id.clone()).collect();
    lock_db(state)?.mark_notification_sent(&ids)?;
    log::debug!(
        "Reminder scan: digest of {} sent to user {} after {} attempt(s)",
        ids.len(),
        user_id,
        delivery.attempts
    );
    Ok(())
}

fn digest_payload(reminders: &[(DbReminder, String)]) -> NotificationPayload {
    let title = match reminders.len() {
        1 => "Time to reach out to 1 person".to_string(),
        n => format!("Time to reach out to {} people", n),
    };
    let body = reminders
        .iter()
        .map(|(r, name)| format!("• {} (due {})", name, r.due_date.format("%b %-d")))
        .collect::<Vec<_>>()
        .join("\n");
    NotificationPayload::new(title, body)
}

// =============================================================================
// Event status update
// =============================================================================

/// Move events along `scheduled -> in_progress -> completed` by time. Each
/// change is a compare-and-set on the status read, so a repeat run with the
/// same `now` changes nothing.
pub fn run_status_update(state: &AppState, now: DateTime<Utc>) -> Result<RunSummary, AppError> {
    let db = lock_db(state)?;
    let windows = db.list_active_event_windows()?;
    let current: HashMap<&str, EventStatus> =
        windows.iter().map(|w| (w.id.as_str(), w.status)).collect();
    let changes = classify(&windows, now);

    let mut summary = RunSummary {
        examined: windows.len(),
        ..Default::default()
    };

    let planned = changes
        .to_in_progress
        .iter()
        .map(|id| (id, EventStatus::InProgress))
        .chain(changes.to_completed.iter().map(|id| (id, EventStatus::Completed)));

    for (id, to) in planned {
        let Some(&from) = current.get(id.as_str()) else { continue };
        match db.update_event_status_if(id, from, to, now) {
            Ok(true) => {
                log::debug!("Status update: event {} {} -> {}", id, from.as_str(), to.as_str());
                summary.changed += 1;
            }
            // Someone else moved it first (cancelled, or a concurrent scan).
            Ok(false) => {}
            Err(e) => {
                log::warn!("Status update: event {} failed: {}", id, e);
                summary.failed += 1;
            }
        }
    }

    Ok(summary)
}

// =============================================================================
// Event reminders
// =============================================================================

/// Notify the organizer plus accepted and pending participants of every
/// scheduled event starting within the lead window, once per (event, user).
pub async fn run_event_reminders(
    state: &AppState,
    now: DateTime<Utc>,
) -> Result<RunSummary, AppError> {
    let config = state.config();
    let tz = state.timezone()?;
    let horizon = now + Duration::minutes(config.event_reminder_lead_minutes);

    let mut summary = RunSummary::default();
    let upcoming = collect_upcoming(state, now, horizon, &mut summary)?;

    for (event, recipients) in upcoming {
        let minutes = (event.start_date - now).num_minutes().max(0);
        let payload = NotificationPayload::new(
            format!("Starting soon: {}", event.title),
            format!(
                "Starts at {} (in {} min)",
                event.start_date.with_timezone(&tz).format("%H:%M %Z"),
                minutes
            ),
        );

        for user_id in recipients {
            if !state.sent_registry.mark_if_new(&event.id, user_id, now) {
                continue;
            }
            match send_with_retry(
                state.sender.as_ref(),
                user_id,
                MessageKind::EventReminder,
                &payload,
                &state.retry_policy,
            )
            .await
            {
                Ok(_) => summary.notified += 1,
                Err(e) => {
                    // Free the slot so the next tick can try again.
                    state.sent_registry.unmark(&event.id, user_id);
                    log::warn!(
                        "Event reminders: event {} to user {} failed: {}",
                        event.id,
                        user_id,
                        e
                    );
                    summary.failed += 1;
                }
            }
        }
    }

    Ok(summary)
}

/// Events starting in `[now, horizon)` with their recipients. Events whose
/// participants cannot be read are counted as failed and skipped.
fn collect_upcoming(
    state: &AppState,
    now: DateTime<Utc>,
    horizon: DateTime<Utc>,
    summary: &mut RunSummary,
) -> Result<Vec<(DbEvent, Vec<i64>)>, AppError> {
    let db = lock_db(state)?;
    let events = db.list_events_starting_between(now, horizon)?;

    let mut upcoming = Vec::with_capacity(events.len());
    for event in events {
        summary.examined += 1;
        match db.list_participants(&event.id) {
            Ok(participants) => {
                let mut recipients = BTreeSet::new();
                recipients.insert(event.organizer_id);
                recipients.extend(
                    participants
                        .iter()
                        .filter(|p| p.status != InvitationStatus::Declined)
                        .map(|p| p.user_id),
                );
                upcoming.push((event, recipients.into_iter().collect()));
            }
            Err(e) => {
                log::warn!("Event reminders: participants of {} unreadable: {}", event.id, e);
                summary.failed += 1;
            }
        }
    }
    Ok(upcoming)
}

// =============================================================================
// Registry purge
// =============================================================================

pub fn purge_sent_registry(state: &AppState, now: DateTime<Utc>) -> Result<RunSummary, AppError> {
    let ttl = Duration::minutes(state.config().sent_registry_ttl_minutes);
    let examined = state.sent_registry.len();
    let purged = state.sent_registry.purge_older_than(ttl, now);
    Ok(RunSummary {
        examined,
        changed: purged,
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::db::test_utils::{seed_contact, seed_user, test_db, ts};
    use crate::notification::{DeliveryError, NotificationSender, RetryPolicy};
    use crate::services::events::{create_event, respond_to_invitation, NewEvent};
    use crate::types::Config;

    /// Records every delivery; users in `reject` get a permanent rejection.
    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<(i64, MessageKind, NotificationPayload)>>,
        reject: Mutex<HashSet<i64>>,
    }

    impl Recorder {
        fn sent_to(&self) -> Vec<(i64, MessageKind)> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .map(|(u, k, _)| (*u, *k))
                .collect()
        }
    }

    #[async_trait]
    impl NotificationSender for Recorder {
        async fn send(
            &self,
            user_id: i64,
            kind: MessageKind,
            payload: &NotificationPayload,
        ) -> Result<(), DeliveryError> {
            if self.reject.lock().unwrap().contains(&user_id) {
                return Err(DeliveryError::Rejected("chat not found".into()));
            }
            self.sent.lock().unwrap().push((user_id, kind, payload.clone()));
            Ok(())
        }
    }

    fn state_with(recorder: &Arc<Recorder>) -> AppState {
        let mut state = AppState::new(Config::default(), test_db(), recorder.clone());
        state.retry_policy = RetryPolicy {
            max_attempts: 1,
            initial_backoff_ms: 1,
            max_backoff_ms: 1,
        };
        state
    }

    fn event_at(start: &str, participants: Vec<i64>) -> NewEvent {
        NewEvent {
            title: "Coffee".into(),
            start_date: start.into(),
            duration_minutes: 30,
            participant_ids: participants,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_reminder_scan_creates_and_notifies_once() {
        let recorder = Arc::new(Recorder::default());
        let state = state_with(&recorder);
        {
            let db = state.db.lock().unwrap();
            seed_user(&db, 1);
            seed_contact(&db, "c1", 1);
            seed_contact(&db, "c2", 1);
        }

        // Monthly contacts created Jan 1 are due Jan 31.
        let early = run_reminder_scan(&state, ts(2024, 1, 30, 9, 0)).await.unwrap();
        assert_eq!(early.changed, 0);
        assert!(recorder.sent_to().is_empty());

        let first = run_reminder_scan(&state, ts(2024, 1, 31, 9, 0)).await.unwrap();
        assert_eq!((first.examined, first.changed, first.notified), (1, 2, 1));
        assert_eq!(recorder.sent_to(), vec![(1, MessageKind::ReminderDigest)]);
        let body = recorder.sent.lock().unwrap()[0].2.body.clone();
        assert!(body.contains("Contact c1") && body.contains("Contact c2"));

        // Re-running the same day neither duplicates reminders nor re-sends.
        let again = run_reminder_scan(&state, ts(2024, 1, 31, 9, 5)).await.unwrap();
        assert_eq!((again.changed, again.notified), (0, 0));
        assert_eq!(recorder.sent_to().len(), 1);
        assert_eq!(state.db.lock().unwrap().list_open_reminders(1).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_reminder_scan_isolates_failed_delivery() {
        let recorder = Arc::new(Recorder::default());
        recorder.reject.lock().unwrap().insert(1);
        let state = state_with(&recorder);
        {
            let db = state.db.lock().unwrap();
            seed_user(&db, 1);
            seed_user(&db, 2);
            seed_contact(&db, "c1", 1);
            seed_contact(&db, "c2", 2);
        }

        let summary = run_reminder_scan(&state, ts(2024, 2, 1, 9, 0)).await.unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.notified, 1);
        assert_eq!(recorder.sent_to(), vec![(2, MessageKind::ReminderDigest)]);

        // The failed user's reminder is still pending notification.
        let open = state.db.lock().unwrap().list_open_reminders(1).unwrap();
        assert!(!open[0].notification_sent);

        recorder.reject.lock().unwrap().clear();
        let retry = run_reminder_scan(&state, ts(2024, 2, 1, 10, 0)).await.unwrap();
        assert_eq!((retry.changed, retry.notified, retry.failed), (0, 1, 0));
    }

    #[test]
    fn test_status_update_is_idempotent() {
        let state = state_with(&Arc::new(Recorder::default()));
        {
            let db = state.db.lock().unwrap();
            seed_user(&db, 1);
            create_event(&db, 1, &event_at("2024-03-01T10:00:00Z", vec![]), ts(2024, 2, 1, 0, 0))
                .unwrap();
            create_event(&db, 1, &event_at("2024-03-01T08:00:00Z", vec![]), ts(2024, 2, 1, 0, 0))
                .unwrap();
        }

        let now = ts(2024, 3, 1, 10, 5);
        let first = run_status_update(&state, now).unwrap();
        // One running, one already over: skips straight to completed.
        assert_eq!((first.examined, first.changed), (2, 2));
        let second = run_status_update(&state, now).unwrap();
        assert_eq!((second.examined, second.changed), (1, 0));

        let done = run_status_update(&state, ts(2024, 3, 1, 10, 30)).unwrap();
        assert_eq!(done.changed, 1);
        assert!(state.db.lock().unwrap().list_active_event_windows().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_event_reminders_once_per_recipient() {
        let recorder = Arc::new(Recorder::default());
        let state = state_with(&recorder);
        let event_id = {
            let db = state.db.lock().unwrap();
            for id in [1, 2, 3, 4] {
                seed_user(&db, id);
            }
            let series = create_event(
                &db,
                1,
                &event_at("2024-03-01T10:10:00Z", vec![2, 3, 4]),
                ts(2024, 2, 1, 0, 0),
            )
            .unwrap();
            let id = series.parent.id.clone();
            respond_to_invitation(&db, &id, 2, InvitationStatus::Accepted, ts(2024, 2, 2, 0, 0))
                .unwrap();
            respond_to_invitation(&db, &id, 3, InvitationStatus::Declined, ts(2024, 2, 2, 0, 0))
                .unwrap();
            id
        };

        // Outside the 15 minute lead window.
        let early = run_event_reminders(&state, ts(2024, 3, 1, 9, 50)).await.unwrap();
        assert_eq!(early.notified, 0);

        let due = run_event_reminders(&state, ts(2024, 3, 1, 10, 0)).await.unwrap();
        assert_eq!(due.notified, 3);
        let mut users: Vec<i64> = recorder.sent_to().into_iter().map(|(u, _)| u).collect();
        users.sort();
        assert_eq!(users, vec![1, 2, 4]);
        assert!(state.sent_registry.contains(&event_id, 4));

        let next_tick = run_event_reminders(&state, ts(2024, 3, 1, 10, 1)).await.unwrap();
        assert_eq!(next_tick.notified, 0);
        assert_eq!(recorder.sent_to().len(), 3);
    }

    #[tokio::test]
    async fn test_failed_event_reminder_is_retried_next_tick() {
        let recorder = Arc::new(Recorder::default());
        recorder.reject.lock().unwrap().insert(1);
        let state = state_with(&recorder);
        {
            let db = state.db.lock().unwrap();
            seed_user(&db, 1);
            create_event(&db, 1, &event_at("2024-03-01T10:10:00Z", vec![]), ts(2024, 2, 1, 0, 0))
                .unwrap();
        }

        let failed = run_event_reminders(&state, ts(2024, 3, 1, 10, 0)).await.unwrap();
        assert_eq!((failed.notified, failed.failed), (0, 1));
        assert!(state.sent_registry.is_empty());

        recorder.reject.lock().unwrap().clear();
        let retried = run_event_reminders(&state, ts(2024, 3, 1, 10, 1)).await.unwrap();
        assert_eq!(retried.notified, 1);
    }

    #[test]
    fn test_purge_uses_configured_ttl() {
        let state = state_with(&Arc::new(Recorder::default()));
        state.sent_registry.mark_if_new("e1", 1, ts(2024, 3, 1, 8, 0));
        state.sent_registry.mark_if_new("e2", 1, ts(2024, 3, 1, 9, 30));

        let summary = purge_sent_registry(&state, ts(2024, 3, 1, 10, 30)).unwrap();
        assert_eq!((summary.examined, summary.changed), (2, 1));
        assert!(state.sent_registry.contains("e2", 1));
    }

    #[tokio::test]
    async fn test_execute_job_records_history() {
        let state = Arc::new(state_with(&Arc::new(Recorder::default())));
        let executor = Executor::new(state.clone());

        let summary = executor
            .execute_job(JobId::PurgeSentRegistry, ExecutionTrigger::Manual)
            .await
            .unwrap();
        assert_eq!(summary, RunSummary::default());

        let history = state.get_execution_history(10);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].job, JobId::PurgeSentRegistry);
        assert!(history[0].success);
        assert!(history[0].finished_at.is_some());
        assert_eq!(
            history[0].summary.as_deref(),
            Some("examined 0, changed 0, notified 0, failed 0")
        );
    }
}
