// Event service: series creation, edits, cancellation, invitations.
//
// A recurring event is stored as a parent row (carrying the pattern) plus one
// plain child row per generated occurrence, linked by `parent_event_id`.
// Participants are invited to every row of the series.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{DbEvent, DbEventParticipant, RapportDb};
use crate::error::AppError;
use crate::recurrence::{event_end, generate, parse_start, RecurrenceSpec, MAX_DURATION_MINUTES};
use crate::types::{EventStatus, InvitationStatus};

const DEFAULT_EVENT_TYPE: &str = "meeting";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurrenceRequest {
    pub pattern: String,
    #[serde(default)]
    pub interval: Option<i64>,
    #[serde(default)]
    pub count: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEvent {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub event_type: Option<String>,
    pub start_date: String,
    pub duration_minutes: i64,
    #[serde(default)]
    pub recurrence: Option<RecurrenceRequest>,
    #[serde(default)]
    pub participant_ids: Vec<i64>,
}

/// Partial update of one occurrence.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub event_type: Option<String>,
    pub start_date: Option<String>,
    pub duration_minutes: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedSeries {
    pub parent: DbEvent,
    pub occurrences: Vec<DbEvent>,
    pub participant_ids: Vec<i64>,
}

fn validate_title(title: &str) -> Result<String, AppError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(AppError::validation("event title must not be empty"));
    }
    Ok(title.to_string())
}

fn validate_duration(minutes: i64) -> Result<i64, AppError> {
    if minutes <= 0 || minutes > MAX_DURATION_MINUTES {
        return Err(AppError::validation(format!(
            "duration must be between 1 and {} minutes, got {}",
            MAX_DURATION_MINUTES, minutes
        )));
    }
    Ok(minutes)
}

fn event_type_or_default(event_type: Option<&str>) -> String {
    event_type
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(DEFAULT_EVENT_TYPE)
        .to_string()
}

fn load_event(db: &RapportDb, event_id: &str) -> Result<DbEvent, AppError> {
    db.get_event(event_id)?
        .ok_or_else(|| AppError::not_found("event", event_id))
}

/// An event as seen by its organizer. Other users get NotFound.
fn load_owned_event(db: &RapportDb, event_id: &str, organizer_id: i64) -> Result<DbEvent, AppError> {
    let event = load_event(db, event_id)?;
    if event.organizer_id != organizer_id {
        return Err(AppError::not_found("event", event_id));
    }
    Ok(event)
}

/// Create an event, plus its generated occurrences when recurring.
///
/// All input, including the recurrence request, is validated before any row
/// is written.
pub fn create_event(
    db: &RapportDb,
    organizer_id: i64,
    input: &NewEvent,
    now: DateTime<Utc>,
) -> Result<CreatedSeries, AppError> {
    let title = validate_title(&input.title)?;
    let duration_minutes = validate_duration(input.duration_minutes)?;
    let start = parse_start(&input.start_date)?;
    let end = event_end(start, duration_minutes)?;
    let spec = match &input.recurrence {
        Some(r) => Some(RecurrenceSpec::parse(
            &input.start_date,
            &r.pattern,
            r.interval,
            r.count,
            duration_minutes,
        )?),
        None => None,
    };

    let mut participant_ids: Vec<i64> = input
        .participant_ids
        .iter()
        .copied()
        .filter(|id| *id != organizer_id)
        .collect();
    participant_ids.sort_unstable();
    participant_ids.dedup();

    let parent = DbEvent {
        id: format!("evt-{}", Uuid::new_v4()),
        organizer_id,
        title,
        description: input.description.clone(),
        event_type: event_type_or_default(input.event_type.as_deref()),
        start_date: start,
        end_date: end,
        duration_minutes,
        status: EventStatus::Scheduled,
        recurrence_pattern: spec.as_ref().map(|s| s.pattern),
        recurrence_interval: spec.as_ref().and_then(|s| s.interval),
        parent_event_id: None,
        created_at: now,
        updated_at: now,
    };

    let occurrences: Vec<DbEvent> = spec
        .as_ref()
        .map(generate)
        .unwrap_or_default()
        .into_iter()
        .map(|occ| DbEvent {
            id: format!("evt-{}", Uuid::new_v4()),
            start_date: occ.start,
            end_date: occ.end,
            recurrence_pattern: None,
            recurrence_interval: None,
            parent_event_id: Some(parent.id.clone()),
            ..parent.clone()
        })
        .collect();

    db.with_transaction(|db| {
        if db.get_user(organizer_id)?.is_none() {
            return Err(AppError::not_found("user", organizer_id));
        }
        for user_id in &participant_ids {
            if db.get_user(*user_id)?.is_none() {
                return Err(AppError::not_found("user", user_id));
            }
        }

        for event in std::iter::once(&parent).chain(occurrences.iter()) {
            db.insert_event(event)?;
            for user_id in &participant_ids {
                db.add_participant(&event.id, *user_id)?;
            }
        }
        Ok(())
    })?;

    log::info!(
        "Events: user {} created '{}' with {} occurrence(s), {} participant(s)",
        organizer_id,
        parent.title,
        occurrences.len() + 1,
        participant_ids.len()
    );

    Ok(CreatedSeries {
        parent,
        occurrences,
        participant_ids,
    })
}

/// Edit one occurrence. Terminal events cannot change, and an event that is
/// already running cannot be moved or resized.
pub fn update_event(
    db: &RapportDb,
    organizer_id: i64,
    event_id: &str,
    update: &EventUpdate,
    now: DateTime<Utc>,
) -> Result<DbEvent, AppError> {
    let title = update.title.as_deref().map(validate_title).transpose()?;
    let duration = update.duration_minutes.map(validate_duration).transpose()?;
    let start = update.start_date.as_deref().map(parse_start).transpose()?;

    db.with_transaction(|db| {
        let mut event = load_owned_event(db, event_id, organizer_id)?;
        if event.status.is_terminal() {
            return Err(AppError::conflict(format!(
                "event {} is {} and can no longer be changed",
                event_id, event.status
            )));
        }
        let reschedules = start.is_some() || duration.is_some();
        if reschedules && event.status == EventStatus::InProgress {
            return Err(AppError::conflict(format!(
                "event {} is in progress and cannot be rescheduled",
                event_id
            )));
        }
        let new_start = start.unwrap_or(event.start_date);
        let new_duration = duration.unwrap_or(event.duration_minutes);
        let end = event_end(new_start, new_duration)?;

        if let Some(title) = title {
            event.title = title;
        }
        if let Some(description) = &update.description {
            event.description = Some(description.clone()).filter(|d| !d.trim().is_empty());
        }
        if update.event_type.is_some() {
            event.event_type = event_type_or_default(update.event_type.as_deref());
        }
        event.start_date = new_start;
        event.duration_minutes = new_duration;
        event.end_date = end;
        event.updated_at = now;

        db.update_event(&event)?;
        Ok(event)
    })
}

/// Cancel an event, or every still-open occurrence of its series.
/// Returns the ids that were cancelled.
pub fn cancel_event(
    db: &RapportDb,
    organizer_id: i64,
    event_id: &str,
    whole_series: bool,
    now: DateTime<Utc>,
) -> Result<Vec<String>, AppError> {
    db.with_transaction(|db| {
        let event = load_owned_event(db, event_id, organizer_id)?;
        if event.status.is_terminal() {
            return Err(AppError::conflict(format!(
                "event {} is already {}",
                event_id, event.status
            )));
        }

        let targets = if whole_series {
            let root = event.parent_event_id.clone().unwrap_or_else(|| event.id.clone());
            db.list_event_series(&root)?
        } else {
            vec![event]
        };

        let mut cancelled = Vec::new();
        for target in targets.iter().filter(|e| !e.status.is_terminal()) {
            if db.update_event_status_if(&target.id, target.status, EventStatus::Cancelled, now)? {
                cancelled.push(target.id.clone());
            }
        }
        if cancelled.is_empty() {
            return Err(AppError::conflict(format!(
                "event {} changed status concurrently",
                event_id
            )));
        }
        log::info!("Events: cancelled {} event(s) from {}", cancelled.len(), event_id);
        Ok(cancelled)
    })
}

/// Accept or decline an invitation. Each invitation is answered once.
pub fn respond_to_invitation(
    db: &RapportDb,
    event_id: &str,
    user_id: i64,
    response: InvitationStatus,
    now: DateTime<Utc>,
) -> Result<DbEventParticipant, AppError> {
    if response == InvitationStatus::Pending {
        return Err(AppError::validation("response must be accepted or declined"));
    }

    db.with_transaction(|db| {
        let event = load_event(db, event_id)?;
        let participant = db
            .get_participant(event_id, user_id)?
            .ok_or_else(|| AppError::not_found("invitation", format!("{}/{}", event_id, user_id)))?;

        if event.status.is_terminal() {
            return Err(AppError::conflict(format!(
                "event {} is {}; invitations are closed",
                event_id, event.status
            )));
        }
        if participant.status != InvitationStatus::Pending
            || !db.respond_to_invitation(event_id, user_id, response, now)?
        {
            return Err(AppError::conflict(format!(
                "user {} already responded to event {}",
                user_id, event_id
            )));
        }

        db.get_participant(event_id, user_id)?
            .ok_or_else(|| AppError::not_found("invitation", format!("{}/{}", event_id, user_id)))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils::{seed_user, test_db, ts};
    use crate::types::RecurrencePattern;

    fn monthly_event(participants: Vec<i64>) -> NewEvent {
        NewEvent {
            title: "Dinner".into(),
            start_date: "2024-01-31T19:00:00Z".into(),
            duration_minutes: 120,
            recurrence: Some(RecurrenceRequest {
                pattern: "monthly".into(),
                interval: None,
                count: Some(3),
            }),
            participant_ids: participants,
            ..Default::default()
        }
    }

    #[test]
    fn test_create_recurring_series() {
        let db = test_db();
        seed_user(&db, 1);
        seed_user(&db, 2);
        seed_user(&db, 3);

        let series = create_event(&db, 1, &monthly_event(vec![3, 2, 2, 1]), ts(2024, 1, 1, 0, 0)).unwrap();
        assert_eq!(series.participant_ids, vec![2, 3]);
        assert_eq!(series.parent.recurrence_pattern, Some(RecurrencePattern::Monthly));
        assert_eq!(series.parent.end_date, ts(2024, 1, 31, 21, 0));
        assert_eq!(series.occurrences.len(), 3);
        assert_eq!(series.occurrences[0].start_date, ts(2024, 2, 29, 19, 0));
        assert_eq!(series.occurrences[1].start_date, ts(2024, 3, 29, 19, 0));
        for occ in &series.occurrences {
            assert_eq!(occ.parent_event_id.as_deref(), Some(series.parent.id.as_str()));
            assert_eq!(occ.recurrence_pattern, None);
            assert_eq!(occ.end_date - occ.start_date, chrono::Duration::minutes(120));
        }

        let stored = db.list_event_series(&series.parent.id).unwrap();
        assert_eq!(stored.len(), 4);
        for event in &stored {
            let invited: Vec<i64> = db
                .list_participants(&event.id)
                .unwrap()
                .into_iter()
                .map(|p| p.user_id)
                .collect();
            assert_eq!(invited, vec![2, 3]);
        }
    }

    #[test]
    fn test_create_single_event() {
        let db = test_db();
        seed_user(&db, 1);
        let input = NewEvent {
            title: "Coffee".into(),
            start_date: "2024-05-01 08:30".into(),
            duration_minutes: 30,
            ..Default::default()
        };
        let series = create_event(&db, 1, &input, ts(2024, 4, 1, 0, 0)).unwrap();
        assert!(series.occurrences.is_empty());
        assert_eq!(series.parent.event_type, "meeting");
        assert_eq!(series.parent.recurrence_pattern, None);
        assert_eq!(series.parent.end_date, ts(2024, 5, 1, 9, 0));
    }

    #[test]
    fn test_invalid_recurrence_writes_nothing() {
        let db = test_db();
        seed_user(&db, 1);
        let mut input = monthly_event(vec![]);
        input.recurrence = Some(RecurrenceRequest {
            pattern: "custom".into(),
            interval: None,
            count: None,
        });
        let err = create_event(&db, 1, &input, ts(2024, 1, 1, 0, 0)).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(db.list_active_event_windows().unwrap().is_empty());
    }

    #[test]
    fn test_oversized_duration_and_interval_rejected() {
        let db = test_db();
        seed_user(&db, 1);
        let huge_duration = NewEvent {
            title: "Retreat".into(),
            start_date: "2024-05-01T08:00:00Z".into(),
            duration_minutes: 1_000_000_000_000,
            ..Default::default()
        };
        let err = create_event(&db, 1, &huge_duration, ts(2024, 4, 1, 0, 0)).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let mut huge_interval = monthly_event(vec![]);
        huge_interval.recurrence = Some(RecurrenceRequest {
            pattern: "custom".into(),
            interval: Some(i64::MAX),
            count: Some(1),
        });
        let err = create_event(&db, 1, &huge_interval, ts(2024, 1, 1, 0, 0)).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(db.list_active_event_windows().unwrap().is_empty());

        let series = create_event(&db, 1, &monthly_event(vec![]), ts(2024, 1, 1, 0, 0)).unwrap();
        let err = update_event(
            &db,
            1,
            &series.parent.id,
            &EventUpdate {
                duration_minutes: Some(i64::MAX),
                ..Default::default()
            },
            ts(2024, 1, 2, 0, 0),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(db.get_event(&series.parent.id).unwrap().unwrap().duration_minutes, 120);
    }

    #[test]
    fn test_unknown_participant_rolls_back() {
        let db = test_db();
        seed_user(&db, 1);
        let err = create_event(&db, 1, &monthly_event(vec![77]), ts(2024, 1, 1, 0, 0)).unwrap_err();
        assert!(matches!(err, AppError::NotFound { entity: "user", .. }));
        assert!(db.list_active_event_windows().unwrap().is_empty());
    }

    #[test]
    fn test_update_recomputes_end_and_rejects_terminal() {
        let db = test_db();
        seed_user(&db, 1);
        let series = create_event(&db, 1, &monthly_event(vec![]), ts(2024, 1, 1, 0, 0)).unwrap();
        let id = series.parent.id.clone();

        let updated = update_event(
            &db,
            1,
            &id,
            &EventUpdate {
                duration_minutes: Some(45),
                ..Default::default()
            },
            ts(2024, 1, 2, 0, 0),
        )
        .unwrap();
        assert_eq!(updated.end_date, ts(2024, 1, 31, 19, 45));
        assert_eq!(db.get_event(&id).unwrap().unwrap().duration_minutes, 45);

        cancel_event(&db, 1, &id, false, ts(2024, 1, 3, 0, 0)).unwrap();
        let err = update_event(
            &db,
            1,
            &id,
            &EventUpdate {
                title: Some("Lunch".into()),
                ..Default::default()
            },
            ts(2024, 1, 4, 0, 0),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn test_in_progress_cannot_be_rescheduled() {
        let db = test_db();
        seed_user(&db, 1);
        let series = create_event(&db, 1, &monthly_event(vec![]), ts(2024, 1, 1, 0, 0)).unwrap();
        let id = series.parent.id.clone();
        db.update_event_status_if(&id, EventStatus::Scheduled, EventStatus::InProgress, ts(2024, 1, 31, 19, 0))
            .unwrap();

        let err = update_event(
            &db,
            1,
            &id,
            &EventUpdate {
                start_date: Some("2024-02-01T19:00:00Z".into()),
                ..Default::default()
            },
            ts(2024, 1, 31, 19, 5),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let renamed = update_event(
            &db,
            1,
            &id,
            &EventUpdate {
                title: Some("Dinner (moved inside)".into()),
                ..Default::default()
            },
            ts(2024, 1, 31, 19, 5),
        )
        .unwrap();
        assert_eq!(renamed.status, EventStatus::InProgress);
    }

    #[test]
    fn test_cancel_whole_series_skips_terminal() {
        let db = test_db();
        seed_user(&db, 1);
        let series = create_event(&db, 1, &monthly_event(vec![]), ts(2024, 1, 1, 0, 0)).unwrap();
        let done = series.parent.id.clone();
        db.update_event_status_if(&done, EventStatus::Scheduled, EventStatus::Completed, ts(2024, 2, 1, 0, 0))
            .unwrap();

        let cancelled = cancel_event(&db, 1, &series.occurrences[1].id, true, ts(2024, 2, 2, 0, 0)).unwrap();
        assert_eq!(cancelled.len(), 3);
        assert!(!cancelled.contains(&done));
        assert_eq!(db.get_event(&done).unwrap().unwrap().status, EventStatus::Completed);

        let again = cancel_event(&db, 1, &series.occurrences[0].id, false, ts(2024, 2, 3, 0, 0));
        assert!(matches!(again, Err(AppError::Conflict(_))));
    }

    #[test]
    fn test_non_organizer_cannot_cancel() {
        let db = test_db();
        seed_user(&db, 1);
        seed_user(&db, 2);
        let series = create_event(&db, 1, &monthly_event(vec![2]), ts(2024, 1, 1, 0, 0)).unwrap();
        let err = cancel_event(&db, 2, &series.parent.id, false, ts(2024, 1, 2, 0, 0)).unwrap_err();
        assert!(matches!(err, AppError::NotFound { entity: "event", .. }));
    }

    #[test]
    fn test_respond_once() {
        let db = test_db();
        seed_user(&db, 1);
        seed_user(&db, 2);
        let series = create_event(&db, 1, &monthly_event(vec![2]), ts(2024, 1, 1, 0, 0)).unwrap();
        let id = series.parent.id.clone();

        let accepted =
            respond_to_invitation(&db, &id, 2, InvitationStatus::Accepted, ts(2024, 1, 2, 0, 0)).unwrap();
        assert_eq!(accepted.status, InvitationStatus::Accepted);
        assert_eq!(accepted.responded_at, Some(ts(2024, 1, 2, 0, 0)));

        let twice = respond_to_invitation(&db, &id, 2, InvitationStatus::Declined, ts(2024, 1, 3, 0, 0));
        assert!(matches!(twice, Err(AppError::Conflict(_))));

        // Each occurrence has its own invitation.
        let other = &series.occurrences[0].id;
        let declined =
            respond_to_invitation(&db, other, 2, InvitationStatus::Declined, ts(2024, 1, 3, 0, 0)).unwrap();
        assert_eq!(declined.status, InvitationStatus::Declined);
    }

    #[test]
    fn test_respond_errors() {
        let db = test_db();
        seed_user(&db, 1);
        seed_user(&db, 2);
        seed_user(&db, 3);
        let series = create_event(&db, 1, &monthly_event(vec![2]), ts(2024, 1, 1, 0, 0)).unwrap();
        let id = series.parent.id.clone();
        let now = ts(2024, 1, 2, 0, 0);

        assert!(matches!(
            respond_to_invitation(&db, "evt-missing", 2, InvitationStatus::Accepted, now),
            Err(AppError::NotFound { entity: "event", .. })
        ));
        assert!(matches!(
            respond_to_invitation(&db, &id, 3, InvitationStatus::Accepted, now),
            Err(AppError::NotFound { entity: "invitation", .. })
        ));
        assert!(matches!(
            respond_to_invitation(&db, &id, 2, InvitationStatus::Pending, now),
            Err(AppError::Validation(_))
        ));

        cancel_event(&db, 1, &id, false, now).unwrap();
        assert!(matches!(
            respond_to_invitation(&db, &id, 2, InvitationStatus::Accepted, now),
            Err(AppError::Conflict(_))
        ));
    }
}
