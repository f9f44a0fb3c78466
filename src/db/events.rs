use chrono::{DateTime, Utc};
use rusqlite::params;

use super::types::parse_text;
use super::*;
use crate::event_status::EventWindow;
use crate::types::{EventStatus, InvitationStatus};

const EVENT_COLUMNS: &str = "id, organizer_id, title, description, event_type, start_date,
     end_date, duration_minutes, status, recurrence_pattern, recurrence_interval,
     parent_event_id, created_at, updated_at";

impl RapportDb {
    // =========================================================================
    // Events
    // =========================================================================

    pub fn insert_event(&self, event: &DbEvent) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO events (
                id, organizer_id, title, description, event_type, start_date, end_date,
                duration_minutes, status, recurrence_pattern, recurrence_interval,
                parent_event_id, created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                event.id,
                event.organizer_id,
                event.title,
                event.description,
                event.event_type,
                event.start_date,
                event.end_date,
                event.duration_minutes,
                event.status.as_str(),
                event.recurrence_pattern.map(|p| p.as_str()),
                event.recurrence_interval,
                event.parent_event_id,
                event.created_at,
                event.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Overwrite the editable fields of an event (not its status).
    pub fn update_event(&self, event: &DbEvent) -> Result<bool, DbError> {
        let changed = self.conn.execute(
            "UPDATE events SET
                title = ?1, description = ?2, event_type = ?3, start_date = ?4,
                end_date = ?5, duration_minutes = ?6, updated_at = ?7
             WHERE id = ?8",
            params![
                event.title,
                event.description,
                event.event_type,
                event.start_date,
                event.end_date,
                event.duration_minutes,
                event.updated_at,
                event.id,
            ],
        )?;
        Ok(changed > 0)
    }

    /// Compare-and-set status change. Only applies when the stored status is
    /// still `from`, so concurrent or repeated scans cannot double-apply.
    pub fn update_event_status_if(
        &self,
        id: &str,
        from: EventStatus,
        to: EventStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, DbError> {
        let changed = self.conn.execute(
            "UPDATE events SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
            params![to.as_str(), now, id, from.as_str()],
        )?;
        Ok(changed > 0)
    }

    pub fn get_event(&self, id: &str) -> Result<Option<DbEvent>, DbError> {
        let sql = format!("SELECT {} FROM events WHERE id = ?1", EVENT_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query_map(params![id], Self::map_event_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// The parent event followed by its generated occurrences, in start order.
    pub fn list_event_series(&self, parent_id: &str) -> Result<Vec<DbEvent>, DbError> {
        let sql = format!(
            "SELECT {} FROM events WHERE id = ?1 OR parent_event_id = ?1 ORDER BY start_date",
            EVENT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![parent_id], Self::map_event_row)?;
        let mut events = Vec::new();
        for row in rows {
            events.push(row?);
        }
        Ok(events)
    }

    /// Status/timing of every non-terminal event. Input to the status scan.
    pub fn list_active_event_windows(&self) -> Result<Vec<EventWindow>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, status, start_date, end_date FROM events
             WHERE status IN ('scheduled', 'in_progress')
             ORDER BY start_date",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(EventWindow {
                id: row.get(0)?,
                status: parse_text(row, 1)?,
                start_date: row.get(2)?,
                end_date: row.get(3)?,
            })
        })?;
        let mut windows = Vec::new();
        for row in rows {
            windows.push(row?);
        }
        Ok(windows)
    }

    /// Scheduled events whose start falls in `[from, to)`.
    pub fn list_events_starting_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<DbEvent>, DbError> {
        let sql = format!(
            "SELECT {} FROM events
             WHERE status = 'scheduled' AND start_date >= ?1 AND start_date < ?2
             ORDER BY start_date",
            EVENT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![from, to], Self::map_event_row)?;
        let mut events = Vec::new();
        for row in rows {
            events.push(row?);
        }
        Ok(events)
    }

    fn map_event_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DbEvent> {
        let pattern: Option<String> = row.get(9)?;
        let recurrence_pattern = match pattern {
            Some(p) => Some(p.parse().map_err(|e: String| {
                rusqlite::Error::FromSqlConversionFailure(9, rusqlite::types::Type::Text, e.into())
            })?),
            None => None,
        };
        Ok(DbEvent {
            id: row.get(0)?,
            organizer_id: row.get(1)?,
            title: row.get(2)?,
            description: row.get(3)?,
            event_type: row.get(4)?,
            start_date: row.get(5)?,
            end_date: row.get(6)?,
            duration_minutes: row.get(7)?,
            status: parse_text(row, 8)?,
            recurrence_pattern,
            recurrence_interval: row.get(10)?,
            parent_event_id: row.get(11)?,
            created_at: row.get(12)?,
            updated_at: row.get(13)?,
        })
    }

    // =========================================================================
    // Participants
    // =========================================================================

    /// Invite a user. Re-inviting an existing participant is a no-op.
    pub fn add_participant(&self, event_id: &str, user_id: i64) -> Result<bool, DbError> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO event_participants (event_id, user_id, status)
             VALUES (?1, ?2, 'pending')",
            params![event_id, user_id],
        )?;
        Ok(inserted > 0)
    }

    pub fn get_participant(
        &self,
        event_id: &str,
        user_id: i64,
    ) -> Result<Option<DbEventParticipant>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT event_id, user_id, status, responded_at FROM event_participants
             WHERE event_id = ?1 AND user_id = ?2",
        )?;
        let mut rows = stmt.query_map(params![event_id, user_id], Self::map_participant_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    pub fn list_participants(&self, event_id: &str) -> Result<Vec<DbEventParticipant>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT event_id, user_id, status, responded_at FROM event_participants
             WHERE event_id = ?1 ORDER BY user_id",
        )?;
        let rows = stmt.query_map(params![event_id], Self::map_participant_row)?;
        let mut participants = Vec::new();
        for row in rows {
            participants.push(row?);
        }
        Ok(participants)
    }

    /// Record an invitation answer. Only a pending invitation changes;
    /// returns false if the participant already responded.
    pub fn respond_to_invitation(
        &self,
        event_id: &str,
        user_id: i64,
        status: InvitationStatus,
        responded_at: DateTime<Utc>,
    ) -> Result<bool, DbError> {
        let changed = self.conn.execute(
            "UPDATE event_participants SET status = ?1, responded_at = ?2
             WHERE event_id = ?3 AND user_id = ?4 AND status = 'pending'",
            params![status.as_str(), responded_at, event_id, user_id],
        )?;
        Ok(changed > 0)
    }

    fn map_participant_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DbEventParticipant> {
        Ok(DbEventParticipant {
            event_id: row.get(0)?,
            user_id: row.get(1)?,
            status: parse_text(row, 2)?,
            responded_at: row.get(3)?,
        })
    }
}
