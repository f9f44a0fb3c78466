use chrono::{DateTime, Utc};
use rusqlite::params;

use super::*;

const REMINDER_COLUMNS: &str =
    "id, contact_id, user_id, due_date, completed, completed_at, notification_sent, created_at";

impl RapportDb {
    // =========================================================================
    // Reminders
    // =========================================================================

    /// Insert a reminder unless an open one already exists for the same
    /// contact and due date. Returns true if a row was created.
    pub fn insert_reminder_if_absent(&self, reminder: &DbReminder) -> Result<bool, DbError> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO reminders (
                id, contact_id, user_id, due_date, completed, completed_at,
                notification_sent, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                reminder.id,
                reminder.contact_id,
                reminder.user_id,
                reminder.due_date,
                reminder.completed,
                reminder.completed_at,
                reminder.notification_sent,
                reminder.created_at,
            ],
        )?;
        Ok(inserted > 0)
    }

    pub fn get_reminder(&self, id: &str) -> Result<Option<DbReminder>, DbError> {
        let sql = format!("SELECT {} FROM reminders WHERE id = ?1", REMINDER_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query_map(params![id], Self::map_reminder_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// The open reminder for a contact on a given due date, if any.
    #[cfg(test)]
    pub fn find_open_reminder(
        &self,
        contact_id: &str,
        due_date: chrono::NaiveDate,
    ) -> Result<Option<DbReminder>, DbError> {
        let sql = format!(
            "SELECT {} FROM reminders WHERE contact_id = ?1 AND due_date = ?2 AND completed = 0",
            REMINDER_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query_map(params![contact_id, due_date], Self::map_reminder_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Open reminders for a user, earliest due first.
    pub fn list_open_reminders(&self, user_id: i64) -> Result<Vec<DbReminder>, DbError> {
        let sql = format!(
            "SELECT {} FROM reminders WHERE user_id = ?1 AND completed = 0
             ORDER BY due_date, created_at",
            REMINDER_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![user_id], Self::map_reminder_row)?;
        let mut reminders = Vec::new();
        for row in rows {
            reminders.push(row?);
        }
        Ok(reminders)
    }

    /// Mark a reminder completed. Only an open reminder changes; returns
    /// false when it was already completed (or missing).
    pub fn mark_reminder_completed(
        &self,
        id: &str,
        completed_at: DateTime<Utc>,
    ) -> Result<bool, DbError> {
        let changed = self.conn.execute(
            "UPDATE reminders SET completed = 1, completed_at = ?1
             WHERE id = ?2 AND completed = 0",
            params![completed_at, id],
        )?;
        Ok(changed > 0)
    }

    pub fn mark_notification_sent(&self, ids: &[String]) -> Result<usize, DbError> {
        let mut total = 0;
        for id in ids {
            total += self.conn.execute(
                "UPDATE reminders SET notification_sent = 1 WHERE id = ?1",
                params![id],
            )?;
        }
        Ok(total)
    }

    pub fn count_completed_reminders(&self, user_id: i64) -> Result<i64, DbError> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM reminders WHERE user_id = ?1 AND completed = 1",
            params![user_id],
            |row| row.get(0),
        )?)
    }

    fn map_reminder_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DbReminder> {
        Ok(DbReminder {
            id: row.get(0)?,
            contact_id: row.get(1)?,
            user_id: row.get(2)?,
            due_date: row.get(3)?,
            completed: row.get(4)?,
            completed_at: row.get(5)?,
            notification_sent: row.get(6)?,
            created_at: row.get(7)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::super::test_utils::{seed_contact, seed_user, test_db, ts};
    use super::super::DbReminder;

    fn reminder(id: &str, due: NaiveDate) -> DbReminder {
        DbReminder {
            id: id.to_string(),
            contact_id: "c1".to_string(),
            user_id: 1,
            due_date: due,
            completed: false,
            completed_at: None,
            notification_sent: false,
            created_at: ts(2024, 2, 1, 9, 0),
        }
    }

    #[test]
    fn test_insert_if_absent_is_idempotent() {
        let db = test_db();
        seed_user(&db, 1);
        seed_contact(&db, "c1", 1);
        let due = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();

        assert!(db.insert_reminder_if_absent(&reminder("r1", due)).unwrap());
        assert!(!db.insert_reminder_if_absent(&reminder("r2", due)).unwrap());

        let open = db.find_open_reminder("c1", due).unwrap().unwrap();
        assert_eq!(open.id, "r1");
        assert_eq!(db.list_open_reminders(1).unwrap().len(), 1);
    }

    #[test]
    fn test_mark_completed_only_once() {
        let db = test_db();
        seed_user(&db, 1);
        seed_contact(&db, "c1", 1);
        let due = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        db.insert_reminder_if_absent(&reminder("r1", due)).unwrap();

        assert!(db.mark_reminder_completed("r1", ts(2024, 2, 1, 12, 0)).unwrap());
        assert!(!db.mark_reminder_completed("r1", ts(2024, 2, 2, 12, 0)).unwrap());

        let stored = db.get_reminder("r1").unwrap().unwrap();
        assert!(stored.completed);
        assert_eq!(stored.completed_at, Some(ts(2024, 2, 1, 12, 0)));
        assert_eq!(db.count_completed_reminders(1).unwrap(), 1);
        assert!(db.find_open_reminder("c1", due).unwrap().is_none());
    }

    #[test]
    fn test_mark_notification_sent() {
        let db = test_db();
        seed_user(&db, 1);
        seed_contact(&db, "c1", 1);
        let due = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        db.insert_reminder_if_absent(&reminder("r1", due)).unwrap();

        assert_eq!(db.mark_notification_sent(&["r1".to_string()]).unwrap(), 1);
        assert!(db.get_reminder("r1").unwrap().unwrap().notification_sent);
    }
}
