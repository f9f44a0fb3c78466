use chrono::{DateTime, Utc};
use rusqlite::params;

use super::*;

const CONTACT_COLUMNS: &str = "id, user_id, name, cadence, custom_days, tracked,
     last_contact_date, next_reminder_date, notes, created_at, updated_at";

impl RapportDb {
    // =========================================================================
    // Contacts
    // =========================================================================

    pub fn insert_contact(&self, contact: &DbContact) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO contacts (
                id, user_id, name, cadence, custom_days, tracked,
                last_contact_date, next_reminder_date, notes, created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                contact.id,
                contact.user_id,
                contact.name,
                contact.cadence,
                contact.custom_days,
                contact.tracked,
                contact.last_contact_date,
                contact.next_reminder_date,
                contact.notes,
                contact.created_at,
                contact.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Overwrite the mutable fields of a contact. Returns false if no row matched.
    pub fn update_contact(&self, contact: &DbContact) -> Result<bool, DbError> {
        let changed = self.conn.execute(
            "UPDATE contacts SET
                name = ?1, cadence = ?2, custom_days = ?3, tracked = ?4,
                last_contact_date = ?5, next_reminder_date = ?6, notes = ?7, updated_at = ?8
             WHERE id = ?9",
            params![
                contact.name,
                contact.cadence,
                contact.custom_days,
                contact.tracked,
                contact.last_contact_date,
                contact.next_reminder_date,
                contact.notes,
                contact.updated_at,
                contact.id,
            ],
        )?;
        Ok(changed > 0)
    }

    /// Record that the user reached out, caching the newly computed due date.
    pub fn record_contact_made(
        &self,
        contact_id: &str,
        contacted_at: DateTime<Utc>,
        next_reminder_date: DateTime<Utc>,
    ) -> Result<(), DbError> {
        self.conn.execute(
            "UPDATE contacts SET last_contact_date = ?1, next_reminder_date = ?2, updated_at = ?1
             WHERE id = ?3",
            params![contacted_at, next_reminder_date, contact_id],
        )?;
        Ok(())
    }

    pub fn get_contact(&self, id: &str) -> Result<Option<DbContact>, DbError> {
        let sql = format!("SELECT {} FROM contacts WHERE id = ?1", CONTACT_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query_map(params![id], Self::map_contact_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// All contacts for a user, oldest first.
    pub fn list_contacts(&self, user_id: i64) -> Result<Vec<DbContact>, DbError> {
        let sql = format!(
            "SELECT {} FROM contacts WHERE user_id = ?1 ORDER BY created_at, id",
            CONTACT_COLUMNS
        );
        self.query_contacts(&sql, user_id)
    }

    /// Tracked contacts for a user, oldest first. Input to the due scan.
    pub fn list_tracked_contacts(&self, user_id: i64) -> Result<Vec<DbContact>, DbError> {
        let sql = format!(
            "SELECT {} FROM contacts WHERE user_id = ?1 AND tracked = 1 ORDER BY created_at, id",
            CONTACT_COLUMNS
        );
        self.query_contacts(&sql, user_id)
    }

    pub fn count_contacts(&self, user_id: i64) -> Result<i64, DbError> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM contacts WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?)
    }

    fn query_contacts(&self, sql: &str, user_id: i64) -> Result<Vec<DbContact>, DbError> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params![user_id], Self::map_contact_row)?;
        let mut contacts = Vec::new();
        for row in rows {
            contacts.push(row?);
        }
        Ok(contacts)
    }

    fn map_contact_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DbContact> {
        Ok(DbContact {
            id: row.get(0)?,
            user_id: row.get(1)?,
            name: row.get(2)?,
            cadence: row.get(3)?,
            custom_days: row.get(4)?,
            tracked: row.get(5)?,
            last_contact_date: row.get(6)?,
            next_reminder_date: row.get(7)?,
            notes: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }
}
