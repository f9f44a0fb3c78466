use rusqlite::params;

use super::*;

const USER_COLUMNS: &str = "id, username, first_name, current_streak, longest_streak,
     total_xp, level, last_activity_date, created_at";

impl RapportDb {
    // =========================================================================
    // Users
    // =========================================================================

    /// Insert a user, or refresh their Telegram profile fields if they exist.
    /// Gamification counters are never touched here.
    pub fn upsert_user(&self, user: &DbUser) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO users (
                id, username, first_name, current_streak, longest_streak,
                total_xp, level, last_activity_date, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(id) DO UPDATE SET
                username = COALESCE(excluded.username, users.username),
                first_name = COALESCE(excluded.first_name, users.first_name)",
            params![
                user.id,
                user.username,
                user.first_name,
                user.current_streak,
                user.longest_streak,
                user.total_xp,
                user.level,
                user.last_activity_date,
                user.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_user(&self, id: i64) -> Result<Option<DbUser>, DbError> {
        let sql = format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query_map(params![id], Self::map_user_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Persist streak, XP, level and last activity date.
    pub fn save_user_progress(&self, user: &DbUser) -> Result<(), DbError> {
        self.conn.execute(
            "UPDATE users SET
                current_streak = ?1, longest_streak = ?2, total_xp = ?3,
                level = ?4, last_activity_date = ?5
             WHERE id = ?6",
            params![
                user.current_streak,
                user.longest_streak,
                user.total_xp,
                user.level,
                user.last_activity_date,
                user.id,
            ],
        )?;
        Ok(())
    }

    /// Users owning at least one tracked contact, in id order.
    pub fn list_users_with_tracked_contacts(&self) -> Result<Vec<i64>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT user_id FROM contacts WHERE tracked = 1 ORDER BY user_id",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, i64>(0))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }

    fn map_user_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DbUser> {
        Ok(DbUser {
            id: row.get(0)?,
            username: row.get(1)?,
            first_name: row.get(2)?,
            current_streak: row.get(3)?,
            longest_streak: row.get(4)?,
            total_xp: row.get(5)?,
            level: row.get(6)?,
            last_activity_date: row.get(7)?,
            created_at: row.get(8)?,
        })
    }
}
