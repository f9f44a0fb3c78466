use chrono::{DateTime, Utc};
use rusqlite::params;

use super::types::{parse_json, parse_text};
use super::*;

impl RapportDb {
    // =========================================================================
    // Activity log (append-only)
    // =========================================================================

    pub fn insert_activity(&self, activity: &DbActivity) -> Result<(), DbError> {
        let metadata = match &activity.metadata {
            Some(value) => Some(serde_json::to_string(value).map_err(|e| DbError::Encode {
                column: "activity_log.metadata",
                message: e.to_string(),
            })?),
            None => None,
        };
        self.conn.execute(
            "INSERT INTO activity_log (id, user_id, action, xp_awarded, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                activity.id,
                activity.user_id,
                activity.action.as_str(),
                activity.xp_awarded,
                metadata,
                activity.created_at,
            ],
        )?;
        Ok(())
    }

    /// Activity rows for a user created at or after `since`, oldest first.
    pub fn list_activity_since(
        &self,
        user_id: i64,
        since: DateTime<Utc>,
    ) -> Result<Vec<DbActivity>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, action, xp_awarded, metadata, created_at FROM activity_log
             WHERE user_id = ?1 AND created_at >= ?2
             ORDER BY created_at, id",
        )?;
        let rows = stmt.query_map(params![user_id, since], |row| {
            Ok(DbActivity {
                id: row.get(0)?,
                user_id: row.get(1)?,
                action: parse_text(row, 2)?,
                xp_awarded: row.get(3)?,
                metadata: parse_json(row, 4)?,
                created_at: row.get(5)?,
            })
        })?;
        let mut log = Vec::new();
        for row in rows {
            log.push(row?);
        }
        Ok(log)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_utils::{seed_user, test_db, ts};
    use super::super::DbActivity;
    use crate::types::ActionType;

    #[test]
    fn test_activity_since_filters_and_orders() {
        let db = test_db();
        seed_user(&db, 1);
        for (id, day) in [("a2", 2), ("a1", 1), ("a3", 3)] {
            db.insert_activity(&DbActivity {
                id: id.into(),
                user_id: 1,
                action: ActionType::ReminderCompleted,
                xp_awarded: 20,
                created_at: ts(2024, 6, day, 12, 0),
                metadata: Some(serde_json::json!({ "reminderId": id })),
            })
            .unwrap();
        }

        let log = db.list_activity_since(1, ts(2024, 6, 2, 0, 0)).unwrap();
        assert_eq!(log.iter().map(|a| a.id.as_str()).collect::<Vec<_>>(), ["a2", "a3"]);
        assert_eq!(log[0].metadata.as_ref().unwrap()["reminderId"], "a2");
        assert_eq!(log[0].action, ActionType::ReminderCompleted);
    }
}
