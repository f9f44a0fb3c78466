use std::collections::HashSet;

use rusqlite::params;

use super::types::parse_json;
use super::*;

impl RapportDb {
    // =========================================================================
    // Achievements
    // =========================================================================

    /// Insert or replace a catalog entry. The shipped catalog comes from the
    /// baseline migration.
    #[cfg(test)]
    pub fn upsert_achievement(&self, achievement: &DbAchievement) -> Result<(), DbError> {
        let criteria = serde_json::to_string(&achievement.criteria).map_err(|e| DbError::Encode {
            column: "achievements.criteria",
            message: e.to_string(),
        })?;
        self.conn.execute(
            "INSERT INTO achievements (id, name, description, criteria, xp_reward)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                criteria = excluded.criteria,
                xp_reward = excluded.xp_reward",
            params![
                achievement.id,
                achievement.name,
                achievement.description,
                criteria,
                achievement.xp_reward,
            ],
        )?;
        Ok(())
    }

    /// The full catalog, in id order.
    pub fn list_achievements(&self) -> Result<Vec<DbAchievement>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, description, criteria, xp_reward FROM achievements ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(DbAchievement {
                id: row.get(0)?,
                name: row.get(1)?,
                description: row.get(2)?,
                criteria: parse_json(row, 3)?.unwrap_or_default(),
                xp_reward: row.get(4)?,
            })
        })?;
        let mut achievements = Vec::new();
        for row in rows {
            achievements.push(row?);
        }
        Ok(achievements)
    }

    pub fn unlocked_achievement_ids(&self, user_id: i64) -> Result<HashSet<String>, DbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT achievement_id FROM user_achievements WHERE user_id = ?1")?;
        let rows = stmt.query_map(params![user_id], |row| row.get::<_, String>(0))?;
        let mut ids = HashSet::new();
        for row in rows {
            ids.insert(row?);
        }
        Ok(ids)
    }

    pub fn list_user_achievements(&self, user_id: i64) -> Result<Vec<DbUserAchievement>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT user_id, achievement_id, unlocked_at FROM user_achievements
             WHERE user_id = ?1 ORDER BY unlocked_at, achievement_id",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok(DbUserAchievement {
                user_id: row.get(0)?,
                achievement_id: row.get(1)?,
                unlocked_at: row.get(2)?,
            })
        })?;
        let mut unlocked = Vec::new();
        for row in rows {
            unlocked.push(row?);
        }
        Ok(unlocked)
    }

    /// Record an unlock. Returns false if the pair was already unlocked, in
    /// which case the caller must not award the reward again.
    pub fn insert_user_achievement(&self, unlock: &DbUserAchievement) -> Result<bool, DbError> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO user_achievements (user_id, achievement_id, unlocked_at)
             VALUES (?1, ?2, ?3)",
            params![unlock.user_id, unlock.achievement_id, unlock.unlocked_at],
        )?;
        Ok(inserted > 0)
    }
}
