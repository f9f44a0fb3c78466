//! Schema migration framework.
//!
//! Numbered SQL migrations are embedded at compile time via `include_str!`.
//! Each migration runs exactly once, tracked by the `schema_version` table.

use rusqlite::Connection;

struct Migration {
    version: i32,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    sql: include_str!("migrations/001_baseline.sql"),
}];

/// Create the `schema_version` table if it doesn't exist.
fn ensure_schema_version_table(conn: &Connection) -> Result<(), String> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .map_err(|e| format!("Failed to create schema_version table: {}", e))
}

/// Return the highest applied migration version, or 0 if none.
fn current_version(conn: &Connection) -> Result<i32, String> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
    .map_err(|e| format!("Failed to read schema version: {}", e))
}

/// Run all pending migrations.
///
/// Returns the number of migrations applied (0 if already up-to-date).
/// Refuses to touch a database written by a newer build.
pub fn run_migrations(conn: &Connection) -> Result<usize, String> {
    ensure_schema_version_table(conn)?;

    let current = current_version(conn)?;
    let max_known = MIGRATIONS.last().map(|m| m.version).unwrap_or(0);

    if current > max_known {
        return Err(format!(
            "Database schema version ({}) is newer than this version of Rapport supports ({}). \
             Please update Rapport to the latest version.",
            current, max_known
        ));
    }

    let pending: Vec<&Migration> = MIGRATIONS.iter().filter(|m| m.version > current).collect();

    if pending.is_empty() {
        return Ok(0);
    }

    for migration in &pending {
        conn.execute_batch(migration.sql)
            .map_err(|e| format!("Migration v{} failed: {}", migration.version, e))?;

        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            [migration.version],
        )
        .map_err(|e| format!("Failed to record migration v{}: {}", migration.version, e))?;

        log::info!("Applied migration v{}", migration.version);
    }

    Ok(pending.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mem_db() -> Connection {
        Connection::open_in_memory().expect("in-memory db")
    }

    #[test]
    fn test_fresh_db_applies_baseline() {
        let conn = mem_db();
        let applied = run_migrations(&conn).expect("migrations should succeed");
        assert_eq!(applied, 1);
        assert_eq!(current_version(&conn).unwrap(), 1);

        let achievements: i64 = conn
            .query_row("SELECT COUNT(*) FROM achievements", [], |row| row.get(0))
            .expect("achievements table should exist");
        assert_eq!(achievements, 9);

        conn.execute(
            "INSERT INTO users (id, created_at) VALUES (1, '2024-01-01 00:00:00+00:00')",
            [],
        )
        .expect("users table should accept defaults");
    }

    #[test]
    fn test_idempotency() {
        let conn = mem_db();
        assert_eq!(run_migrations(&conn).expect("first run"), 1);
        assert_eq!(run_migrations(&conn).expect("second run"), 0);
        assert_eq!(current_version(&conn).unwrap(), 1);
    }

    #[test]
    fn test_file_db_migrates_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rapport.db");
        let conn = Connection::open(&path).unwrap();
        assert_eq!(run_migrations(&conn).unwrap(), 1);
        drop(conn);

        let conn = Connection::open(&path).unwrap();
        assert_eq!(run_migrations(&conn).unwrap(), 0);
        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["rapport.db".to_string()]);
    }

    #[test]
    fn test_forward_compat_guard() {
        let conn = mem_db();
        ensure_schema_version_table(&conn).unwrap();
        conn.execute("INSERT INTO schema_version (version) VALUES (999)", [])
            .unwrap();

        let err = run_migrations(&conn).unwrap_err();
        assert!(err.contains("newer than this version"), "{}", err);
    }

    #[test]
    fn test_open_reminder_uniqueness_enforced() {
        let conn = mem_db();
        run_migrations(&conn).unwrap();
        conn.execute_batch(
            "INSERT INTO users (id, created_at) VALUES (1, '2024-01-01');
             INSERT INTO contacts (id, user_id, name, created_at, updated_at)
                VALUES ('c1', 1, 'Ann', '2024-01-01', '2024-01-01');
             INSERT INTO reminders (id, contact_id, user_id, due_date, created_at)
                VALUES ('r1', 'c1', 1, '2024-02-01', '2024-02-01');",
        )
        .unwrap();

        let dup = conn.execute(
            "INSERT INTO reminders (id, contact_id, user_id, due_date, created_at)
             VALUES ('r2', 'c1', 1, '2024-02-01', '2024-02-01')",
            [],
        );
        assert!(dup.is_err(), "second open reminder for same day must be rejected");

        // A completed reminder no longer blocks a new open one.
        conn.execute("UPDATE reminders SET completed = 1 WHERE id = 'r1'", [])
            .unwrap();
        conn.execute(
            "INSERT INTO reminders (id, contact_id, user_id, due_date, created_at)
             VALUES ('r3', 'c1', 1, '2024-02-01', '2024-02-02')",
            [],
        )
        .expect("completed reminder should not block");
    }
}
