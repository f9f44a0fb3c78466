//! SQLite-backed storage for users, contacts, reminders, events, achievements
//! and the activity log.
//!
//! The database lives at `~/.rapport/rapport.db` unless the config overrides
//! it. The engine never issues queries itself: drivers and services fetch rows
//! through `RapportDb`, hand them to the pure components, and persist what
//! comes back.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::Connection;

pub mod types;
pub use types::*;

/// How long a connection waits on another writer's lock
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct RapportDb {
    conn: Connection,
}

impl RapportDb {
    /// Borrow the underlying connection for ad-hoc queries.
    pub fn conn_ref(&self) -> &Connection {
        &self.conn
    }

    /// Execute a closure within a SQLite transaction.
    /// Commits on Ok, rolls back on Err.
    pub fn with_transaction<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Self) -> Result<T, E>,
        E: From<DbError>,
    {
        self.conn
            .execute_batch("BEGIN IMMEDIATE")
            .map_err(|e| E::from(DbError::Sqlite(e)))?;
        match f(self) {
            Ok(val) => {
                self.conn
                    .execute_batch("COMMIT")
                    .map_err(|e| E::from(DbError::Sqlite(e)))?;
                Ok(val)
            }
            Err(e) => {
                let _ = self.conn.execute_batch("ROLLBACK");
                Err(e)
            }
        }
    }

    /// Open (or create) a database at `path` and apply the schema.
    pub fn open_at(path: PathBuf) -> Result<Self, DbError> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(DbError::CreateDir)?;
            }
        }

        let conn = Connection::open(&path)?;
        Self::prepare(conn)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        Self::prepare(conn)
    }

    fn prepare(conn: Connection) -> Result<Self, DbError> {
        // Other connections to the same file wait instead of failing with SQLITE_BUSY.
        conn.busy_timeout(BUSY_TIMEOUT)?;

        // Enable WAL mode for better concurrent read performance
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        crate::migrations::run_migrations(&conn).map_err(DbError::Migration)?;

        // Contacts, reminders and event series rely on ON DELETE CASCADE.
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        Ok(Self { conn })
    }

    /// Resolve the default database path: `~/.rapport/rapport.db`.
    pub fn default_path() -> Result<PathBuf, DbError> {
        let home = dirs::home_dir().ok_or(DbError::HomeDirNotFound)?;
        Ok(home.join(".rapport").join("rapport.db"))
    }

    /// Resolve the database path for a config override, falling back to the default.
    pub fn path_for(override_path: Option<&str>) -> Result<PathBuf, DbError> {
        match override_path {
            Some(p) if !p.trim().is_empty() => Ok(Path::new(p).to_path_buf()),
            _ => Self::default_path(),
        }
    }
}

pub mod achievements;
pub mod activity;
pub mod contacts;
pub mod events;
pub mod reminders;
pub mod users;

// =============================================================================
// Shared test utilities
// =============================================================================
