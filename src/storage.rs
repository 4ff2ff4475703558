//! Local persistence for pending actions and mission progress.
//!
//! Everything lives in one `SQLite` file under the data directory:
//!
//! ```text
//! <data-dir>/fieldquest.sqlite
//!   pending_action   # one row per action awaiting the authority, keyed by id
//!   progress         # one snapshot per mission, keyed by mission id
//! ```
//!
//! Both tables survive restarts, so a queue built up offline is still
//! there when the app comes back.

mod pending;
mod progress;

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::{fs, io};

use rusqlite::Connection;
use uuid::Uuid;

use crate::model::ActionStatus;

pub use pending::Appended;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("action not found: {0}")]
    ActionNotFound(Uuid),

    #[error("action {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: Uuid,
        from: ActionStatus,
        to: ActionStatus,
    },

    #[error("corrupt data: {0}")]
    Corrupt(String),

    #[error("storage lock poisoned")]
    Poisoned,

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = core::result::Result<T, StorageError>;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS pending_action (
        seq               INTEGER PRIMARY KEY AUTOINCREMENT,
        id                TEXT NOT NULL UNIQUE,
        mission_id        TEXT NOT NULL,
        location_id       TEXT NOT NULL,
        action_kind       TEXT NOT NULL,
        position          TEXT,
        proof             TEXT,
        submitted_at      TEXT NOT NULL,
        submitted_ms      INTEGER NOT NULL,
        attempt_count     INTEGER NOT NULL DEFAULT 0,
        status            TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS pending_action_status
        ON pending_action (status, submitted_ms, seq);

    CREATE TABLE IF NOT EXISTS progress (
        mission_id        TEXT PRIMARY KEY,
        snapshot          TEXT NOT NULL,
        updated_at        TEXT NOT NULL
    );
";

/// Local `SQLite` storage for the mission engine.
///
/// The connection sits behind a mutex so the store can be shared with the
/// session task. Locks are held for single statements only, never across
/// an await.
pub struct Storage {
    conn: Mutex<Connection>,
}

impl Storage {
    /// Opens (or creates) the database inside `dir`.
    ///
    /// The directory is created if it doesn't exist.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let conn = Connection::open(dir.join(Self::FILE_NAME))?;
        Self::with_connection(conn)
    }

    /// A throwaway database, gone when dropped.
    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    const FILE_NAME: &'static str = "fieldquest.sqlite";

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::Poisoned)
    }
}

#[cfg(test)]
impl Storage {
    /// Makes every attempt-count update fail, the way a full disk would.
    pub(crate) fn fail_attempt_updates(&self) {
        self.conn()
            .unwrap()
            .execute_batch(
                "CREATE TRIGGER fail_attempts
                 BEFORE UPDATE OF attempt_count ON pending_action
                 BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
            )
            .unwrap();
    }
}
