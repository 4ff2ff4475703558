//! Progress storage: one snapshot per mission.

use jiff::Timestamp;
use rusqlite::OptionalExtension;

use crate::model::ProgressSnapshot;

use super::{Result, Storage};

impl Storage {
    /// Saves progress for a mission, merged with whatever is already stored.
    ///
    /// Returns the snapshot as persisted. A stale snapshot can't roll back
    /// unlocked clues or completed locations.
    pub fn save_progress(
        &self,
        mission_id: &str,
        snapshot: &ProgressSnapshot,
    ) -> Result<ProgressSnapshot> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let stored = tx
            .query_row(
                "SELECT snapshot FROM progress WHERE mission_id = ?1",
                [mission_id],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        let mut merged = match stored {
            Some(json) => serde_json::from_str::<ProgressSnapshot>(&json)?,
            None => ProgressSnapshot::default(),
        };
        merged.merge(snapshot);

        tx.execute(
            "INSERT INTO progress (mission_id, snapshot, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (mission_id) DO UPDATE
             SET snapshot = excluded.snapshot, updated_at = excluded.updated_at",
            rusqlite::params![
                mission_id,
                serde_json::to_string(&merged)?,
                Timestamp::now().to_string(),
            ],
        )?;
        tx.commit()?;
        Ok(merged)
    }

    /// Loads a mission's progress, or an empty snapshot if none is stored.
    pub fn load_progress(&self, mission_id: &str) -> Result<ProgressSnapshot> {
        let conn = self.conn()?;
        let stored = conn
            .query_row(
                "SELECT snapshot FROM progress WHERE mission_id = ?1",
                [mission_id],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        match stored {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(ProgressSnapshot::default()),
        }
    }
}
