//! Pending action storage: the durable verification queue.
//!
//! Rows stay until the authority has answered for good. Committed and
//! rejected actions are removed by the caller; abandoned ones are kept so
//! the player can see them and try again.

use rusqlite::{Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::model::{ActionKind, ActionStatus, PendingAction, Position};

use super::{Result, Storage, StorageError};

const COLUMNS: &str = "id, mission_id, location_id, action_kind, position, proof, \
                       submitted_at, attempt_count, status";

/// Result of [`Storage::append_action`].
#[derive(Debug, Clone, PartialEq)]
pub enum Appended {
    /// The action was inserted.
    New(PendingAction),

    /// An equivalent action was already waiting; nothing was inserted.
    Existing(PendingAction),
}

impl Appended {
    pub fn action(&self) -> &PendingAction {
        match self {
            Self::New(a) | Self::Existing(a) => a,
        }
    }

    pub fn into_action(self) -> PendingAction {
        match self {
            Self::New(a) | Self::Existing(a) => a,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, Self::New(_))
    }
}

impl Storage {
    /// Appends an action unless one for the same mission, location, and kind
    /// is already queued or in flight, in which case that one is returned.
    pub fn append_action(&self, action: &PendingAction) -> Result<Appended> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let appended = insert_or_collapse(&tx, action)?;
        tx.commit()?;
        Ok(appended)
    }

    /// Moves an action to `next`, refusing edges the lifecycle doesn't allow.
    pub fn update_action_status(&self, id: Uuid, next: ActionStatus) -> Result<PendingAction> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut action = load_action_row(&tx, id)?;
        if !action.status.can_transition_to(next) {
            return Err(StorageError::InvalidTransition {
                id,
                from: action.status,
                to: next,
            });
        }
        tx.execute(
            "UPDATE pending_action SET status = ?1 WHERE id = ?2",
            rusqlite::params![next.as_str(), id.to_string()],
        )?;
        tx.commit()?;
        action.status = next;
        Ok(action)
    }

    /// Increments the lifetime attempt count and returns the new value.
    pub fn record_attempt(&self, id: Uuid) -> Result<u32> {
        let conn = self.conn()?;
        let count = conn
            .query_row(
                "UPDATE pending_action SET attempt_count = attempt_count + 1
                 WHERE id = ?1
                 RETURNING attempt_count",
                [id.to_string()],
                |row| row.get::<_, u32>(0),
            )
            .optional()?;
        count.ok_or(StorageError::ActionNotFound(id))
    }

    /// Queued actions of one mission, oldest submission first.
    pub fn list_queued_actions(&self, mission_id: &str) -> Result<Vec<PendingAction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM pending_action
             WHERE status = 'queued' AND mission_id = ?1
             ORDER BY submitted_ms, seq"
        ))?;
        let rows = stmt.query_map([mission_id], RawAction::from_row)?;
        rows.map(|r| r?.into_action()).collect()
    }

    /// Every retained action, oldest submission first.
    pub fn list_actions(&self) -> Result<Vec<PendingAction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM pending_action ORDER BY submitted_ms, seq"
        ))?;
        let rows = stmt.query_map([], RawAction::from_row)?;
        rows.map(|r| r?.into_action()).collect()
    }

    pub fn load_action(&self, id: Uuid) -> Result<PendingAction> {
        let conn = self.conn()?;
        load_action_row(&conn, id)
    }

    pub fn remove_action(&self, id: Uuid) -> Result<()> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "DELETE FROM pending_action WHERE id = ?1",
            [id.to_string()],
        )?;
        if rows == 0 {
            return Err(StorageError::ActionNotFound(id));
        }
        Ok(())
    }

    /// Puts a mission's actions left mid-flight by an interrupted process
    /// back in the queue.
    ///
    /// Returns how many were requeued.
    pub fn requeue_interrupted(&self, mission_id: &str) -> Result<usize> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "UPDATE pending_action SET status = 'queued'
             WHERE status = 'verifying' AND mission_id = ?1",
            [mission_id],
        )?;
        Ok(rows)
    }

    /// Swaps an abandoned action for a fresh queued one.
    ///
    /// The replacement gets a new id and a zero attempt count but keeps the
    /// original position, proof, and submission time, so it replays in its
    /// old place in the queue.
    pub fn replace_abandoned(&self, id: Uuid) -> Result<Appended> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let old = load_action_row(&tx, id)?;
        if old.status != ActionStatus::Abandoned {
            return Err(StorageError::InvalidTransition {
                id,
                from: old.status,
                to: ActionStatus::Queued,
            });
        }
        tx.execute("DELETE FROM pending_action WHERE id = ?1", [id.to_string()])?;

        let fresh = PendingAction {
            id: Uuid::new_v4(),
            attempt_count: 0,
            status: ActionStatus::Queued,
            ..old
        };
        let appended = insert_or_collapse(&tx, &fresh)?;
        tx.commit()?;
        Ok(appended)
    }
}

fn insert_or_collapse(conn: &Connection, action: &PendingAction) -> Result<Appended> {
    let existing = conn
        .query_row(
            &format!(
                "SELECT {COLUMNS} FROM pending_action
                 WHERE mission_id = ?1 AND location_id = ?2 AND action_kind = ?3
                   AND status IN ('queued', 'verifying')
                 ORDER BY seq
                 LIMIT 1"
            ),
            rusqlite::params![
                &action.mission_id,
                &action.location_id,
                action.action_kind.as_str(),
            ],
            RawAction::from_row,
        )
        .optional()?;
    if let Some(raw) = existing {
        return Ok(Appended::Existing(raw.into_action()?));
    }

    let position = action
        .captured_position
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    conn.execute(
        "INSERT INTO pending_action
         (id, mission_id, location_id, action_kind, position, proof,
          submitted_at, submitted_ms, attempt_count, status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        rusqlite::params![
            action.id.to_string(),
            &action.mission_id,
            &action.location_id,
            action.action_kind.as_str(),
            position,
            &action.proof,
            action.submitted_at.to_string(),
            action.submitted_at.as_millisecond(),
            action.attempt_count,
            action.status.as_str(),
        ],
    )?;
    Ok(Appended::New(action.clone()))
}

fn load_action_row(conn: &Connection, id: Uuid) -> Result<PendingAction> {
    let raw = conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM pending_action WHERE id = ?1"),
            [id.to_string()],
            RawAction::from_row,
        )
        .optional()?;
    raw.ok_or(StorageError::ActionNotFound(id))?.into_action()
}

/// Column values as stored, before parsing.
struct RawAction {
    id: String,
    mission_id: String,
    location_id: String,
    action_kind: String,
    position: Option<String>,
    proof: Option<String>,
    submitted_at: String,
    attempt_count: u32,
    status: String,
}

impl RawAction {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            mission_id: row.get(1)?,
            location_id: row.get(2)?,
            action_kind: row.get(3)?,
            position: row.get(4)?,
            proof: row.get(5)?,
            submitted_at: row.get(6)?,
            attempt_count: row.get(7)?,
            status: row.get(8)?,
        })
    }

    fn into_action(self) -> Result<PendingAction> {
        let id = self
            .id
            .parse::<Uuid>()
            .map_err(|e| StorageError::Corrupt(format!("invalid action id: {e}")))?;
        let action_kind = ActionKind::parse(&self.action_kind).ok_or_else(|| {
            StorageError::Corrupt(format!("unknown action kind: {}", self.action_kind))
        })?;
        let status = ActionStatus::parse(&self.status)
            .ok_or_else(|| StorageError::Corrupt(format!("unknown status: {}", self.status)))?;
        let submitted_at = self
            .submitted_at
            .parse::<jiff::Timestamp>()
            .map_err(|e| StorageError::Corrupt(format!("invalid submitted_at: {e}")))?;
        let captured_position = self
            .position
            .as_deref()
            .map(serde_json::from_str::<Position>)
            .transpose()?;

        Ok(PendingAction {
            id,
            mission_id: self.mission_id,
            location_id: self.location_id,
            action_kind,
            captured_position,
            proof: self.proof,
            submitted_at,
            attempt_count: self.attempt_count,
            status,
        })
    }
}
