//! Pending actions: visit claims awaiting confirmation by the remote authority.
//!
//! An action is recorded locally before the authority has seen it,
//! so the player's progress survives going offline or closing the app.
//! Status only moves along the edges in [`ActionStatus::can_transition_to`].

use std::fmt;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ActionKind, Position};

/// A visit claim waiting on the remote authority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingAction {
    pub id: Uuid,

    pub mission_id: String,

    pub location_id: String,

    pub action_kind: ActionKind,

    /// The fix that justified the claim. Replay submits this rather than
    /// sampling again: the question is "did you visit", not "are you there".
    /// Only absent for code scans where no fix could be acquired.
    pub captured_position: Option<Position>,

    /// Decoded code for code scans.
    pub proof: Option<String>,

    pub submitted_at: Timestamp,

    /// Remote attempts made so far, across every replay.
    pub attempt_count: u32,

    pub status: ActionStatus,
}

impl PendingAction {
    /// Creates a fresh `Queued` action with a new id.
    pub fn new(
        mission_id: impl Into<String>,
        location_id: impl Into<String>,
        action_kind: ActionKind,
        captured_position: Option<Position>,
        proof: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            mission_id: mission_id.into(),
            location_id: location_id.into(),
            action_kind,
            captured_position,
            proof,
            submitted_at: Timestamp::now(),
            attempt_count: 0,
            status: ActionStatus::Queued,
        }
    }

    pub fn short_id(&self) -> String {
        self.id.to_string()[..8].to_string()
    }
}

/// Where a pending action stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionStatus {
    /// Recorded locally, waiting to be sent.
    Queued,

    /// Being sent to the authority right now.
    Verifying,

    /// Accepted by the authority.
    Committed,

    /// Refused by the authority. Terminal.
    Rejected,

    /// Gave up after too many failed attempts. Kept so the player can retry.
    Abandoned,
}

impl ActionStatus {
    /// Whether `self -> next` is an allowed edge.
    ///
    /// ```text
    /// Queued ──→ Verifying ──→ Committed
    ///    ↑           │ ├────→ Rejected
    ///    └───────────┘ └────→ Abandoned
    /// ```
    pub fn can_transition_to(self, next: ActionStatus) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Verifying)
                | (
                    Self::Verifying,
                    Self::Committed | Self::Queued | Self::Rejected | Self::Abandoned
                )
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Verifying => "verifying",
            Self::Committed => "committed",
            Self::Rejected => "rejected",
            Self::Abandoned => "abandoned",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "verifying" => Some(Self::Verifying),
            "committed" => Some(Self::Committed),
            "rejected" => Some(Self::Rejected),
            "abandoned" => Some(Self::Abandoned),
            _ => None,
        }
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
