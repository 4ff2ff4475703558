//! Clues: narrative content revealed as a mission progresses.

use serde::{Deserialize, Serialize};

pub type ClueId = String;

/// A piece of narrative content, static per mission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Clue {
    pub id: ClueId,
    pub text: String,

    #[serde(default)]
    pub media_ref: Option<String>,

    pub unlock_condition: UnlockCondition,

    /// Display position among revealed clues; lower comes first.
    pub reveal_order: u32,
}

/// When a clue becomes eligible for reveal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum UnlockCondition {
    /// The player has a confirmed visit to the location.
    LocationReached(String),

    /// The mission has advanced to at least this stage.
    StageCompleted(u32),

    /// The player has a confirmed code scan at the location.
    CodeScanned(String),

    /// The player has taken a photo at the location.
    PhotoTaken(String),
}
