//! Core data model for FieldQuest.
//!
//! These types describe a field mission as the engine sees it:
//! locations to visit, positions that justify a visit, pending actions
//! awaiting the authority, clues, and the player's progress.

mod action;
mod clue;
mod location;
mod mission;
mod outcome;
mod position;
mod progress;

pub use action::{ActionStatus, PendingAction};
pub use clue::{Clue, ClueId, UnlockCondition};
pub use location::{ActionKind, MissionLocation};
pub use mission::{Mission, MissionError};
pub use outcome::{Outcome, Rejection};
pub use position::{Coordinates, Position};
pub use progress::ProgressSnapshot;
