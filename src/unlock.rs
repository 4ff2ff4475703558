//! Progressive clue unlocking.
//!
//! Pure functions over the clue list and a progress snapshot. The caller
//! owns the snapshot and decides when to fold a delta back into it.

use std::collections::BTreeSet;

use crate::model::{Clue, ClueId, ProgressSnapshot, UnlockCondition};

/// Whether `condition` holds for `snapshot` right now.
pub fn condition_holds(condition: &UnlockCondition, snapshot: &ProgressSnapshot) -> bool {
    match condition {
        UnlockCondition::LocationReached(id) => snapshot.completed_location_ids.contains(id),
        UnlockCondition::StageCompleted(stage) => snapshot.current_stage >= *stage,
        UnlockCondition::CodeScanned(id) => snapshot.scanned_location_ids.contains(id),
        UnlockCondition::PhotoTaken(id) => snapshot.photographed_location_ids.contains(id),
    }
}

/// Clues that should unlock now and haven't yet.
///
/// Evaluating again with the delta folded into the snapshot yields nothing.
pub fn evaluate(clues: &[Clue], snapshot: &ProgressSnapshot) -> BTreeSet<ClueId> {
    clues
        .iter()
        .filter(|c| !snapshot.unlocked_clue_ids.contains(&c.id))
        .filter(|c| condition_holds(&c.unlock_condition, snapshot))
        .map(|c| c.id.clone())
        .collect()
}

/// Unlocked clues in reveal order.
pub fn revealed<'a>(clues: &'a [Clue], snapshot: &ProgressSnapshot) -> Vec<&'a Clue> {
    let mut revealed: Vec<_> = clues
        .iter()
        .filter(|c| snapshot.unlocked_clue_ids.contains(&c.id))
        .collect();
    revealed.sort_by(|a, b| a.reveal_order.cmp(&b.reveal_order).then_with(|| a.id.cmp(&b.id)));
    revealed
}

pub fn locked_count(clues: &[Clue], snapshot: &ProgressSnapshot) -> usize {
    clues
        .iter()
        .filter(|c| !snapshot.unlocked_clue_ids.contains(&c.id))
        .count()
}
