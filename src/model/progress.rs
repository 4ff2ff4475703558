//! Progress snapshot: what a player has achieved in one mission attempt.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::{ActionKind, ClueId};

/// Owned by the mission session; observers only ever see copies.
///
/// `unlocked_clue_ids` only grows. Nothing in this crate removes an id from
/// it once inserted, even if the condition that unlocked it stops holding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    #[serde(default)]
    pub completed_location_ids: BTreeSet<String>,

    #[serde(default)]
    pub scanned_location_ids: BTreeSet<String>,

    #[serde(default)]
    pub photographed_location_ids: BTreeSet<String>,

    #[serde(default)]
    pub current_stage: u32,

    #[serde(default)]
    pub unlocked_clue_ids: BTreeSet<ClueId>,
}

impl ProgressSnapshot {
    /// Records a confirmed visit. Code scans count as both a scan and a visit.
    pub fn record_visit(&mut self, location_id: &str, kind: ActionKind) {
        if kind == ActionKind::CodeScan {
            self.scanned_location_ids.insert(location_id.to_string());
        }
        self.completed_location_ids.insert(location_id.to_string());
    }

    pub fn record_photo(&mut self, location_id: &str) {
        self.photographed_location_ids.insert(location_id.to_string());
    }

    /// Moves the mission to `stage`. Returns false if that would go backwards.
    pub fn advance_stage(&mut self, stage: u32) -> bool {
        if stage < self.current_stage {
            return false;
        }
        self.current_stage = stage;
        true
    }

    pub fn mark_unlocked<'a>(&mut self, ids: impl IntoIterator<Item = &'a ClueId>) {
        self.unlocked_clue_ids.extend(ids.into_iter().cloned());
    }

    /// Folds another snapshot of the same mission into this one.
    ///
    /// Every set is unioned and the stage takes the maximum, so merging
    /// never loses progress from either side.
    pub fn merge(&mut self, other: &ProgressSnapshot) {
        self.completed_location_ids
            .extend(other.completed_location_ids.iter().cloned());
        self.scanned_location_ids
            .extend(other.scanned_location_ids.iter().cloned());
        self.photographed_location_ids
            .extend(other.photographed_location_ids.iter().cloned());
        self.unlocked_clue_ids
            .extend(other.unlocked_clue_ids.iter().cloned());
        self.current_stage = self.current_stage.max(other.current_stage);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_scan_counts_as_visit() {
        let mut progress = ProgressSnapshot::default();
        progress.record_visit("bridge", ActionKind::CodeScan);

        assert!(progress.scanned_location_ids.contains("bridge"));
        assert!(progress.completed_location_ids.contains("bridge"));
    }

    #[test]
    fn check_in_is_not_a_scan() {
        let mut progress = ProgressSnapshot::default();
        progress.record_visit("bridge", ActionKind::CheckIn);

        assert!(progress.scanned_location_ids.is_empty());
        assert!(progress.completed_location_ids.contains("bridge"));
    }

    #[test]
    fn stage_never_goes_backwards() {
        let mut progress = ProgressSnapshot::default();
        assert!(progress.advance_stage(3));
        assert!(!progress.advance_stage(2));
        assert_eq!(progress.current_stage, 3);
    }

    #[test]
    fn merge_unions_everything() {
        let mut stored = ProgressSnapshot::default();
        stored.unlocked_clue_ids.insert("c1".into());
        stored.current_stage = 4;

        let mut incoming = ProgressSnapshot::default();
        incoming.unlocked_clue_ids.insert("c2".into());
        incoming.completed_location_ids.insert("mill".into());
        incoming.current_stage = 2;

        stored.merge(&incoming);

        assert_eq!(stored.unlocked_clue_ids.len(), 2);
        assert!(stored.completed_location_ids.contains("mill"));
        assert_eq!(stored.current_stage, 4);
    }
}
