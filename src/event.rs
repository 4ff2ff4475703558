//! Events published by a mission session.
//!
//! The presentation layer and the points ledger subscribe to these; nothing
//! inside the engine depends on anyone listening.

use std::collections::BTreeSet;

use serde::Serialize;
use uuid::Uuid;

use crate::model::{ActionStatus, ClueId, Outcome, PendingAction};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum SessionEvent {
    /// A pending action moved to a new status.
    #[serde(rename_all = "camelCase")]
    ActionStatus {
        action_id: Uuid,
        location_id: String,
        status: ActionStatus,
    },

    /// Clues that became visible, each reported exactly once.
    #[serde(rename_all = "camelCase")]
    CluesUnlocked {
        mission_id: String,
        clue_ids: BTreeSet<ClueId>,
    },

    /// The final word on a verification or a replayed action.
    #[serde(rename_all = "camelCase")]
    Outcome {
        location_id: String,
        outcome: Outcome,
    },
}

impl SessionEvent {
    pub fn status(action: &PendingAction) -> Self {
        Self::ActionStatus {
            action_id: action.id,
            location_id: action.location_id.clone(),
            status: action.status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::model::Rejection;

    #[test]
    fn outcome_event_nests_the_rejection() {
        let event = SessionEvent::Outcome {
            location_id: "library".into(),
            outcome: Outcome::Rejected(Rejection::OutOfGeofence {
                distance_meters: 40.0,
                radius_meters: 25.0,
            }),
        };

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "outcome");
        assert_eq!(value["locationId"], "library");
        assert_eq!(value["outcome"]["outcome"], "rejected");
        assert_eq!(value["outcome"]["kind"], "outOfGeofence");
        assert_eq!(value["outcome"]["distance_meters"], 40.0);
    }

    #[test]
    fn unlock_event_lists_clue_ids() {
        let event = SessionEvent::CluesUnlocked {
            mission_id: "m1".into(),
            clue_ids: ["b".to_string(), "a".to_string()].into_iter().collect(),
        };

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "cluesUnlocked");
        assert_eq!(value["missionId"], "m1");
        assert_eq!(value["clueIds"], serde_json::json!(["a", "b"]));
    }
}
