//! Verification outcomes: what the presentation layer is told.
//!
//! These are results, not errors. How to render them is up to the caller.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ClueId;

/// Result of one verification attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum Outcome {
    /// The authority accepted the action.
    Committed {
        action_id: Uuid,
        clue_ref: Option<ClueId>,
    },

    /// Recorded locally; will be sent when the device is online.
    /// Shown as a neutral "pending sync", not as an error.
    Queued { action_id: Uuid },

    /// Every attempt failed in transit. Kept queued for automatic replay.
    /// Shown as a soft "will retry when possible".
    PendingRetry { action_id: Uuid, attempts: u32 },

    /// Too many failed attempts overall. Kept for a manual retry.
    Abandoned { action_id: Uuid, attempts: u32 },

    /// Refused, locally or by the authority.
    Rejected(Rejection),
}

impl Outcome {
    pub fn action_id(&self) -> Option<Uuid> {
        match self {
            Self::Committed { action_id, .. }
            | Self::Queued { action_id }
            | Self::PendingRetry { action_id, .. }
            | Self::Abandoned { action_id, .. } => Some(*action_id),
            Self::Rejected(_) => None,
        }
    }
}

/// Why a claim was refused.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Rejection {
    #[error("location unavailable; check permissions and try again")]
    PositionUnavailable,

    #[error("location accuracy is poor ({accuracy_meters:.0}m, need {threshold_meters:.0}m); move to an open area")]
    PositionInaccurate {
        accuracy_meters: f64,
        threshold_meters: f64,
    },

    #[error("you are {distance_meters:.0}m away; move within {radius_meters:.0}m of the location")]
    OutOfGeofence {
        distance_meters: f64,
        radius_meters: f64,
    },

    #[error("code does not match this location")]
    InvalidCode,

    #[error("movement of {speed_mps:.0} m/s since the last fix is not plausible")]
    ImplausibleMovement { speed_mps: f64 },

    #[error("{reason}")]
    ServerRejected { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn server_rejection_serializes_with_its_reason() {
        let outcome = Outcome::Rejected(Rejection::ServerRejected {
            reason: "site closed".into(),
        });

        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(
            value,
            json!({
                "outcome": "rejected",
                "kind": "serverRejected",
                "reason": "site closed",
            })
        );
        assert_eq!(serde_json::from_value::<Outcome>(value).unwrap(), outcome);
    }

    #[test]
    fn unit_rejection_reads_back() {
        let outcome = Outcome::Rejected(Rejection::PositionUnavailable);

        let text = serde_json::to_string(&outcome).unwrap();
        assert_eq!(serde_json::from_str::<Outcome>(&text).unwrap(), outcome);
    }

    #[test]
    fn committed_carries_clue_ref() {
        let action_id = Uuid::new_v4();
        let outcome = Outcome::Committed {
            action_id,
            clue_ref: Some("c1".into()),
        };

        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["outcome"], "committed");
        assert_eq!(value["clue_ref"], "c1");
        assert_eq!(outcome.action_id(), Some(action_id));
    }
}
