//! Mission locations: read-only reference data from the remote authority.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{ClueId, Coordinates};

/// What a player must do at a location to have the visit count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    CheckIn,
    CodeScan,
    MarkerView,
    None,
}

impl ActionKind {
    /// Stable name used in storage and on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CheckIn => "check_in",
            Self::CodeScan => "code_scan",
            Self::MarkerView => "marker_view",
            Self::None => "none",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "check_in" => Some(Self::CheckIn),
            "code_scan" => Some(Self::CodeScan),
            "marker_view" => Some(Self::MarkerView),
            "none" => Some(Self::None),
            _ => None,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A real-world site that is part of a mission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MissionLocation {
    pub id: String,

    #[serde(default)]
    pub name: String,

    pub coordinates: Coordinates,

    /// Radius of the circular geofence around `coordinates`. Never negative.
    pub geofence_radius_meters: f64,

    pub required_action_kind: ActionKind,

    /// The string a scanned code must decode to, for `code_scan` locations.
    #[serde(default)]
    pub expected_code: Option<String>,

    /// Clue revealed by the authority when this location is confirmed.
    #[serde(default)]
    pub clue_ref: Option<ClueId>,
}
