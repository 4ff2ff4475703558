//! Missions: a set of locations and the clues they reveal.

use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use super::{Clue, MissionLocation};

#[derive(Debug, thiserror::Error)]
pub enum MissionError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid mission JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("location {0} has a negative or non-finite geofence radius")]
    InvalidRadius(String),

    #[error("duplicate {kind} id: {id}")]
    DuplicateId { kind: &'static str, id: String },
}

/// Reference data for one mission, as supplied by the remote authority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mission {
    pub id: String,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub locations: Vec<MissionLocation>,

    #[serde(default)]
    pub clues: Vec<Clue>,
}

impl Mission {
    /// Loads and validates a mission from a JSON file.
    pub fn load(path: &Path) -> Result<Self, MissionError> {
        let json = fs::read_to_string(path).map_err(|source| MissionError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    pub fn from_json(json: &str) -> Result<Self, MissionError> {
        let mission: Self = serde_json::from_str(json)?;
        mission.validate()?;
        Ok(mission)
    }

    pub fn location(&self, id: &str) -> Option<&MissionLocation> {
        self.locations.iter().find(|l| l.id == id)
    }

    fn validate(&self) -> Result<(), MissionError> {
        let mut seen = std::collections::HashSet::new();
        for location in &self.locations {
            let r = location.geofence_radius_meters;
            if !r.is_finite() || r < 0.0 {
                return Err(MissionError::InvalidRadius(location.id.clone()));
            }
            if !seen.insert(location.id.as_str()) {
                return Err(MissionError::DuplicateId {
                    kind: "location",
                    id: location.id.clone(),
                });
            }
        }

        let mut seen = std::collections::HashSet::new();
        for clue in &self.clues {
            if !seen.insert(clue.id.as_str()) {
                return Err(MissionError::DuplicateId {
                    kind: "clue",
                    id: clue.id.clone(),
                });
            }
        }
        Ok(())
    }
}
