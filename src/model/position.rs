//! Position types: where the device is, and how sure it is about it.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

/// A point on the Earth's surface in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// A best-effort fix reported by the positioning capability.
///
/// Only lives as long as the action it supports.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,

    /// Radius of uncertainty in meters. Smaller is better.
    pub accuracy_meters: f64,

    pub captured_at: Timestamp,
}

impl Position {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }
}
