//! Geofence validation: is a fix close enough to a location to count?
//!
//! Pure and synchronous. Distances use the haversine formula on a spherical
//! Earth, which is well within GPS noise at geofence scales.

use crate::model::{Coordinates, MissionLocation, Position};

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum GeofenceError {
    #[error("invalid coordinates ({latitude}, {longitude})")]
    InvalidCoordinates { latitude: f64, longitude: f64 },
}

/// The verdict of a containment check, with the distance that produced it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeofenceCheck {
    pub within: bool,
    pub distance_meters: f64,
    pub radius_meters: f64,
}

/// Great-circle distance between two points in meters.
///
/// NaN, infinite, or out-of-range coordinates are an error, never a distance.
pub fn distance_meters(a: Coordinates, b: Coordinates) -> Result<f64, GeofenceError> {
    validate(a)?;
    validate(b)?;

    let phi1 = a.latitude.to_radians();
    let phi2 = b.latitude.to_radians();
    let d_phi = (b.latitude - a.latitude).to_radians();
    let d_lambda = (b.longitude - a.longitude).to_radians();

    let h = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    Ok(EARTH_RADIUS_METERS * c)
}

/// Whether `position` lies inside the location's geofence.
///
/// Inclusive: a fix exactly on the boundary is inside.
pub fn is_within(
    position: &Position,
    location: &MissionLocation,
) -> Result<GeofenceCheck, GeofenceError> {
    let distance = distance_meters(position.coordinates(), location.coordinates)?;
    let radius = location.geofence_radius_meters;
    Ok(GeofenceCheck {
        within: distance <= radius,
        distance_meters: distance,
        radius_meters: radius,
    })
}

/// How fast the device would have had to move between two fixes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovementCheck {
    pub plausible: bool,
    pub speed_mps: f64,
    pub distance_meters: f64,
    pub elapsed_secs: f64,
}

/// Flags fixes that imply impossible travel, a common sign of spoofing.
///
/// A fix that is not strictly later than the previous one is implausible.
pub fn check_movement(
    previous: &Position,
    next: &Position,
    max_speed_mps: f64,
) -> Result<MovementCheck, GeofenceError> {
    let distance = distance_meters(previous.coordinates(), next.coordinates())?;
    let elapsed = next
        .captured_at
        .duration_since(previous.captured_at)
        .as_secs_f64();

    if elapsed <= 0.0 {
        return Ok(MovementCheck {
            plausible: false,
            speed_mps: 0.0,
            distance_meters: distance,
            elapsed_secs: elapsed,
        });
    }

    let speed = distance / elapsed;
    Ok(MovementCheck {
        plausible: speed <= max_speed_mps,
        speed_mps: speed,
        distance_meters: distance,
        elapsed_secs: elapsed,
    })
}

fn validate(c: Coordinates) -> Result<(), GeofenceError> {
    let ok = c.latitude.is_finite()
        && c.longitude.is_finite()
        && (-90.0..=90.0).contains(&c.latitude)
        && (-180.0..=180.0).contains(&c.longitude);
    if ok {
        Ok(())
    } else {
        Err(GeofenceError::InvalidCoordinates {
            latitude: c.latitude,
            longitude: c.longitude,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use jiff::{SignedDuration, Timestamp};

    use crate::model::ActionKind;

    /// Meters per degree of latitude on the spherical model.
    const METERS_PER_DEGREE: f64 = EARTH_RADIUS_METERS * std::f64::consts::PI / 180.0;

    fn location(lat: f64, lon: f64, radius: f64) -> MissionLocation {
        MissionLocation {
            id: "bridge".into(),
            name: "Covered bridge".into(),
            coordinates: Coordinates::new(lat, lon),
            geofence_radius_meters: radius,
            required_action_kind: ActionKind::CheckIn,
            expected_code: None,
            clue_ref: None,
        }
    }

    fn fix(lat: f64, lon: f64) -> Position {
        Position {
            latitude: lat,
            longitude: lon,
            accuracy_meters: 5.0,
            captured_at: Timestamp::now(),
        }
    }

    fn assert_close(actual: f64, expected: f64) {
        let tolerance = expected * 0.01;
        assert!(
            (actual - expected).abs() <= tolerance,
            "{actual} not within 1% of {expected}"
        );
    }

    #[test]
    fn hundred_meters_north() {
        let a = Coordinates::new(40.0, -77.0);
        let b = Coordinates::new(40.0 + 100.0 / METERS_PER_DEGREE, -77.0);
        assert_close(distance_meters(a, b).unwrap(), 100.0);
    }

    #[test]
    fn hundred_meters_east_on_equator() {
        let a = Coordinates::new(0.0, 10.0);
        let b = Coordinates::new(0.0, 10.0 + 100.0 / METERS_PER_DEGREE);
        assert_close(distance_meters(a, b).unwrap(), 100.0);
    }

    #[test]
    fn known_city_pair() {
        // Paris to London, roughly 343.5 km on the haversine model.
        let paris = Coordinates::new(48.8566, 2.3522);
        let london = Coordinates::new(51.5074, -0.1278);
        assert_close(distance_meters(paris, london).unwrap(), 343_500.0);
    }

    #[test]
    fn same_point_is_zero() {
        let a = Coordinates::new(40.79, -77.86);
        assert_eq!(distance_meters(a, a).unwrap(), 0.0);
    }

    #[test]
    fn nan_is_rejected() {
        let a = Coordinates::new(f64::NAN, 0.0);
        let b = Coordinates::new(0.0, 0.0);
        assert!(distance_meters(a, b).is_err());
        assert!(distance_meters(b, a).is_err());
    }

    #[test]
    fn out_of_range_latitude_is_rejected() {
        let a = Coordinates::new(91.0, 0.0);
        assert!(distance_meters(a, Coordinates::new(0.0, 0.0)).is_err());
    }

    #[test]
    fn boundary_is_inclusive() {
        let loc = location(40.0, -77.0, 0.0);
        let p = fix(40.0, -77.0);
        let check = is_within(&p, &loc).unwrap();
        assert!(check.within);

        // Radius set to the exact computed distance.
        let p = fix(40.0 + 25.0 / METERS_PER_DEGREE, -77.0);
        let d = distance_meters(p.coordinates(), loc.coordinates).unwrap();
        let loc = location(40.0, -77.0, d);
        assert!(is_within(&p, &loc).unwrap().within);
    }

    #[test]
    fn beyond_radius_is_outside() {
        let loc = location(40.0, -77.0, 25.0);
        let p = fix(40.0 + 30.0 / METERS_PER_DEGREE, -77.0);
        let check = is_within(&p, &loc).unwrap();
        assert!(!check.within);
        assert_close(check.distance_meters, 30.0);
        assert_eq!(check.radius_meters, 25.0);
    }

    #[test]
    fn nan_fix_never_passes() {
        let loc = location(40.0, -77.0, 1_000_000.0);
        let p = fix(f64::NAN, f64::NAN);
        assert!(is_within(&p, &loc).is_err());
    }

    #[test]
    fn walking_pace_is_plausible() {
        let start = fix(40.0, -77.0);
        let mut end = fix(40.0 + 100.0 / METERS_PER_DEGREE, -77.0);
        end.captured_at = start.captured_at + SignedDuration::from_secs(60);

        let check = check_movement(&start, &end, 40.0).unwrap();
        assert!(check.plausible);
        assert!(check.speed_mps < 2.0);
    }

    #[test]
    fn teleport_is_implausible() {
        let start = fix(40.0, -77.0);
        let mut end = fix(41.0, -77.0);
        end.captured_at = start.captured_at + SignedDuration::from_secs(10);

        let check = check_movement(&start, &end, 40.0).unwrap();
        assert!(!check.plausible);
    }

    #[test]
    fn non_increasing_time_is_implausible() {
        let start = fix(40.0, -77.0);
        let mut end = start;
        end.captured_at = start.captured_at - SignedDuration::from_secs(1);

        assert!(!check_movement(&start, &end, 40.0).unwrap().plausible);
    }
}
