//! Mission commands: local checks, distance, clues, and progress.

use std::path::Path;

use jiff::Timestamp;

use fieldquest::config::Config;
use fieldquest::geofence;
use fieldquest::model::{ActionKind, Coordinates, Mission, Position, Rejection};
use fieldquest::storage::Storage;
use fieldquest::unlock;

use super::format::{format_clue, format_meters};

pub(super) fn cmd_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> Result<(), String> {
    let meters = geofence::distance_meters(Coordinates::new(lat1, lon1), Coordinates::new(lat2, lon2))
        .map_err(|e| e.to_string())?;
    println!("{meters:.1}");
    Ok(())
}

pub(super) fn cmd_check(
    config: &Config,
    mission_path: &Path,
    location_id: &str,
    latitude: f64,
    longitude: f64,
    accuracy: f64,
) -> Result<(), String> {
    let mission = load_mission(mission_path)?;
    let location = mission
        .location(location_id)
        .ok_or_else(|| format!("no location '{location_id}' in mission {}", mission.id))?;

    if location.required_action_kind == ActionKind::CodeScan {
        println!(
            "{}: code scan location; the code is checked instead of the position",
            location.id
        );
        return Ok(());
    }

    let position = Position {
        latitude,
        longitude,
        accuracy_meters: accuracy,
        captured_at: Timestamp::now(),
    };
    let check = geofence::is_within(&position, location).map_err(|e| e.to_string())?;
    let threshold = config.verification.trust_threshold_meters;

    println!(
        "{}: {} from center, radius {}, accuracy {} (threshold {})",
        location.id,
        format_meters(check.distance_meters),
        format_meters(check.radius_meters),
        format_meters(accuracy),
        format_meters(threshold),
    );

    // Same order the verifier applies: accuracy first, then the fence.
    let verdict = if accuracy > threshold {
        Some(Rejection::PositionInaccurate {
            accuracy_meters: accuracy,
            threshold_meters: threshold,
        })
    } else if !check.within {
        Some(Rejection::OutOfGeofence {
            distance_meters: check.distance_meters,
            radius_meters: check.radius_meters,
        })
    } else {
        None
    };

    match verdict {
        None => println!("ok: a {} here would be accepted locally", location.required_action_kind),
        Some(rejection) => println!("rejected: {rejection}"),
    }
    Ok(())
}

pub(super) fn cmd_clues(storage: &Storage, mission_path: &Path) -> Result<(), String> {
    let mission = load_mission(mission_path)?;
    let mut progress = storage
        .load_progress(&mission.id)
        .map_err(|e| format!("failed to load progress: {e}"))?;

    // Stored progress may predate clues added to the mission file.
    let delta = unlock::evaluate(&mission.clues, &progress);
    progress.mark_unlocked(&delta);

    let revealed = unlock::revealed(&mission.clues, &progress);
    if revealed.is_empty() {
        println!("No clues revealed yet");
    }
    for clue in revealed {
        println!("{}", format_clue(clue));
    }

    let locked = unlock::locked_count(&mission.clues, &progress);
    if locked > 0 {
        eprintln!("{locked} clue(s) still locked");
    }
    Ok(())
}

pub(super) fn cmd_progress_show(storage: &Storage, mission_id: &str) -> Result<(), String> {
    let progress = storage
        .load_progress(mission_id)
        .map_err(|e| format!("failed to load progress: {e}"))?;
    let json = serde_json::to_string_pretty(&progress)
        .map_err(|e| format!("failed to serialize progress: {e}"))?;
    println!("{json}");
    Ok(())
}

fn load_mission(path: &Path) -> Result<Mission, String> {
    Mission::load(path).map_err(|e| format!("failed to load mission: {e}"))
}
