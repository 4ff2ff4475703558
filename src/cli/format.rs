//! Output formatting for CLI display.

use fieldquest::model::{Clue, PendingAction};

/// One line per queued action: id, status, where, what, and how many tries.
pub(super) fn format_action_line(action: &PendingAction) -> String {
    let proof = action
        .proof
        .as_deref()
        .map(|p| format!(" code={p}"))
        .unwrap_or_default();
    let position = match &action.captured_position {
        Some(p) => format!(" ±{}", format_meters(p.accuracy_meters)),
        None => " no fix".to_string(),
    };
    format!(
        "{}  [{}]  {}/{}  {}{}{}  attempts={}  {}",
        action.short_id(),
        action.status,
        action.mission_id,
        action.location_id,
        action.action_kind,
        position,
        proof,
        action.attempt_count,
        action.submitted_at,
    )
}

pub(super) fn format_clue(clue: &Clue) -> String {
    match &clue.media_ref {
        Some(media) => format!("{:>3}. {}  ({media})", clue.reveal_order, clue.text),
        None => format!("{:>3}. {}", clue.reveal_order, clue.text),
    }
}

/// Meters, or kilometres above 10 km.
pub(super) fn format_meters(meters: f64) -> String {
    if meters >= 10_000.0 {
        format!("{:.1}km", meters / 1_000.0)
    } else {
        format!("{meters:.0}m")
    }
}
