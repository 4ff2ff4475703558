//! Queue commands: list, discard.

use clap::Subcommand;
use uuid::Uuid;

use fieldquest::model::PendingAction;
use fieldquest::storage::Storage;

use super::format::format_action_line;

#[derive(Debug, Subcommand)]
pub enum QueueCommand {
    /// List every retained action, oldest first.
    List {
        /// Print JSON instead of one line per action.
        #[arg(long)]
        json: bool,
    },

    /// Drop an action from the queue without sending it.
    Discard {
        /// Action ID: full UUID or unambiguous prefix (e.g. `3fa8`).
        action: String,
    },
}

pub(super) fn cmd_list(storage: &Storage, json: bool) -> Result<(), String> {
    let actions = storage
        .list_actions()
        .map_err(|e| format!("failed to list actions: {e}"))?;

    if json {
        let out = serde_json::to_string_pretty(&actions)
            .map_err(|e| format!("failed to serialize actions: {e}"))?;
        println!("{out}");
        return Ok(());
    }

    if actions.is_empty() {
        println!("Queue is empty");
        return Ok(());
    }
    for action in &actions {
        println!("{}", format_action_line(action));
    }
    Ok(())
}

pub(super) fn cmd_discard(storage: &Storage, reference: &str) -> Result<(), String> {
    let action = resolve_action(storage, reference)?;
    storage
        .remove_action(action.id)
        .map_err(|e| format!("failed to discard action: {e}"))?;
    eprintln!(
        "Discarded {} ({} at {})",
        action.short_id(),
        action.action_kind,
        action.location_id
    );
    Ok(())
}

/// Resolve an action reference (full UUID or unambiguous prefix) to an action.
fn resolve_action(storage: &Storage, reference: &str) -> Result<PendingAction, String> {
    if let Ok(id) = reference.parse::<Uuid>() {
        return storage
            .load_action(id)
            .map_err(|e| format!("action not found: {e}"));
    }

    let actions = storage
        .list_actions()
        .map_err(|e| format!("failed to list actions: {e}"))?;
    let matches: Vec<&PendingAction> = actions
        .iter()
        .filter(|a| a.id.to_string().starts_with(reference))
        .collect();

    match matches.as_slice() {
        [] => Err(format!("no action matching '{reference}'")),
        [one] => Ok((*one).clone()),
        many => {
            let ids: Vec<String> = many.iter().map(|a| a.short_id()).collect();
            Err(format!(
                "'{reference}' is ambiguous: matches {} actions: {}",
                many.len(),
                ids.join(", ")
            ))
        }
    }
}
