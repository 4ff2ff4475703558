//! CLI interface for FieldQuest.
//!
//! Offline tooling around the engine. Nothing here talks to the remote
//! authority: the commands inspect the local queue and progress, and run
//! the same local checks a claim goes through before it is sent.

mod format;
mod mission;
mod queue;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use fieldquest::config::Config;
use fieldquest::storage::Storage;

use queue::QueueCommand;

/// FieldQuest: field mission tooling.
#[derive(Debug, Parser)]
#[command(name = "fieldquest", version, after_long_help = EXAMPLES_HELP)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

const EXAMPLES_HELP: &str = r"Examples:
  fieldquest queue list
  fieldquest queue discard 3fa8
  fieldquest distance 40.7982 -77.8599 40.7934 -77.86
  fieldquest check --mission walk.json --location library --lat 40.7983 --lon -77.8598 --accuracy 12
  fieldquest clues --mission walk.json
  fieldquest progress show campus-walk";

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Inspect or prune the pending verification queue.
    Queue {
        #[command(subcommand)]
        command: QueueCommand,
    },

    /// Great-circle distance in meters between two points.
    Distance {
        #[arg(allow_negative_numbers = true)]
        lat1: f64,
        #[arg(allow_negative_numbers = true)]
        lon1: f64,
        #[arg(allow_negative_numbers = true)]
        lat2: f64,
        #[arg(allow_negative_numbers = true)]
        lon2: f64,
    },

    /// Check a fix against a mission location without contacting anyone.
    ///
    /// Applies the accuracy threshold and the location's geofence, and
    /// prints the verdict a check-in would get.
    Check {
        /// Mission JSON file.
        #[arg(long)]
        mission: PathBuf,

        /// Location ID within the mission.
        #[arg(long)]
        location: String,

        #[arg(long, allow_negative_numbers = true)]
        lat: f64,

        #[arg(long, allow_negative_numbers = true)]
        lon: f64,

        /// Reported accuracy radius in meters.
        #[arg(long, default_value_t = 10.0)]
        accuracy: f64,
    },

    /// Show the clues stored progress has revealed, in reveal order.
    Clues {
        /// Mission JSON file.
        #[arg(long)]
        mission: PathBuf,
    },

    /// Inspect stored mission progress.
    Progress {
        #[command(subcommand)]
        command: ProgressCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum ProgressCommand {
    /// Print a mission's progress snapshot as JSON.
    Show {
        /// Mission ID.
        mission: String,
    },
}

/// Run the CLI, returning an error message on failure.
pub fn run(config: &Config, storage: &Storage) -> Result<(), String> {
    let cli = Cli::parse();

    match cli.command {
        Command::Queue { command } => match command {
            QueueCommand::List { json } => queue::cmd_list(storage, json),
            QueueCommand::Discard { action } => queue::cmd_discard(storage, &action),
        },
        Command::Distance {
            lat1,
            lon1,
            lat2,
            lon2,
        } => mission::cmd_distance(lat1, lon1, lat2, lon2),
        Command::Check {
            mission,
            location,
            lat,
            lon,
            accuracy,
        } => mission::cmd_check(config, &mission, &location, lat, lon, accuracy),
        Command::Clues { mission } => mission::cmd_clues(storage, &mission),
        Command::Progress { command } => match command {
            ProgressCommand::Show { mission } => mission::cmd_progress_show(storage, &mission),
        },
    }
}
