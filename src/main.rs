mod cli;

use std::process;

use fieldquest::config::Config;
use fieldquest::logging;
use fieldquest::storage::Storage;

fn main() {
    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}");
        process::exit(1);
    });
    logging::init(&config.logging);

    let root = config.data_dir().unwrap_or_else(|| {
        eprintln!("Could not determine home directory.");
        process::exit(1);
    });

    let storage = match Storage::open(&root) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to initialize storage: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = cli::run(&config, &storage) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
