//! CLI probe and offline replay for the assay core.
//!
//! # Responsibility
//! - Verify `tlc_core` linkage (`ping`, `version`).
//! - Replay recorded reducer vectors through a result session without a
//!   camera, printing averages and calibration as JSON.

use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use tlc_core::{ResultSession, SessionConfig};

#[derive(Debug, Parser)]
#[command(author, version, about = "TLC assay core tools")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the core health-check response.
    Ping,
    /// Print the core crate version.
    Version,
    /// Fold recorded measurement vectors and print the calibration.
    Replay {
        /// JSON session config.
        #[arg(long)]
        config: PathBuf,
        /// JSON file: `{ "trials": [[Rf0, D0, Rf1, D1, ...], ...] }`.
        #[arg(long)]
        trials: PathBuf,
        /// Write the predictions back and append the final summary.
        #[arg(long)]
        finish: bool,
    },
}

#[derive(Debug, Deserialize)]
struct ReplayInput {
    trials: Vec<Vec<f64>>,
}

fn load_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, Box<dyn Error>> {
    let data = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}

fn replay(config_path: &Path, trials_path: &Path, finish: bool) -> Result<String, Box<dyn Error>> {
    let config = SessionConfig::load(config_path)?;
    let input: ReplayInput = load_json_file(trials_path)?;
    let mut session = ResultSession::open(config)?;

    for values in input.trials {
        let slot = session.begin_trial()?;
        session.complete_trial(&slot, Ok(values))?;
    }

    let averages = session.engine().averages()?;
    let calibration = match session.calculate() {
        Ok(prediction) => {
            if finish {
                session.confirm_predictions(&prediction)?;
            }
            serde_json::json!({ "ok": true, "prediction": prediction })
        }
        Err(err) => serde_json::json!({ "ok": false, "error": err.to_string() }),
    };
    if finish {
        session.finish()?;
    }

    let report = serde_json::json!({
        "trials": session.engine().trial_count(),
        "averages": averages,
        "calibration": calibration,
        "report_path": session.report().path(),
        "finished": session.is_finished(),
    });
    Ok(serde_json::to_string_pretty(&report)?)
}

fn main() {
    if let Err(err) = try_main() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<(), Box<dyn Error>> {
    match Args::parse().command {
        Command::Ping => println!("tlc_core ping={}", tlc_core::ping()),
        Command::Version => println!("tlc_core version={}", tlc_core::core_version()),
        Command::Replay {
            config,
            trials,
            finish,
        } => println!("{}", replay(&config, &trials, finish)?),
    }
    Ok(())
}
