//! Strider CLI - run the demo level headless and check settings files

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use strider::config::{ControllerSettings, SettingsError};
use strider::logging;
use strider::player::constants::physics::TIMESTEP;
use strider::scenario;

#[derive(Parser)]
#[command(name = "strider")]
#[command(about = "First-person locomotion controller sandbox", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scripted walk through the demo level
    Simulate {
        /// Controller settings file (TOML). Defaults are used when omitted.
        #[arg(short, long, env = "STRIDER_SETTINGS")]
        settings: Option<PathBuf>,
        /// Number of fixed ticks to run
        #[arg(short, long, default_value_t = 500)]
        ticks: usize,
        /// Fixed timestep in seconds
        #[arg(long, default_value_t = TIMESTEP)]
        timestep: f32,
        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check that a settings file parses and is within range
    Validate {
        path: PathBuf,
    },
}

fn load_settings(path: Option<&PathBuf>) -> Result<ControllerSettings, SettingsError> {
    match path {
        Some(path) => ControllerSettings::from_file(path),
        None => Ok(ControllerSettings::default()),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match cli.command {
        Commands::Simulate {
            settings,
            ticks,
            timestep,
            json,
        } => {
            let settings = match load_settings(settings.as_ref()) {
                Ok(settings) => settings,
                Err(e) => {
                    log::error!("{}", e);
                    return ExitCode::FAILURE;
                }
            };
            if timestep <= 0.0 {
                log::error!("timestep must be positive, got {}", timestep);
                return ExitCode::FAILURE;
            }

            let summary = scenario::simulate(settings, ticks, timestep);
            if json {
                match serde_json::to_string_pretty(&summary) {
                    Ok(out) => println!("{}", out),
                    Err(e) => {
                        log::error!("Failed to encode summary: {}", e);
                        return ExitCode::FAILURE;
                    }
                }
            } else {
                let [x, y, z] = summary.final_position;
                println!("ticks:     {}", summary.ticks);
                println!("position:  ({:.2}, {:.2}, {:.2})", x, y, z);
                println!("mode:      {}", summary.mode);
                println!("grounded:  {}", summary.grounded);
                println!("crate:     moved {:.2} m", summary.crate_displacement);
                for (event, count) in &summary.events {
                    println!("  {:<22}{}", event, count);
                }
            }
            ExitCode::SUCCESS
        }
        Commands::Validate { path } => match ControllerSettings::from_file(&path) {
            Ok(_) => {
                println!("{}: ok", path.display());
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("{}", e);
                ExitCode::FAILURE
            }
        },
    }
}
