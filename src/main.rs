// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::error::Error;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{crate_version, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use stage_arbiter::clock::{Clock, SystemClock};
use stage_arbiter::config::Show;
use stage_arbiter::hal::translator::ColorTranslator;
use stage_arbiter::hal::{OutputStage, ProfileRegistry};
use stage_arbiter::lighting::{Arbiter, Rgb};

const DEFAULT_FRAME_RATE: f64 = 60.0;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A control layer arbiter for stage lighting."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Runs the frame loop for a show and prints every frame as JSON.
    Simulate {
        /// The path to the show file.
        show_path: String,
        /// How many frames to run.
        #[arg(short, long, default_value_t = 60)]
        frames: u64,
        /// Frames per second.
        #[arg(short, long)]
        rate: Option<f64>,
        /// Print what the hardware would receive instead of the arbitrated target.
        #[arg(long)]
        hardware: bool,
    },
    /// Lists the fixture profiles, including any a show defines.
    Profiles {
        /// An optional show file with extra profiles.
        show_path: Option<String>,
    },
    /// Shows how a color would be rendered by a fixture profile.
    Translate {
        /// The profile id.
        profile: String,
        /// The requested color as #rrggbb.
        color: String,
        /// An optional show file with extra profiles.
        #[arg(short, long)]
        show_path: Option<String>,
    },
    /// Prints a starter show file to stdout.
    Template {},
}

fn registry(show_path: Option<&str>) -> Result<ProfileRegistry, Box<dyn Error>> {
    match show_path {
        Some(path) => Ok(Show::deserialize(Path::new(path))?.registry()?),
        None => Ok(ProfileRegistry::builtin()),
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate {
            show_path,
            frames,
            rate,
            hardware,
        } => {
            let show = Show::deserialize(Path::new(&show_path))?;
            let registry = show.registry()?;
            let fixtures = show.fixtures(&registry)?;

            let clock: Arc<dyn Clock> = Arc::new(SystemClock);
            let mut arbiter = Arbiter::new(show.arbiter_config()?, clock.clone());
            let events = arbiter.subscribe();
            arbiter.set_fixtures(fixtures.clone());

            let mut stage = OutputStage::new(registry, show.safety_config()?, clock);
            stage.set_fixtures(&fixtures);

            if let Some(look) = show.look() {
                arbiter.set_ai_intent(look.to_intent())?;
            }
            arbiter.set_output_enabled(true);

            let rate = rate.unwrap_or(DEFAULT_FRAME_RATE);
            if !rate.is_finite() || rate <= 0.0 {
                return Err(format!("frame rate must be positive, got {}", rate).into());
            }
            let tick_duration = Duration::from_secs(1).div_f64(rate);

            let mut last_time = Instant::now();
            for _ in 0..frames {
                let target = arbiter.arbitrate();
                let hardware_frames = stage.render(&target);
                if hardware {
                    println!("{}", serde_json::to_string(&hardware_frames)?);
                } else {
                    println!("{}", serde_json::to_string(&target)?);
                }

                while let Ok(event) = events.try_recv() {
                    info!(event = ?event, "Arbiter event");
                }

                last_time += tick_duration;
                spin_sleep::sleep(last_time.saturating_duration_since(Instant::now()));
            }

            info!(
                status = %serde_json::to_string(&arbiter.status())?,
                safety = %serde_json::to_string(&stage.safety_metrics())?,
                "Simulation finished"
            );
        }
        Commands::Profiles { show_path } => {
            let registry = registry(show_path.as_deref())?;
            println!("Profiles (count: {}):", registry.len());
            for profile in registry.profiles() {
                let wheel = profile
                    .color_wheel
                    .as_ref()
                    .map_or(0, |wheel| wheel.colors.len());
                println!(
                    "- {} ({}): {:?} mixing, {} wheel slots, mechanical: {}",
                    profile.id,
                    profile.name,
                    profile.color_mixing,
                    wheel,
                    profile.is_mechanical()
                );
            }
        }
        Commands::Translate {
            profile,
            color,
            show_path,
        } => {
            let registry = registry(show_path.as_deref())?;
            let profile = registry
                .get(&profile)
                .ok_or_else(|| format!("unknown profile {}", profile))?;
            let color = Rgb::from_hex(&color)?;

            let mut translator = ColorTranslator::new();
            let translation = translator.translate(color, Some(profile));
            println!("{}", serde_json::to_string_pretty(&translation)?);
        }
        Commands::Template {} => {
            print!("{}", Show::template().to_yaml()?);
        }
    };

    Ok(())
}
