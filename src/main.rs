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
use clap::{crate_version, Parser, Subcommand};
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use varispeed::audio::{self, Quality};
use varispeed::config;
use varispeed::controller::{keyboard, Controller};
use varispeed::save::DirectorySaver;
use varispeed::session::Session;
use varispeed::track::Track;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "Audition tracks at any playback rate and export them as WAV."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the available audio output devices.
    Devices {},
    /// Loads and lists the tracks of a session.
    Tracks {
        /// The path to the session config.
        config_path: PathBuf,
    },
    /// Exports a single file at the given rate.
    Export {
        /// The audio file to export.
        file: PathBuf,
        /// The playback rate, between 0.05 and 2.0.
        #[arg(short, long, default_value_t = 1.0)]
        rate: f64,
        /// The directory to save the export to.
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
        /// The render quality (sinc or linear).
        #[arg(short, long, default_value = "sinc")]
        quality: Quality,
    },
    /// Plays a single file through the audio interface.
    Play {
        /// The audio file to play.
        file: PathBuf,
        /// The playback rate, between 0.05 and 2.0.
        #[arg(short, long, default_value_t = 1.0)]
        rate: f64,
        /// The device name to play through.
        #[arg(short, long, default_value = "default")]
        device: String,
    },
    /// Starts an interactive session.
    Start {
        /// The path to the session config.
        config_path: PathBuf,
    },
}

/// Decodes a single file into a track.
fn load_track(
    engine: &dyn audio::Engine,
    path: &Path,
    rate: f64,
) -> Result<Track, Box<dyn Error>> {
    let bytes = fs::read(path).map_err(|e| format!("unable to read {}: {}", path.display(), e))?;
    let extension = path.extension().and_then(|ext| ext.to_str());
    let buffer = engine.decode(bytes, extension)?;
    Ok(Track::new(0, path, None, buffer, rate))
}

fn print_failures(session: &Session) {
    if session.failures().is_empty() {
        return;
    }
    println!("\nFailed to load (count: {}):", session.failures().len());
    for failure in session.failures() {
        println!("- {}", failure);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Devices {} => {
            let devices = audio::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Tracks { config_path } => {
            let config = config::Session::deserialize(&config_path)?;
            // Listing only decodes, so no output device is opened.
            let engine = Arc::new(audio::offline::Engine::new(config.render_quality()));
            let session = Session::load(&config, engine);

            println!("Tracks (count: {}):", session.tracks().len());
            for track in session.tracks() {
                println!("- {}", track);
            }
            print_failures(&session);
        }
        Commands::Export {
            file,
            rate,
            output,
            quality,
        } => {
            let engine: Arc<dyn audio::Engine> = Arc::new(audio::offline::Engine::new(quality));
            let track = load_track(engine.as_ref(), &file, rate)?;
            let session = Session::new(
                vec![track],
                Vec::new(),
                engine,
                Arc::new(DirectorySaver::new(&output)),
            );

            let path = session.export("0").await?;
            println!("Exported {}", path.display());
        }
        Commands::Play { file, rate, device } => {
            let engine = audio::get_engine(&config::Audio::new(&device), Quality::default())?;
            let track = load_track(engine.as_ref(), &file, rate)?;
            println!("Playing {} on {}", track, engine);
            let session = Session::new(
                vec![track],
                Vec::new(),
                engine,
                Arc::new(DirectorySaver::new(Path::new("."))),
            );

            session.play("0")?;
            while session.is_playing("0")? {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }
        Commands::Start { config_path } => {
            let config = config::Session::deserialize(&config_path)?;
            let engine = audio::get_engine(config.audio(), config.render_quality())?;
            let session = Arc::new(Session::load(&config, engine));

            println!("Tracks (count: {}):", session.tracks().len());
            for track in session.tracks() {
                println!("- {}", track);
            }
            print_failures(&session);
            if session.tracks().is_empty() {
                return Err("no tracks could be loaded".into());
            }

            Controller::new(session, Arc::new(keyboard::Driver::new()))
                .join()
                .await?;
        }
    }

    Ok(())
}
