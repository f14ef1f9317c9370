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

//! A set of loaded tracks and everything needed to play and export them.
//!
//! Tracks are decoded into memory at load time. A track that can't be read or
//! decoded is skipped; the rest of the session still loads.

use std::fmt;
use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{error, info, span, Level};

use crate::audio::{DecodeError, Engine, PlaybackError, SampleBuffer, VoiceHandle};
use crate::config;
use crate::export::{ExportError, Exporter};
use crate::save::{DirectorySaver, SaveError, Saver};
use crate::track::Track;
use crate::util::filename_display;
use crate::voice::VoiceManager;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("No track named {0}")]
    TrackNotFound(String),

    #[error(transparent)]
    Playback(#[from] PlaybackError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error(transparent)]
    Save(#[from] SaveError),

    #[error("Save worker failed: {0}")]
    Worker(String),
}

/// Why a track couldn't be loaded.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Unable to read file: {0}")]
    Read(#[from] std::io::Error),

    #[error("Unable to decode file: {0}")]
    Decode(#[from] DecodeError),
}

/// A track that was skipped during load.
#[derive(Debug)]
pub struct LoadFailure {
    pub path: PathBuf,
    pub error: LoadError,
}

impl fmt::Display for LoadFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.error)
    }
}

/// Reads and decodes a single file.
fn load_buffer(engine: &dyn Engine, path: &Path) -> Result<SampleBuffer, LoadError> {
    let bytes = fs::read(path)?;
    let extension = path.extension().and_then(|ext| ext.to_str());
    Ok(engine.decode(bytes, extension)?)
}

pub struct Session {
    tracks: Vec<Track>,
    failures: Vec<LoadFailure>,
    voices: VoiceManager,
    exporter: Exporter,
    saver: Arc<dyn Saver>,
}

impl Session {
    /// Loads every configured track, decoding them in parallel.
    pub fn load(config: &config::Session, engine: Arc<dyn Engine>) -> Session {
        let span = span!(Level::INFO, "session load");
        let _enter = span.enter();

        let results: Vec<(&config::Track, Result<SampleBuffer, LoadError>)> = config
            .tracks()
            .par_iter()
            .map(|track| (track, load_buffer(engine.as_ref(), track.path())))
            .collect();

        let mut tracks = Vec::new();
        let mut failures = Vec::new();
        for (track_config, result) in results {
            match result {
                Ok(buffer) => {
                    let track = Track::new(
                        tracks.len(),
                        track_config.path(),
                        track_config.name(),
                        buffer,
                        track_config.rate(),
                    );
                    info!(
                        track = track.name(),
                        channels = track.buffer().channel_count(),
                        sample_rate = track.buffer().sample_rate(),
                        memory = track.buffer().memory_size(),
                        "Loaded track."
                    );
                    tracks.push(track);
                }
                Err(e) => {
                    error!(
                        path = ?track_config.path(),
                        file = filename_display(track_config.path()),
                        err = %e,
                        "Unable to load track, skipping"
                    );
                    failures.push(LoadFailure {
                        path: track_config.path().to_path_buf(),
                        error: e,
                    });
                }
            }
        }

        let saver = Arc::new(DirectorySaver::new(&config.output_dir()));
        Session::new(tracks, failures, engine, saver)
    }

    /// Creates a session from already loaded tracks.
    pub fn new(
        tracks: Vec<Track>,
        failures: Vec<LoadFailure>,
        engine: Arc<dyn Engine>,
        saver: Arc<dyn Saver>,
    ) -> Session {
        Session {
            tracks,
            failures,
            voices: VoiceManager::new(engine.clone()),
            exporter: Exporter::new(engine),
            saver,
        }
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    /// Finds a track by index or, failing that, by name.
    pub fn find(&self, selector: &str) -> Option<&Track> {
        let selector = selector.trim();
        if let Ok(index) = selector.parse::<usize>() {
            if let Some(track) = self.track(index) {
                return Some(track);
            }
        }
        self.tracks.iter().find(|track| track.name() == selector)
    }

    fn get(&self, selector: &str) -> Result<&Track, SessionError> {
        self.find(selector)
            .ok_or_else(|| SessionError::TrackNotFound(selector.to_string()))
    }

    /// Tracks that failed to load.
    pub fn failures(&self) -> &[LoadFailure] {
        &self.failures
    }

    /// Sets the track's rate, clamped into range, and returns what was stored.
    pub fn set_rate(&self, selector: &str, value: f64) -> Result<f64, SessionError> {
        let track = self.get(selector)?;
        let rate = track.rate().set(value);
        info!(track = track.name(), requested = value, rate, "Rate set.");
        Ok(rate)
    }

    pub fn rate(&self, selector: &str) -> Result<f64, SessionError> {
        Ok(self.get(selector)?.rate().get())
    }

    /// Plays the track from the start, replacing any voice it already has.
    pub fn play(&self, selector: &str) -> Result<VoiceHandle, SessionError> {
        Ok(self.voices.play(self.get(selector)?)?)
    }

    /// Stops the track. Returns false if it wasn't playing.
    pub fn stop(&self, selector: &str) -> Result<bool, SessionError> {
        Ok(self.voices.stop(self.get(selector)?))
    }

    pub fn is_playing(&self, selector: &str) -> Result<bool, SessionError> {
        Ok(self.voices.is_playing(self.get(selector)?))
    }

    /// Number of tracks currently sounding.
    pub fn playing_count(&self) -> usize {
        self.voices.active_count()
    }

    pub fn stop_all(&self) {
        self.voices.stop_all();
    }

    /// Exports the track at its rate as of this call and saves it. Returns where
    /// it was saved.
    pub fn export<'a>(
        &'a self,
        selector: &'a str,
    ) -> impl Future<Output = Result<PathBuf, SessionError>> + Send + 'a {
        let rate = self.find(selector).map(|track| track.rate().get());
        async move {
            match rate {
                Some(rate) => self.export_at(selector, rate).await,
                None => Err(SessionError::Export(ExportError::TrackNotFound(
                    selector.to_string(),
                ))),
            }
        }
    }

    /// Exports the track at the given rate and saves it.
    pub async fn export_at(&self, selector: &str, rate: f64) -> Result<PathBuf, SessionError> {
        let track = self
            .find(selector)
            .ok_or_else(|| ExportError::TrackNotFound(selector.to_string()))?;
        let file = self.exporter.export_track_at(track, rate).await?;

        let saver = self.saver.clone();
        let path = tokio::task::spawn_blocking(move || saver.save(&file))
            .await
            .map_err(|e| SessionError::Worker(e.to_string()))??;
        info!(track = track.name(), path = ?path, "Exported track.");
        Ok(path)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.voices.stop_all();
    }
}
