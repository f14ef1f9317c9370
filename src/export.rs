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

//! Exporting tracks at their current rate.
//!
//! An export reads the track's rate once, when it is requested, renders the track through the engine
//! on a blocking worker and encodes the result as a WAV file. Exports of the
//! same track run one at a time; exports of different tracks run concurrently.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, span, Instrument, Level};

use crate::audio::{wav, Engine, EncodingError, RenderError};
use crate::track::Track;

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("No track named {0}")]
    TrackNotFound(String),

    #[error("Render failed: {0}")]
    Render(#[from] RenderError),

    #[error("Encoding failed: {0}")]
    Encoding(#[from] EncodingError),

    #[error("Render worker failed: {0}")]
    Worker(String),
}

/// An encoded audio file and the name it should be saved under.
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedFile {
    filename: String,
    bytes: Vec<u8>,
}

impl EncodedFile {
    pub fn new(filename: String, bytes: Vec<u8>) -> EncodedFile {
        EncodedFile { filename, bytes }
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for EncodedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodedFile")
            .field("filename", &self.filename)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

/// The name an export of the track at the given rate is saved under.
pub fn export_filename(name: &str, rate: f64) -> String {
    format!("{} - Pitch {}.wav", name, rate)
}

/// The number of frames a buffer of `frames` frames lasts when played at `rate`.
pub fn target_length(frames: usize, rate: f64) -> usize {
    (frames as f64 / rate).ceil() as usize
}

/// Renders and encodes tracks.
pub struct Exporter {
    engine: Arc<dyn Engine>,
    /// One lock per track index, so exports of a track queue up behind each other.
    locks: parking_lot::Mutex<HashMap<usize, Arc<AsyncMutex<()>>>>,
}

impl Exporter {
    pub fn new(engine: Arc<dyn Engine>) -> Exporter {
        Exporter {
            engine,
            locks: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, index: usize) -> Arc<AsyncMutex<()>> {
        self.locks
            .lock()
            .entry(index)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Exports the track at its rate as of this call. The rate is read before
    /// the returned future is first polled, so a queued export keeps it.
    pub fn export_track<'a>(
        &'a self,
        track: &'a Track,
    ) -> impl Future<Output = Result<EncodedFile, ExportError>> + Send + 'a {
        let rate = track.rate().get();
        self.export_track_at(track, rate)
    }

    /// Exports the track at the given rate.
    pub async fn export_track_at(
        &self,
        track: &Track,
        rate: f64,
    ) -> Result<EncodedFile, ExportError> {
        let lock = self.lock_for(track.index());
        let _guard = lock.lock().await;

        let span = span!(Level::INFO, "export", track = track.name());
        self.render_and_encode(track, rate).instrument(span).await
    }

    async fn render_and_encode(
        &self,
        track: &Track,
        rate: f64,
    ) -> Result<EncodedFile, ExportError> {
        let buffer = track.buffer();
        let target = target_length(buffer.frames(), rate);
        info!(
            rate,
            frames = buffer.frames(),
            target,
            "Rendering track for export."
        );

        let engine = self.engine.clone();
        let rendered = tokio::task::spawn_blocking(move || {
            engine.render_offline(&buffer, rate, target)
        })
        .await
        .map_err(|e| ExportError::Worker(e.to_string()))??;

        let bytes = wav::encode(&rendered)?;
        let file = EncodedFile::new(export_filename(track.name(), rate), bytes);
        info!(
            filename = file.filename(),
            bytes = file.bytes().len(),
            "Export encoded."
        );
        Ok(file)
    }
}

#[cfg(test)]
mod test {
    use std::path::Path;
    use std::time::Duration;

    use super::*;
    use crate::audio::mock::{self, RenderRequest};
    use crate::audio::{Quality, SampleBuffer};

    fn track(index: usize, name: &str, frames: usize, rate: f64) -> Track {
        Track::new(
            index,
            Path::new("track.wav"),
            Some(name),
            SampleBuffer::silence(2, frames, 44100),
            rate,
        )
    }

    fn exporter() -> (Exporter, mock::Engine) {
        let engine = mock::Engine::get("mock", Quality::Linear);
        (Exporter::new(Arc::new(engine.clone())), engine)
    }

    #[test]
    fn test_filename() {
        assert_eq!(export_filename("Circus", 1.0), "Circus - Pitch 1.wav");
        assert_eq!(export_filename("Circus", 0.5), "Circus - Pitch 0.5.wav");
        assert_eq!(export_filename("Circus", 1.25), "Circus - Pitch 1.25.wav");
    }

    #[test]
    fn test_target_length() {
        assert_eq!(target_length(1000, 1.0), 1000);
        assert_eq!(target_length(1000, 2.0), 500);
        assert_eq!(target_length(1001, 2.0), 501);
        assert_eq!(target_length(1000, 0.5), 2000);
        assert_eq!(target_length(0, 0.5), 0);
    }

    #[tokio::test]
    async fn test_export_at_double_speed() {
        let (exporter, engine) = exporter();
        let track = track(0, "Song", 1001, 2.0);

        let file = exporter.export_track(&track).await.unwrap();
        assert_eq!(file.filename(), "Song - Pitch 2.wav");
        assert_eq!(file.bytes().len(), 44 + 501 * 2 * 2);
        assert_eq!(
            engine.renders(),
            vec![RenderRequest {
                rate: 2.0,
                frames: 1001,
                output_length: 501
            }]
        );
    }

    #[tokio::test]
    async fn test_export_at_half_speed() {
        let (exporter, engine) = exporter();
        let track = track(0, "Song", 1000, 0.5);

        let file = exporter.export_track(&track).await.unwrap();
        assert_eq!(file.filename(), "Song - Pitch 0.5.wav");
        assert_eq!(file.bytes().len(), 44 + 2000 * 2 * 2);
        assert_eq!(engine.renders()[0].output_length, 2000);
    }

    #[tokio::test]
    async fn test_render_failure_keeps_rate() {
        let (exporter, engine) = exporter();
        engine.fail_renders(true);
        let track = track(0, "Song", 1000, 1.5);

        let result = exporter.export_track(&track).await;
        assert!(matches!(
            result,
            Err(ExportError::Render(RenderError::Rejected(_)))
        ));
        assert_eq!(track.rate().get(), 1.5);

        // A later attempt is allowed to succeed.
        engine.fail_renders(false);
        assert!(exporter.export_track(&track).await.is_ok());
    }

    #[tokio::test]
    async fn test_empty_track_rejected() {
        let (exporter, _engine) = exporter();
        let track = track(0, "Empty", 0, 1.0);
        assert!(matches!(
            exporter.export_track(&track).await,
            Err(ExportError::Render(RenderError::EmptyOutput))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_same_track_serialized() {
        let (exporter, engine) = exporter();
        engine.set_render_delay(Duration::from_millis(50));
        let track = track(0, "Song", 100, 1.0);

        let (a, b) = tokio::join!(exporter.export_track(&track), exporter.export_track(&track));
        assert!(a.is_ok());
        assert!(b.is_ok());
        assert_eq!(engine.renders().len(), 2);
        assert_eq!(engine.max_renders_in_flight(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_queued_export_keeps_requested_rate() {
        let (exporter, engine) = exporter();
        engine.set_render_delay(Duration::from_millis(100));
        let track = track(0, "Song", 100, 1.0);

        let first = exporter.export_track(&track);
        let second = exporter.export_track(&track);
        track.rate().set(0.5);

        let (a, b) = tokio::join!(first, second);
        assert_eq!(a.unwrap().filename(), "Song - Pitch 1.wav");
        assert_eq!(b.unwrap().filename(), "Song - Pitch 1.wav");
        let rates: Vec<f64> = engine.renders().iter().map(|r| r.rate).collect();
        assert_eq!(rates, vec![1.0, 1.0]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_different_tracks_concurrent() {
        let (exporter, engine) = exporter();
        engine.set_render_delay(Duration::from_millis(200));
        let a = track(0, "A", 100, 1.0);
        let b = track(1, "B", 100, 1.0);

        let (ra, rb) = tokio::join!(exporter.export_track(&a), exporter.export_track(&b));
        assert!(ra.is_ok());
        assert!(rb.is_ok());
        assert_eq!(engine.max_renders_in_flight(), 2);
    }
}
