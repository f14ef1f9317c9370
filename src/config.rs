// Copyright (C) 2024 Michael Wilson <mike@mdwn.dev>
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
use std::path::{Path, PathBuf};

use config::{Config, File};
use serde::Deserialize;

use crate::audio::Quality;

mod audio;
mod error;
mod track;

pub use self::audio::Audio;
pub use self::error::ConfigError;
pub use self::track::Track;

/// A YAML representation of a session: the tracks to load and where they play and export.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Session {
    /// The audio configuration.
    #[serde(default)]
    audio: Audio,

    /// Interpolation used for exports.
    render_quality: Option<Quality>,

    /// Where exports are saved. Defaults to the directory of the config file.
    output_dir: Option<PathBuf>,

    /// The tracks, in the order they are listed.
    #[serde(default)]
    tracks: Vec<Track>,
}

impl Session {
    /// Creates a session configuration.
    pub fn new(audio: Audio, tracks: Vec<Track>) -> Session {
        Session {
            audio,
            render_quality: None,
            output_dir: None,
            tracks,
        }
    }

    /// Sets the render quality.
    pub fn with_render_quality(mut self, quality: Quality) -> Session {
        self.render_quality = Some(quality);
        self
    }

    /// Sets the output directory.
    pub fn with_output_dir(mut self, output_dir: &Path) -> Session {
        self.output_dir = Some(output_dir.to_path_buf());
        self
    }

    /// Parse a session from a YAML file. Relative paths are resolved against the file's
    /// directory.
    pub fn deserialize(path: &Path) -> Result<Session, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let mut session = Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<Session>()?;

        if let Some(index) = session
            .tracks
            .iter()
            .position(|track| track.path().as_os_str().is_empty())
        {
            return Err(ConfigError::EmptyTrackPath { index });
        }

        let base = path.parent().unwrap_or(Path::new("."));
        session.resolve(base);
        Ok(session)
    }

    fn resolve(&mut self, base: &Path) {
        self.tracks.iter_mut().for_each(|track| track.resolve(base));
        self.output_dir = Some(match self.output_dir.take() {
            Some(output_dir) if output_dir.is_relative() => base.join(output_dir),
            Some(output_dir) => output_dir,
            None => base.to_path_buf(),
        });
    }

    pub fn audio(&self) -> &Audio {
        &self.audio
    }

    /// Returns the render quality (default: sinc).
    pub fn render_quality(&self) -> Quality {
        self.render_quality.unwrap_or_default()
    }

    /// Returns the output directory (default: the current directory).
    pub fn output_dir(&self) -> PathBuf {
        self.output_dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }
}

#[cfg(test)]
mod test {
    use std::fs;

    use super::*;

    fn write_config(yaml: &str) -> (tempfile::TempDir, PathBuf) {
        let tempdir = tempfile::tempdir().unwrap();
        let path = tempdir.path().join("session.yaml");
        fs::write(&path, yaml).unwrap();
        (tempdir, path)
    }

    #[test]
    fn test_full_config() {
        let (tempdir, path) = write_config(
            r#"
            audio:
              device: mock-device
              sample_rate: 48000
            render_quality: linear
            output_dir: exports
            tracks:
              - path: audio/circus.mp3
                name: Circus
                rate: 0.5
              - path: /abs/other.wav
            "#,
        );

        let session = Session::deserialize(&path).unwrap();
        assert_eq!(session.audio().device(), "mock-device");
        assert_eq!(session.audio().sample_rate(), Some(48000));
        assert_eq!(session.render_quality(), Quality::Linear);
        assert_eq!(session.output_dir(), tempdir.path().join("exports"));

        let tracks = session.tracks();
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].path(), tempdir.path().join("audio/circus.mp3"));
        assert_eq!(tracks[0].name(), Some("Circus"));
        assert_eq!(tracks[0].rate(), 0.5);
        assert_eq!(tracks[1].path(), Path::new("/abs/other.wav"));
        assert_eq!(tracks[1].name(), None);
        assert_eq!(tracks[1].rate(), 1.0);
    }

    #[test]
    fn test_defaults() {
        let (tempdir, path) = write_config(
            r#"
            tracks:
              - path: a.wav
            "#,
        );

        let session = Session::deserialize(&path).unwrap();
        assert_eq!(session.audio().device(), "default");
        assert_eq!(session.audio().sample_rate(), None);
        assert_eq!(session.render_quality(), Quality::Sinc);
        assert_eq!(session.output_dir(), tempdir.path());
    }

    #[test]
    fn test_initial_rate_clamped() {
        let (_tempdir, path) = write_config(
            r#"
            tracks:
              - path: a.wav
                rate: 4.0
              - path: b.wav
                rate: 0.01
            "#,
        );

        let session = Session::deserialize(&path).unwrap();
        assert_eq!(session.tracks()[0].rate(), 2.0);
        assert_eq!(session.tracks()[1].rate(), 0.05);
    }

    #[test]
    fn test_bad_quality() {
        let (_tempdir, path) = write_config(
            r#"
            render_quality: cubic
            tracks: []
            "#,
        );

        assert!(matches!(
            Session::deserialize(&path),
            Err(ConfigError::Load(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let tempdir = tempfile::tempdir().unwrap();
        let path = tempdir.path().join("nope.yaml");
        assert!(matches!(
            Session::deserialize(&path),
            Err(ConfigError::NotFound(_))
        ));
    }
}
