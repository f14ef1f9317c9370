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
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::audio::SampleBuffer;
use crate::rate::PlaybackRate;
use crate::util::{duration_minutes_seconds, filename_display};

/// A loaded track: its decoded audio and its playback rate.
pub struct Track {
    /// The position of the track within its session.
    index: usize,
    /// Where the track was loaded from.
    path: PathBuf,
    /// The name shown to users and used for exports.
    name: String,
    /// The decoded audio. Never changes after load.
    buffer: Arc<SampleBuffer>,
    /// The rate used for the next voice or export.
    rate: PlaybackRate,
}

impl Track {
    /// Creates a new track. Without a name, the file name of the path is used.
    pub fn new(
        index: usize,
        path: &Path,
        name: Option<&str>,
        buffer: SampleBuffer,
        rate: f64,
    ) -> Track {
        let name = match name {
            Some(name) => name.to_string(),
            None => filename_display(path).to_string(),
        };
        Track {
            index,
            path: path.to_path_buf(),
            name,
            buffer: Arc::new(buffer),
            rate: PlaybackRate::new(rate),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Gets a shared reference to the decoded audio.
    pub fn buffer(&self) -> Arc<SampleBuffer> {
        self.buffer.clone()
    }

    pub fn rate(&self) -> &PlaybackRate {
        &self.rate
    }

    /// How long the track plays for at its current rate.
    pub fn duration_at_rate(&self) -> Duration {
        self.buffer.duration().div_f64(self.rate.get())
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} (Channels: {}, Rate: {}, Duration: {})",
            self.index,
            self.name,
            self.buffer.channel_count(),
            self.rate,
            duration_minutes_seconds(self.duration_at_rate())
        )
    }
}
