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
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;

use crate::rate::{PlaybackRate, DEFAULT_RATE};

/// A YAML representation of a track.
#[derive(Deserialize, Clone, Debug)]
pub struct Track {
    /// The audio file. Relative paths are relative to the config file.
    path: PathBuf,
    /// The display name. Defaults to the file name.
    name: Option<String>,
    /// The initial playback rate.
    rate: Option<f64>,
}

impl Track {
    /// Creates a new track configuration.
    pub fn new(path: &Path, name: Option<&str>, rate: Option<f64>) -> Track {
        Track {
            path: path.to_path_buf(),
            name: name.map(String::from),
            rate,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Returns the initial rate. Out of range rates are clamped with a warning.
    pub fn rate(&self) -> f64 {
        let rate = self.rate.unwrap_or(DEFAULT_RATE);
        match PlaybackRate::validate(rate) {
            Ok(rate) => rate,
            Err(e) => {
                let clamped = PlaybackRate::clamp(rate).unwrap_or(DEFAULT_RATE);
                warn!(
                    path = ?self.path,
                    err = %e,
                    clamped,
                    "Initial rate out of range, clamping"
                );
                clamped
            }
        }
    }

    /// Makes a relative path relative to the given directory instead.
    pub(super) fn resolve(&mut self, base: &Path) {
        if self.path.is_relative() {
            self.path = base.join(&self.path);
        }
    }
}
