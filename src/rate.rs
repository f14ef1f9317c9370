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

//! Per-track playback rate.
//!
//! The rate is read when a voice starts or an export begins. Changing it never
//! affects a voice that is already sounding.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

/// Slowest supported playback rate.
pub const MIN_RATE: f64 = 0.05;

/// Fastest supported playback rate.
pub const MAX_RATE: f64 = 2.0;

/// The natural playback rate.
pub const DEFAULT_RATE: f64 = 1.0;

/// A rate outside of [MIN_RATE, MAX_RATE].
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
#[error("Playback rate {0} is outside of [0.05, 2.0]")]
pub struct RangeError(pub f64);

/// A playback rate that is always within [MIN_RATE, MAX_RATE].
/// Stored as the bits of an f64 so readers never see a partial write.
pub struct PlaybackRate {
    bits: AtomicU64,
}

impl Default for PlaybackRate {
    fn default() -> Self {
        PlaybackRate::new(DEFAULT_RATE)
    }
}

impl PlaybackRate {
    /// Creates a new rate, clamping the initial value.
    pub fn new(value: f64) -> PlaybackRate {
        let value = Self::clamp(value).unwrap_or(DEFAULT_RATE);
        PlaybackRate {
            bits: AtomicU64::new(value.to_bits()),
        }
    }

    /// Checks a value without clamping it.
    pub fn validate(value: f64) -> Result<f64, RangeError> {
        if (MIN_RATE..=MAX_RATE).contains(&value) {
            Ok(value)
        } else {
            Err(RangeError(value))
        }
    }

    /// Clamps a value into range. NaN has no meaningful place in the range and is refused.
    pub fn clamp(value: f64) -> Option<f64> {
        if value.is_nan() {
            return None;
        }
        Some(value.clamp(MIN_RATE, MAX_RATE))
    }

    /// Returns the current rate.
    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }

    /// Stores a new rate, clamped into range, and returns what was stored.
    pub fn set(&self, value: f64) -> f64 {
        if let Err(e) = Self::validate(value) {
            debug!(err = %e, "Clamping playback rate");
        }

        match Self::clamp(value) {
            Some(clamped) => {
                self.bits.store(clamped.to_bits(), Ordering::Release);
                clamped
            }
            None => self.get(),
        }
    }
}

impl fmt::Debug for PlaybackRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PlaybackRate").field(&self.get()).finish()
    }
}

impl fmt::Display for PlaybackRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.get())
    }
}
