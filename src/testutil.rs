// Copyright (C) 2025 Michael Wilson <mike@mdwn.dev>
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
use std::{
    error::Error,
    f32::consts::PI,
    path::Path,
    thread,
    time::{Duration, Instant},
};

use hound::{SampleFormat, WavSpec, WavWriter};

const TIMEOUT: Duration = Duration::from_secs(3);
const TICK: Duration = Duration::from_millis(10);

/// Wait for the given predicate to return true or fail.
pub fn eventually<F>(predicate: F, error_msg: &str)
where
    F: Fn() -> bool,
{
    let start = Instant::now();
    loop {
        if start.elapsed() > TIMEOUT {
            panic!("{}", error_msg);
        }
        if predicate() {
            return;
        }
        thread::sleep(TICK);
    }
}

/// Generates a sine wave.
pub fn sine(frequency: f32, amplitude: f32, sample_rate: u32, frames: usize) -> Vec<f32> {
    (0..frames)
        .map(|i| amplitude * (2.0 * PI * frequency * i as f32 / sample_rate as f32).sin())
        .collect()
}

/// Writes planar channels as a 32 bit float WAV file.
pub fn write_wav(path: &Path, channels: Vec<Vec<f32>>, sample_rate: u32) -> Result<(), Box<dyn Error>> {
    let spec = WavSpec {
        channels: u16::try_from(channels.len())?,
        sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let frames = channels.first().map(|c| c.len()).unwrap_or(0);

    let mut writer = WavWriter::create(path, spec)?;
    for frame in 0..frames {
        for channel in channels.iter() {
            writer.write_sample(channel[frame])?;
        }
    }
    writer.finalize()?;
    Ok(())
}

/// Writes planar channels as a 16 bit integer WAV file.
pub fn write_wav_i16(path: &Path, channels: Vec<Vec<i16>>, sample_rate: u32) -> Result<(), Box<dyn Error>> {
    let spec = WavSpec {
        channels: u16::try_from(channels.len())?,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let frames = channels.first().map(|c| c.len()).unwrap_or(0);

    let mut writer = WavWriter::create(path, spec)?;
    for frame in 0..frames {
        for channel in channels.iter() {
            writer.write_sample(channel[frame])?;
        }
    }
    writer.finalize()?;
    Ok(())
}
