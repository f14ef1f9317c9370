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
use std::time::Duration;

use super::error::DecodeError;

/// Decoded audio held in memory in planar format.
/// Planar format stores all samples for channel 0, then all samples for channel 1, etc.
#[derive(Clone, Debug, PartialEq)]
pub struct SampleBuffer {
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
}

impl SampleBuffer {
    /// Creates a new buffer, checking that every channel has the same length.
    pub fn new(channels: Vec<Vec<f32>>, sample_rate: u32) -> Result<SampleBuffer, DecodeError> {
        if channels.is_empty() {
            return Err(DecodeError::InvalidBuffer("no channels".to_string()));
        }
        if sample_rate == 0 {
            return Err(DecodeError::InvalidBuffer("sample rate is zero".to_string()));
        }
        let expected = channels[0].len();
        if let Some((index, channel)) = channels
            .iter()
            .enumerate()
            .find(|(_, channel)| channel.len() != expected)
        {
            return Err(DecodeError::InvalidBuffer(format!(
                "channel {} has {} samples, expected {}",
                index,
                channel.len(),
                expected
            )));
        }

        Ok(SampleBuffer {
            channels,
            sample_rate,
        })
    }

    /// Creates a buffer without validating its shape. The encoder and renderer
    /// still check the shape of anything they are handed.
    pub fn from_planar_unchecked(channels: Vec<Vec<f32>>, sample_rate: u32) -> SampleBuffer {
        SampleBuffer {
            channels,
            sample_rate,
        }
    }

    /// Creates a silent buffer.
    pub fn silence(channel_count: u16, frames: usize, sample_rate: u32) -> SampleBuffer {
        SampleBuffer {
            channels: vec![vec![0.0; frames]; channel_count as usize],
            sample_rate,
        }
    }

    /// Creates a buffer from interleaved samples.
    pub fn from_interleaved(
        interleaved: &[f32],
        channel_count: u16,
        sample_rate: u32,
    ) -> Result<SampleBuffer, DecodeError> {
        let num_channels = channel_count as usize;
        if num_channels == 0 {
            return Err(DecodeError::InvalidBuffer("no channels".to_string()));
        }
        if interleaved.len() % num_channels != 0 {
            return Err(DecodeError::InvalidBuffer(format!(
                "{} interleaved samples do not divide into {} channels",
                interleaved.len(),
                num_channels
            )));
        }

        let num_frames = interleaved.len() / num_channels;
        let mut channels = vec![Vec::with_capacity(num_frames); num_channels];
        for frame in interleaved.chunks_exact(num_channels) {
            for (channel, sample) in channels.iter_mut().zip(frame) {
                channel.push(*sample);
            }
        }

        SampleBuffer::new(channels, sample_rate)
    }

    /// The per-channel sample data.
    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    /// Number of channels in the buffer.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of frames (samples per channel). Uses the first channel.
    pub fn frames(&self) -> usize {
        self.channels.first().map(|c| c.len()).unwrap_or(0)
    }

    /// Playback duration at the natural rate.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }

    /// Size of the sample data in bytes.
    pub fn memory_size(&self) -> usize {
        self.channels.iter().map(|c| c.len()).sum::<usize>() * std::mem::size_of::<f32>()
    }
}
