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

/// Source audio could not be turned into a sample buffer.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Unsupported or malformed audio: {0}")]
    Unsupported(String),

    #[error("No audio track found")]
    NoAudioTrack,

    #[error("Sample rate not specified")]
    MissingSampleRate,

    #[error("Unable to determine channel count")]
    MissingChannels,

    #[error("Audio stream contained no samples")]
    Empty,

    #[error("Audio file error: {0}")]
    AudioError(#[from] symphonia::core::errors::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid sample buffer: {0}")]
    InvalidBuffer(String),
}

/// A buffer handed to the WAV encoder violates its shape invariants.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum EncodingError {
    #[error("Buffer has no channels")]
    NoChannels,

    #[error("Too many channels: {0}")]
    TooManyChannels(usize),

    #[error("Sample rate must be positive")]
    InvalidSampleRate,

    #[error("Channel {channel} has {actual} samples, expected {expected}")]
    ChannelLengthMismatch {
        channel: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Data section of {0} bytes does not fit in a WAV file")]
    TooLarge(u64),
}

/// The engine refused to render a buffer offline.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum RenderError {
    #[error("Cannot render a buffer with no channels")]
    NoChannels,

    #[error("Cannot render at sample rate {0}Hz")]
    InvalidSampleRate(u32),

    #[error("Cannot render at playback rate {0}")]
    InvalidRate(f64),

    #[error("Requested output length is zero")]
    EmptyOutput,

    #[error("Resampling failed at playback rate {0}: {1}")]
    ResamplingFailed(f64, String),

    #[error("Render rejected: {0}")]
    Rejected(String),
}

/// A voice could not be started.
#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    #[error("Cannot play at rate {0}")]
    InvalidRate(f64),

    #[error("Cannot play an empty buffer")]
    EmptyBuffer,

    #[error("Output device error: {0}")]
    Device(String),
}
