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
use std::sync::atomic::{AtomicU64, Ordering};
use std::{error::Error, fmt, sync::Arc};

use crate::config;
use crate::playsync::CancelHandle;

pub mod buffer;
pub mod cpal;
pub mod decode;
pub mod error;
pub mod mixer;
pub mod mock;
pub mod offline;
pub mod render;
pub mod wav;

pub use buffer::SampleBuffer;
pub use error::{DecodeError, EncodingError, PlaybackError, RenderError};
pub use render::Quality;

/// Global voice ID counter.
static NEXT_VOICE_ID: AtomicU64 = AtomicU64::new(1);

/// Called exactly once when a voice ends, whether it finished or was stopped.
pub type Completion = Box<dyn FnOnce() + Send + 'static>;

/// A handle to a voice that an engine is playing.
#[derive(Clone)]
pub struct VoiceHandle {
    id: u64,
    rate: f64,
    cancel_handle: CancelHandle,
}

impl VoiceHandle {
    /// Creates a handle with a fresh voice ID.
    pub fn new(rate: f64) -> VoiceHandle {
        VoiceHandle {
            id: NEXT_VOICE_ID.fetch_add(1, Ordering::SeqCst),
            rate,
            cancel_handle: CancelHandle::new(),
        }
    }

    /// The unique ID of this voice.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The rate the voice was started with.
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// The cancel handle the engine watches to stop this voice.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel_handle.clone()
    }
}

impl fmt::Debug for VoiceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VoiceHandle")
            .field("id", &self.id)
            .field("rate", &self.rate)
            .finish()
    }
}

/// The audio subsystem: decoding, live playback and offline rendering.
pub trait Engine: fmt::Display + Send + Sync {
    /// Decodes an audio file image into memory.
    fn decode(&self, bytes: Vec<u8>, extension: Option<&str>) -> Result<SampleBuffer, DecodeError> {
        decode::decode(bytes, extension)
    }

    /// Starts playing the buffer at the given rate. `on_complete` is called exactly once
    /// when the voice ends, naturally or through `stop_voice`. It may be called from
    /// another thread, but never from within this call.
    fn start_voice(
        &self,
        buffer: Arc<SampleBuffer>,
        rate: f64,
        on_complete: Completion,
    ) -> Result<VoiceHandle, PlaybackError>;

    /// Stops a voice immediately. Stopping a voice that already ended does nothing.
    fn stop_voice(&self, handle: &VoiceHandle);

    /// Renders the buffer played at `rate` into `output_length` frames. Blocks until done.
    fn render_offline(
        &self,
        buffer: &SampleBuffer,
        rate: f64,
        output_length: usize,
    ) -> Result<SampleBuffer, RenderError>;
}

/// Checks the arguments every engine requires of a new voice.
pub(crate) fn check_voice(buffer: &SampleBuffer, rate: f64) -> Result<(), PlaybackError> {
    if !rate.is_finite() || rate <= 0.0 {
        return Err(PlaybackError::InvalidRate(rate));
    }
    if buffer.channel_count() == 0 || buffer.frames() == 0 || buffer.sample_rate() == 0 {
        return Err(PlaybackError::EmptyBuffer);
    }
    Ok(())
}

/// Lists output devices known to cpal.
pub fn list_devices() -> Result<Vec<cpal::DeviceInfo>, Box<dyn Error>> {
    cpal::Engine::list()
}

/// Gets the engine for the given audio configuration.
pub fn get_engine(
    config: &config::Audio,
    quality: Quality,
) -> Result<Arc<dyn Engine>, Box<dyn Error>> {
    let device = config.device();
    if device.starts_with("mock") {
        return Ok(Arc::new(mock::Engine::get(device, quality)));
    };

    Ok(Arc::new(cpal::Engine::get(config, quality)?))
}
