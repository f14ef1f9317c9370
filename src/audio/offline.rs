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
use std::{fmt, sync::Arc};

use super::{render, Completion, PlaybackError, Quality, RenderError, SampleBuffer, VoiceHandle};

/// An engine without an output device. Decodes and renders, but can't play.
pub struct Engine {
    quality: Quality,
}

impl Engine {
    pub fn new(quality: Quality) -> Engine {
        Engine { quality }
    }
}

impl super::Engine for Engine {
    fn start_voice(
        &self,
        _buffer: Arc<SampleBuffer>,
        _rate: f64,
        _on_complete: Completion,
    ) -> Result<VoiceHandle, PlaybackError> {
        Err(PlaybackError::Device(
            "offline engine has no output device".to_string(),
        ))
    }

    fn stop_voice(&self, _handle: &VoiceHandle) {}

    fn render_offline(
        &self,
        buffer: &SampleBuffer,
        rate: f64,
        output_length: usize,
    ) -> Result<SampleBuffer, RenderError> {
        render::render(buffer, rate, output_length, self.quality)
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "offline ({:?})", self.quality)
    }
}
