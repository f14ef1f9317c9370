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
// Voice mixing for live playback, independent of any audio backend.
use std::sync::Arc;

use parking_lot::Mutex;

use super::buffer::SampleBuffer;
use super::render::interpolate;
use crate::playsync::CancelHandle;

/// Represents a voice currently being mixed.
pub struct ActiveVoice {
    /// Unique ID for this voice.
    pub id: u64,
    /// The audio being played.
    buffer: Arc<SampleBuffer>,
    /// Read position in source frames.
    position: f64,
    /// Source frames to advance per output frame.
    step: f64,
    /// Cancel handle for stopping this voice.
    cancel_handle: CancelHandle,
}

impl ActiveVoice {
    /// Creates a voice that plays `buffer` at `rate` on an output running at `output_rate`.
    pub fn new(
        id: u64,
        buffer: Arc<SampleBuffer>,
        rate: f64,
        output_rate: u32,
        cancel_handle: CancelHandle,
    ) -> ActiveVoice {
        let step = rate * buffer.sample_rate() as f64 / output_rate as f64;
        ActiveVoice {
            id,
            buffer,
            position: 0.0,
            step,
            cancel_handle,
        }
    }

    fn is_finished(&self) -> bool {
        self.position >= self.buffer.frames() as f64
    }

    /// Adds one output frame of this voice into `frame`.
    /// Mono sources go to every output; extra source channels are dropped.
    fn mix_frame(&mut self, frame: &mut [f32]) {
        let channels = self.buffer.channels();
        for (out_idx, out) in frame.iter_mut().enumerate() {
            let source = if channels.len() == 1 {
                &channels[0]
            } else if let Some(source) = channels.get(out_idx) {
                source
            } else {
                continue;
            };
            *out += interpolate(source, self.position);
        }
        self.position += self.step;
    }
}

/// Mixes active voices into interleaved output frames.
#[derive(Clone)]
pub struct AudioMixer {
    /// Voices currently playing.
    voices: Arc<Mutex<Vec<ActiveVoice>>>,
    /// Receives the IDs of voices that ended, in the order they ended.
    finished_tx: crossbeam_channel::Sender<u64>,
    /// Number of output channels
    num_channels: u16,
    /// Sample rate
    sample_rate: u32,
}

impl AudioMixer {
    /// Creates a new audio mixer
    pub fn new(
        num_channels: u16,
        sample_rate: u32,
        finished_tx: crossbeam_channel::Sender<u64>,
    ) -> Self {
        Self {
            voices: Arc::new(Mutex::new(Vec::new())),
            finished_tx,
            num_channels,
            sample_rate,
        }
    }

    /// Adds a new voice to the mixer
    pub fn add_voice(&self, voice: ActiveVoice) {
        self.voices.lock().push(voice);
    }

    /// Mixes `output.len() / num_channels` frames into `output`, overwriting it.
    /// Voices that finish or were cancelled are removed and reported.
    pub fn process_into_output(&self, output: &mut [f32]) {
        output.fill(0.0);
        let num_channels = self.num_channels as usize;
        if num_channels == 0 {
            return;
        }

        let mut voices = self.voices.lock();
        voices.retain_mut(|voice| {
            for frame in output.chunks_exact_mut(num_channels) {
                if voice.cancel_handle.is_cancelled() || voice.is_finished() {
                    break;
                }
                voice.mix_frame(frame);
            }

            if voice.cancel_handle.is_cancelled() || voice.is_finished() {
                // The receiver only goes away when the engine shuts down.
                let _ = self.finished_tx.send(voice.id);
                return false;
            }
            true
        });
    }

    /// Gets the number of voices being mixed.
    pub fn active_count(&self) -> usize {
        self.voices.lock().len()
    }

    /// Gets the number of output channels
    pub fn num_channels(&self) -> u16 {
        self.num_channels
    }

    /// Gets the sample rate
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}
