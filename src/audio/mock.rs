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
    collections::HashMap,
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use parking_lot::Mutex;
use tracing::{info, span, Level};

use super::{
    check_voice, render, Completion, PlaybackError, Quality, RenderError, SampleBuffer,
    VoiceHandle,
};

/// Something that happened to a mock voice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VoiceEvent {
    Started { id: u64, rate: f64 },
    Stopped { id: u64 },
    Finished { id: u64 },
}

/// A render the mock was asked to perform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderRequest {
    pub rate: f64,
    pub frames: usize,
    pub output_length: usize,
}

#[derive(Default)]
struct State {
    /// Everything that happened to voices, in order.
    events: Vec<VoiceEvent>,
    /// Live voices and the address of the buffer each one plays.
    live: HashMap<u64, usize>,
    /// The most voices ever live at once for a single buffer.
    max_live_per_buffer: usize,
    /// Every render request, in order.
    renders: Vec<RenderRequest>,
}

/// A mock engine. Doesn't actually play anything; voices end after the time they would
/// take to play.
#[derive(Clone)]
pub struct Engine {
    name: String,
    quality: Quality,
    state: Arc<Mutex<State>>,
    fail_renders: Arc<AtomicBool>,
    render_delay: Arc<Mutex<Duration>>,
    renders_in_flight: Arc<AtomicUsize>,
    max_renders_in_flight: Arc<AtomicUsize>,
}

impl Engine {
    /// Gets the given mock engine.
    pub fn get(name: &str, quality: Quality) -> Engine {
        Engine {
            name: name.to_string(),
            quality,
            state: Arc::new(Mutex::new(State::default())),
            fail_renders: Arc::new(AtomicBool::new(false)),
            render_delay: Arc::new(Mutex::new(Duration::ZERO)),
            renders_in_flight: Arc::new(AtomicUsize::new(0)),
            max_renders_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Makes every subsequent render fail.
    pub fn fail_renders(&self, fail: bool) {
        self.fail_renders.store(fail, Ordering::Relaxed);
    }

    /// Makes every subsequent render take at least this long.
    pub fn set_render_delay(&self, delay: Duration) {
        *self.render_delay.lock() = delay;
    }

    /// Returns every voice event so far.
    pub fn events(&self) -> Vec<VoiceEvent> {
        self.state.lock().events.clone()
    }

    /// Returns every render request so far.
    pub fn renders(&self) -> Vec<RenderRequest> {
        self.state.lock().renders.clone()
    }

    /// Returns the number of voices currently live.
    pub fn live_count(&self) -> usize {
        self.state.lock().live.len()
    }

    /// Returns the most voices that were ever live at once for the same buffer.
    pub fn max_live_per_buffer(&self) -> usize {
        self.state.lock().max_live_per_buffer
    }

    /// Returns the most renders that were ever running at once.
    pub fn max_renders_in_flight(&self) -> usize {
        self.max_renders_in_flight.load(Ordering::SeqCst)
    }
}

impl super::Engine for Engine {
    fn start_voice(
        &self,
        buffer: Arc<SampleBuffer>,
        rate: f64,
        on_complete: Completion,
    ) -> Result<VoiceHandle, PlaybackError> {
        let span = span!(Level::INFO, "start voice (mock)");
        let _enter = span.enter();

        check_voice(&buffer, rate)?;

        let handle = VoiceHandle::new(rate);
        let id = handle.id();
        let duration = buffer.duration().div_f64(rate);
        let buffer_key = Arc::as_ptr(&buffer) as usize;
        info!(
            device = self.name,
            voice = id,
            rate,
            duration = format!("{:?}", duration),
            "Starting voice."
        );

        {
            let mut state = self.state.lock();
            state.events.push(VoiceEvent::Started { id, rate });
            state.live.insert(id, buffer_key);
            let live_for_buffer = state.live.values().filter(|b| **b == buffer_key).count();
            state.max_live_per_buffer = state.max_live_per_buffer.max(live_for_buffer);
        }

        let cancel_handle = handle.cancel_handle();
        let state = self.state.clone();
        thread::spawn(move || {
            // Wait until the voice is stopped or until it would have finished.
            let cancelled = cancel_handle.wait_timeout(duration);
            if !cancelled {
                let mut state = state.lock();
                state.live.remove(&id);
                state.events.push(VoiceEvent::Finished { id });
            }
            on_complete();
        });

        Ok(handle)
    }

    fn stop_voice(&self, handle: &VoiceHandle) {
        let mut state = self.state.lock();
        // Only the first stop of a live voice counts.
        if state.live.remove(&handle.id()).is_some() {
            state.events.push(VoiceEvent::Stopped { id: handle.id() });
            handle.cancel_handle().cancel();
            info!(device = self.name, voice = handle.id(), "Stopping voice.");
        }
    }

    fn render_offline(
        &self,
        buffer: &SampleBuffer,
        rate: f64,
        output_length: usize,
    ) -> Result<SampleBuffer, RenderError> {
        self.state.lock().renders.push(RenderRequest {
            rate,
            frames: buffer.frames(),
            output_length,
        });

        let in_flight = self.renders_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_renders_in_flight
            .fetch_max(in_flight, Ordering::SeqCst);

        let delay = *self.render_delay.lock();
        if !delay.is_zero() {
            thread::sleep(delay);
        }

        let result = if self.fail_renders.load(Ordering::Relaxed) {
            Err(RenderError::Rejected("mock render failure".to_string()))
        } else {
            render::render(buffer, rate, output_length, self.quality)
        };

        self.renders_in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name,)
    }
}
