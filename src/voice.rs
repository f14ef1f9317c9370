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

//! Voice management for track playback.
//!
//! Each track has at most one voice. Playing a track that is already sounding
//! cuts the old voice before the new one starts.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, span, Level};

use crate::audio::{Engine, PlaybackError, VoiceHandle};
use crate::track::Track;

/// Counter for voice slots, so completions can tell whether their slot was replaced.
static NEXT_SLOT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// The bookkeeping for one track's voice.
struct Slot {
    /// Identifies the play request that owns this slot.
    generation: u64,
    /// The engine's handle. Unset while the engine is still starting the voice.
    handle: Option<VoiceHandle>,
}

type Slots = Arc<Mutex<HashMap<usize, Slot>>>;

/// Tracks the voice of every track and starts/stops them through the engine.
pub struct VoiceManager {
    engine: Arc<dyn Engine>,
    /// Live voices by track index.
    slots: Slots,
}

impl VoiceManager {
    /// Creates a new voice manager.
    pub fn new(engine: Arc<dyn Engine>) -> VoiceManager {
        VoiceManager {
            engine,
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Plays the track at its current rate, cutting any voice it already has.
    pub fn play(&self, track: &Track) -> Result<VoiceHandle, PlaybackError> {
        let span = span!(Level::INFO, "play", track = track.name());
        let _enter = span.enter();

        let index = track.index();
        self.stop(track);

        let generation = NEXT_SLOT_GENERATION.fetch_add(1, Ordering::SeqCst);
        self.slots.lock().insert(
            index,
            Slot {
                generation,
                handle: None,
            },
        );

        let rate = track.rate().get();
        let on_complete = {
            let slots = self.slots.clone();
            Box::new(move || {
                let mut slots = slots.lock();
                if slots
                    .get(&index)
                    .is_some_and(|slot| slot.generation == generation)
                {
                    slots.remove(&index);
                    debug!(track = index, "Voice ended, track is idle");
                }
            })
        };

        // The lock must not be held here: an engine may finish the voice before returning.
        let result = self.engine.start_voice(track.buffer(), rate, on_complete);

        let mut slots = self.slots.lock();
        let owned = slots
            .get(&index)
            .is_some_and(|slot| slot.generation == generation);
        match result {
            Ok(handle) if owned => {
                if let Some(slot) = slots.get_mut(&index) {
                    slot.handle = Some(handle.clone());
                }
                info!(voice = handle.id(), rate, "Playing track.");
                Ok(handle)
            }
            Ok(handle) => {
                // A stop or another play claimed the slot while the voice was starting.
                drop(slots);
                debug!(voice = handle.id(), "Voice superseded while starting, stopping it");
                self.engine.stop_voice(&handle);
                Ok(handle)
            }
            Err(e) => {
                if owned {
                    slots.remove(&index);
                }
                Err(e)
            }
        }
    }

    /// Stops the track's voice. Returns false if the track wasn't playing.
    ///
    /// A voice that is still starting counts as playing; its play call stops it
    /// once the engine hands it back.
    pub fn stop(&self, track: &Track) -> bool {
        self.stop_index(track.index())
    }

    fn stop_index(&self, index: usize) -> bool {
        let slot = self.slots.lock().remove(&index);
        match slot {
            Some(Slot {
                handle: Some(handle),
                ..
            }) => {
                debug!(track = index, voice = handle.id(), "Stopping voice");
                self.engine.stop_voice(&handle);
                true
            }
            Some(Slot { handle: None, .. }) => {
                debug!(track = index, "Stopping voice that is still starting");
                true
            }
            None => false,
        }
    }

    /// Returns true if the track has a live voice.
    pub fn is_playing(&self, track: &Track) -> bool {
        self.slots.lock().contains_key(&track.index())
    }

    /// Returns the number of live voices across all tracks.
    pub fn active_count(&self) -> usize {
        self.slots.lock().len()
    }

    /// Stops every live voice.
    pub fn stop_all(&self) {
        let handles: Vec<VoiceHandle> = self
            .slots
            .lock()
            .drain()
            .filter_map(|(_, slot)| slot.handle)
            .collect();
        for handle in handles.iter() {
            self.engine.stop_voice(handle);
        }
        if !handles.is_empty() {
            info!(count = handles.len(), "Stopped all voices.");
        }
    }
}

impl fmt::Debug for VoiceManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VoiceManager")
            .field("engine", &self.engine.to_string())
            .field("active_voices", &self.active_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::path::Path;
    use std::time::Duration;

    use super::*;
    use crate::audio::mock::{self, VoiceEvent};
    use crate::audio::{Completion, Quality, RenderError, SampleBuffer};
    use crate::testutil::eventually;

    fn track(index: usize, frames: usize) -> Track {
        Track::new(
            index,
            Path::new("track.wav"),
            None,
            SampleBuffer::silence(2, frames, 8000),
            1.0,
        )
    }

    fn manager() -> (VoiceManager, mock::Engine) {
        let engine = mock::Engine::get("mock", Quality::Linear);
        (VoiceManager::new(Arc::new(engine.clone())), engine)
    }

    #[test]
    fn test_play_replaces_voice() {
        let (manager, engine) = manager();
        let track = track(0, 8000 * 60);

        let first = manager.play(&track).unwrap();
        let second = manager.play(&track).unwrap();

        assert!(manager.is_playing(&track));
        assert_eq!(manager.active_count(), 1);
        assert_eq!(engine.max_live_per_buffer(), 1);

        let stops: Vec<_> = engine
            .events()
            .into_iter()
            .filter(|event| matches!(event, VoiceEvent::Stopped { .. }))
            .collect();
        assert_eq!(stops, vec![VoiceEvent::Stopped { id: first.id() }]);

        // Give the replaced voice's completion time to run; it must not clear the new voice.
        std::thread::sleep(Duration::from_millis(50));
        assert!(manager.is_playing(&track));

        assert!(manager.stop(&track));
        assert!(!manager.is_playing(&track));
        assert!(engine
            .events()
            .contains(&VoiceEvent::Stopped { id: second.id() }));
    }

    #[test]
    fn test_rate_snapshot() {
        let (manager, engine) = manager();
        let track = track(0, 8000 * 60);

        track.rate().set(1.5);
        let handle = manager.play(&track).unwrap();
        track.rate().set(0.5);

        assert_eq!(handle.rate(), 1.5);
        assert_eq!(
            engine.events()[0],
            VoiceEvent::Started {
                id: handle.id(),
                rate: 1.5
            }
        );
        manager.stop_all();
    }

    #[test]
    fn test_natural_end_returns_to_idle() {
        let (manager, _engine) = manager();
        let track = track(0, 80);

        manager.play(&track).unwrap();
        eventually(|| !manager.is_playing(&track), "Track never went idle");
        assert!(!manager.stop(&track));
    }

    #[test]
    fn test_stop_idle_track() {
        let (manager, engine) = manager();
        let track = track(0, 80);
        assert!(!manager.stop(&track));
        assert!(engine.events().is_empty());
    }

    #[test]
    fn test_tracks_are_independent() {
        let (manager, _engine) = manager();
        let a = track(0, 8000 * 60);
        let b = track(1, 8000 * 60);

        manager.play(&a).unwrap();
        manager.play(&b).unwrap();
        assert_eq!(manager.active_count(), 2);

        manager.stop(&a);
        assert!(!manager.is_playing(&a));
        assert!(manager.is_playing(&b));

        manager.stop_all();
        assert_eq!(manager.active_count(), 0);
    }

    #[test]
    fn test_failed_start_leaves_track_idle() {
        let (manager, _engine) = manager();
        let track = Track::new(
            0,
            Path::new("empty.wav"),
            None,
            SampleBuffer::silence(2, 0, 8000),
            1.0,
        );

        assert!(matches!(
            manager.play(&track),
            Err(PlaybackError::EmptyBuffer)
        ));
        assert!(!manager.is_playing(&track));
    }

    /// An engine that hands completions back to the test instead of calling them.
    struct HeldEngine {
        completions: Mutex<Vec<(u64, Completion)>>,
    }

    impl fmt::Display for HeldEngine {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "held")
        }
    }

    impl Engine for HeldEngine {
        fn start_voice(
            &self,
            _buffer: Arc<SampleBuffer>,
            rate: f64,
            on_complete: Completion,
        ) -> Result<VoiceHandle, PlaybackError> {
            let handle = VoiceHandle::new(rate);
            self.completions.lock().push((handle.id(), on_complete));
            Ok(handle)
        }

        fn stop_voice(&self, _handle: &VoiceHandle) {}

        fn render_offline(
            &self,
            _buffer: &SampleBuffer,
            _rate: f64,
            _output_length: usize,
        ) -> Result<SampleBuffer, RenderError> {
            Err(RenderError::Rejected("unused".to_string()))
        }
    }

    /// An engine that takes a while to start voices and keeps count of the live ones.
    struct SlowEngine {
        live: Mutex<HashSet<u64>>,
    }

    impl SlowEngine {
        fn new() -> Arc<SlowEngine> {
            Arc::new(SlowEngine {
                live: Mutex::new(HashSet::new()),
            })
        }

        fn live_count(&self) -> usize {
            self.live.lock().len()
        }
    }

    impl fmt::Display for SlowEngine {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "slow")
        }
    }

    impl Engine for SlowEngine {
        fn start_voice(
            &self,
            _buffer: Arc<SampleBuffer>,
            rate: f64,
            _on_complete: Completion,
        ) -> Result<VoiceHandle, PlaybackError> {
            std::thread::sleep(Duration::from_millis(100));
            let handle = VoiceHandle::new(rate);
            self.live.lock().insert(handle.id());
            Ok(handle)
        }

        fn stop_voice(&self, handle: &VoiceHandle) {
            self.live.lock().remove(&handle.id());
        }

        fn render_offline(
            &self,
            _buffer: &SampleBuffer,
            _rate: f64,
            _output_length: usize,
        ) -> Result<SampleBuffer, RenderError> {
            Err(RenderError::Rejected("unused".to_string()))
        }
    }

    #[test]
    fn test_overlapping_plays_leave_one_voice() {
        let engine = SlowEngine::new();
        let manager = VoiceManager::new(engine.clone());
        let track = track(0, 80);

        std::thread::scope(|s| {
            s.spawn(|| manager.play(&track).unwrap());
            std::thread::sleep(Duration::from_millis(20));
            s.spawn(|| manager.play(&track).unwrap());
        });

        assert_eq!(engine.live_count(), 1);
        assert!(manager.is_playing(&track));

        manager.stop_all();
        assert_eq!(engine.live_count(), 0);
    }

    #[test]
    fn test_stop_while_starting() {
        let engine = SlowEngine::new();
        let manager = VoiceManager::new(engine.clone());
        let track = track(0, 80);

        std::thread::scope(|s| {
            s.spawn(|| manager.play(&track).unwrap());
            std::thread::sleep(Duration::from_millis(20));
            assert!(manager.stop(&track));
        });

        assert!(!manager.is_playing(&track));
        assert_eq!(engine.live_count(), 0);
    }

    #[test]
    fn test_late_completion_ignored() {
        let engine = Arc::new(HeldEngine {
            completions: Mutex::new(Vec::new()),
        });
        let manager = VoiceManager::new(engine.clone());
        let track = track(0, 80);

        let first = manager.play(&track).unwrap();
        let second = manager.play(&track).unwrap();

        let mut completions = std::mem::take(&mut *engine.completions.lock());
        let (id, late) = completions.remove(0);
        assert_eq!(id, first.id());
        late();
        assert!(manager.is_playing(&track));

        let (id, current) = completions.remove(0);
        assert_eq!(id, second.id());
        current();
        assert!(!manager.is_playing(&track));
    }
}
