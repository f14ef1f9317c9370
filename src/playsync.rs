// Copyright (C) 2024 Michael Wilson <mike@mdwn.dev>
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
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// A cancel handle is shared between whoever owns a voice and the engine playing it. It's the
/// engine's responsibility to respect a cancel request.
#[derive(Clone)]
pub struct CancelHandle {
    /// Set to true once the voice has been asked to stop.
    cancelled: Arc<Mutex<bool>>,
    /// Wakes anyone waiting on the handle when it is cancelled.
    condvar: Arc<Condvar>,
}

impl Default for CancelHandle {
    fn default() -> Self {
        CancelHandle::new()
    }
}

impl CancelHandle {
    /// Creates a new cancel handle.
    pub fn new() -> CancelHandle {
        CancelHandle {
            cancelled: Arc::new(Mutex::new(false)),
            condvar: Arc::new(Condvar::new()),
        }
    }

    /// Returns true if the voice has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.lock()
    }

    /// Cancels the voice. Returns true if this call did the cancelling.
    pub fn cancel(&self) -> bool {
        let mut cancelled = self.cancelled.lock();
        if *cancelled {
            return false;
        }
        *cancelled = true;
        self.condvar.notify_all();
        true
    }

    /// Waits until the handle is cancelled or the timeout elapses.
    /// Returns true if the handle was cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut cancelled = self.cancelled.lock();
        while !*cancelled {
            if self.condvar.wait_until(&mut cancelled, deadline).timed_out() {
                break;
            }
        }
        *cancelled
    }
}
