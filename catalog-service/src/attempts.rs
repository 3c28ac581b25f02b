//! Probe attempt generations.
//!
//! Every probe attempt for a server takes a new, strictly increasing token.
//! Only the holder of the latest token may commit a cache write, so an
//! attempt that was overtaken by a newer one cannot overwrite its result.

use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct AttemptTracker {
    state: Mutex<TrackerState>,
}

#[derive(Debug, Default)]
struct TrackerState {
    next: u64,
    latest: HashMap<String, u64>,
}

impl AttemptTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts an attempt for `server_id` and returns its token.
    pub fn begin(&self, server_id: &str) -> u64 {
        let mut state = self.lock();
        state.next += 1;
        let token = state.next;
        state.latest.insert(server_id.to_string(), token);
        token
    }

    /// Ends the attempt. Returns `false` if it had been superseded, in which
    /// case the caller must discard its result.
    pub fn finish(&self, server_id: &str, token: u64) -> bool {
        let mut state = self.lock();
        if state.latest.get(server_id) == Some(&token) {
            state.latest.remove(server_id);
            true
        } else {
            false
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
