//! Throttle entry implementation.

use std::time::Duration;
use tokio::time::Instant;

/// One client's usage of the current window.
///
/// An entry whose `window_end` has been reached is void: the next request
/// replaces it with a fresh window even if the sweep has not removed it yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleEntry {
    /// Requests observed in the current window
    pub count: u32,
    /// The instant the window ends
    pub window_end: Instant,
}

impl ThrottleEntry {
    /// Open a fresh window holding the first request.
    pub fn open(now: Instant, window: Duration) -> Self {
        Self {
            count: 1,
            window_end: now + window,
        }
    }

    /// Whether the window is over at `now`.
    pub fn is_expired(&self, now: Instant) -> bool {
        self.window_end <= now
    }

    /// Count one more request, saturating at `u32::MAX`.
    pub fn record(&mut self) -> u32 {
        self.count = self.count.saturating_add(1);
        self.count
    }

    /// Requests left before `limit` is reached.
    pub fn remaining(&self, limit: u32) -> u32 {
        limit.saturating_sub(self.count)
    }

    /// Time until the window resets.
    pub fn resets_in(&self, now: Instant) -> Duration {
        self.window_end.saturating_duration_since(now)
    }
}
