//! Near-completion detection by polling playback position.
//!
//! Reported durations are often slightly off from the real end of stream, so
//! the lookahead is measured against the live position rather than a timer
//! started at `begin()`.

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct CompletionMonitor {
    /// Reported clip duration
    duration: Duration,
    /// Fire when remaining time drops to this window
    window: Duration,
    /// Polling cadence
    interval: Duration,
    next_check: Instant,
    fired: bool,
}

impl CompletionMonitor {
    pub fn new(duration: Duration, window: Duration, interval: Duration, now: Instant) -> Self {
        Self {
            duration,
            window,
            interval,
            next_check: now + interval,
            fired: false,
        }
    }

    /// When the next position check is due, `None` once fired
    pub fn next_check(&self) -> Option<Instant> {
        (!self.fired).then_some(self.next_check)
    }

    /// Check `position`; returns the remaining time exactly once, when the
    /// clip enters the lookahead window.
    ///
    /// A position already past the window (e.g. after a long pause) fires
    /// immediately with zero remaining.
    pub fn check(&mut self, now: Instant, position: Duration) -> Option<Duration> {
        if self.fired || now < self.next_check {
            return None;
        }

        let remaining = self.duration.saturating_sub(position);
        if remaining <= self.window {
            self.fired = true;
            return Some(remaining);
        }

        self.next_check = now + self.interval;
        None
    }

    /// Push the next check out after a pause so polling does not burst
    pub fn delay(&mut self, now: Instant) {
        self.next_check = now + self.interval;
    }
}
