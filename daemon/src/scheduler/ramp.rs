use std::time::{Duration, Instant};

/// Linear 0 to 1 progress over a fixed duration, freezable while paused
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ramp {
    started: Instant,
    duration: Duration,
    frozen_at: Option<Instant>,
}

impl Ramp {
    pub fn new(started: Instant, duration: Duration) -> Self {
        Self {
            started,
            duration,
            frozen_at: None,
        }
    }

    /// Get progress (0.0 to 1.0)
    pub fn progress(&self, now: Instant) -> f32 {
        if self.duration.is_zero() {
            return 1.0;
        }
        let now = self.frozen_at.unwrap_or(now);
        let elapsed = now.saturating_duration_since(self.started);
        (elapsed.as_secs_f32() / self.duration.as_secs_f32()).min(1.0)
    }

    pub fn is_complete(&self, now: Instant) -> bool {
        self.frozen_at.is_none() && now >= self.ends_at()
    }

    pub fn ends_at(&self) -> Instant {
        self.started + self.duration
    }

    pub fn freeze(&mut self, now: Instant) {
        if self.frozen_at.is_none() {
            self.frozen_at = Some(now);
        }
    }

    /// Continue from the frozen progress
    pub fn thaw(&mut self, now: Instant) {
        if let Some(at) = self.frozen_at.take() {
            self.started += now.saturating_duration_since(at);
        }
    }
}
