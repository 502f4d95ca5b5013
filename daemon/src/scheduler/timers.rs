use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Prepare the standby, retry a failed load, or poll for surface attach
    Prepare,
    /// Start the standby ahead of the crossfade
    Start,
    Crossfade,
}

impl TimerKind {
    /// Fire order for timers due at the same instant
    const ORDER: [TimerKind; 3] = [TimerKind::Prepare, TimerKind::Start, TimerKind::Crossfade];
}

/// The three scheduler timers as deadlines.
///
/// Re-arming a kind replaces its previous deadline, so at most one of each
/// is ever pending.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Timers {
    prepare: Option<Instant>,
    start: Option<Instant>,
    crossfade: Option<Instant>,
}

impl Timers {
    fn slot(&mut self, kind: TimerKind) -> &mut Option<Instant> {
        match kind {
            TimerKind::Prepare => &mut self.prepare,
            TimerKind::Start => &mut self.start,
            TimerKind::Crossfade => &mut self.crossfade,
        }
    }

    pub fn get(&self, kind: TimerKind) -> Option<Instant> {
        match kind {
            TimerKind::Prepare => self.prepare,
            TimerKind::Start => self.start,
            TimerKind::Crossfade => self.crossfade,
        }
    }

    pub fn arm(&mut self, kind: TimerKind, at: Instant) {
        *self.slot(kind) = Some(at);
    }

    /// Arm `kind` unless it is already due earlier
    pub fn arm_earliest(&mut self, kind: TimerKind, at: Instant) {
        let slot = self.slot(kind);
        *slot = Some(slot.map_or(at, |existing| existing.min(at)));
    }

    pub fn cancel(&mut self, kind: TimerKind) {
        *self.slot(kind) = None;
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        [self.prepare, self.start, self.crossfade]
            .into_iter()
            .flatten()
            .min()
    }

    /// Disarm and return the earliest timer due at `now`
    pub fn pop_due(&mut self, now: Instant) -> Option<TimerKind> {
        let due = self.next_deadline().filter(|at| *at <= now)?;
        let kind = TimerKind::ORDER
            .into_iter()
            .find(|kind| self.get(*kind) == Some(due))?;
        self.cancel(kind);
        Some(kind)
    }
}
