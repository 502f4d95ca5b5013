//! Mode and lifecycle control on top of the crossfade scheduler.

use crate::scheduler::{CrossfadeScheduler, Phase};
use common::{BackdropColor, CalendarMode, Mode};
use std::path::PathBuf;
use std::time::Instant;

/// Applies external inputs (mode, playlist, pause) to the scheduler
pub struct ModeController {
    /// Calendar periods during which video plays
    video_periods: Vec<CalendarMode>,
}

impl ModeController {
    pub fn new(video_periods: Vec<CalendarMode>) -> Self {
        if video_periods.is_empty() {
            log::warn!("No video periods configured, video will never play");
        }
        Self { video_periods }
    }

    pub fn video_active(&self, calendar: CalendarMode) -> bool {
        self.video_periods.contains(&calendar)
    }

    /// Switch mode; video stops outside the configured periods
    pub fn set_mode(&self, sched: &mut CrossfadeScheduler, mode: Mode, now: Instant) {
        let previous = sched.mode();
        sched.apply_mode(mode);
        if previous != mode {
            log::info!("Mode {} -> {}", previous, mode);
        }

        if !self.video_active(mode.calendar) {
            sched.enter_backdrop(BackdropColor::for_day(mode.is_day));
            return;
        }

        if !sched.is_advancing() {
            sched.restart(now);
        }
    }

    /// Replace the catalog.
    ///
    /// A running cycle keeps going and picks from the new catalog at its next
    /// selection; an idle scheduler starts over.
    pub fn set_playlist(&self, sched: &mut CrossfadeScheduler, paths: Vec<PathBuf>, now: Instant) {
        log::info!("Playlist updated: {} clips", paths.len());
        sched.set_catalog(paths);

        match sched.phase() {
            Phase::Idle if self.video_active(sched.mode().calendar) => sched.restart(now),
            Phase::Idle => sched.enter_backdrop(BackdropColor::for_day(sched.mode().is_day)),
            _ => {}
        }
    }

    pub fn pause(&self, sched: &mut CrossfadeScheduler, now: Instant) {
        sched.pause(now);
    }

    pub fn resume(&self, sched: &mut CrossfadeScheduler, now: Instant) {
        sched.resume(now);
    }

    pub fn release(&self, sched: &mut CrossfadeScheduler) {
        sched.release();
    }
}
