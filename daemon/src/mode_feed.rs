use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use std::time::{Duration, Instant};

use crate::config::ModeSettings;
use common::{CalendarMode, Mode};

/// Automatic day/night and calendar feed, checked on a fixed interval
#[derive(Debug, Clone)]
pub struct ModeFeed {
    day_start: NaiveTime,
    day_end: NaiveTime,

    /// Whether the feed drives the mode (off after a manual override)
    enabled: bool,

    /// Last check time
    last_check: Option<Instant>,

    /// Check interval (how often to recompute the mode)
    check_interval: Duration,

    /// Mode pushed by the last check
    last_mode: Option<Mode>,
}

impl ModeFeed {
    pub fn new(settings: &ModeSettings) -> Result<Self> {
        Ok(Self {
            day_start: parse_time(&settings.day_start)?,
            day_end: parse_time(&settings.day_end)?,
            enabled: settings.auto,
            last_check: None,
            check_interval: Duration::from_secs(settings.check_interval),
            last_mode: None,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Stop pushing modes until re-enabled
    pub fn disable(&mut self) {
        if self.enabled {
            log::info!("Automatic mode feed disabled (manual override)");
        }
        self.enabled = false;
    }

    /// Re-enable and push the current mode at the next check
    pub fn enable(&mut self) {
        log::info!("Automatic mode feed enabled");
        self.enabled = true;
        self.force_check();
    }

    /// Force an immediate check
    pub fn force_check(&mut self) {
        self.last_check = None;
        self.last_mode = None;
    }

    /// Check if it's time to recompute the mode
    pub fn should_check(&self, now: Instant) -> bool {
        self.enabled
            && self
                .last_check
                .is_none_or(|last| now.saturating_duration_since(last) >= self.check_interval)
    }

    /// When the next check is due; `None` while disabled
    pub fn next_check(&self, now: Instant) -> Option<Instant> {
        if !self.enabled {
            return None;
        }
        Some(self.last_check.map_or(now, |last| last + self.check_interval))
    }

    /// Recompute the mode for `local` time and return it if it changed
    pub fn check(&mut self, now: Instant, local: NaiveDateTime) -> Option<Mode> {
        self.last_check = Some(now);

        let mode = self.mode_at(local);
        if self.last_mode == Some(mode) {
            return None;
        }

        log::info!("Mode feed: {} at {}", mode, local.format("%Y-%m-%d %H:%M"));
        self.last_mode = Some(mode);
        Some(mode)
    }

    pub fn mode_at(&self, local: NaiveDateTime) -> Mode {
        Mode {
            is_day: time_in_range(&local.time(), &self.day_start, &self.day_end),
            calendar: calendar_for(local.date()),
        }
    }
}

/// Calendar period for a date: Halloween Oct 20 - Nov 2, Christmas Dec 20 - Jan 10
pub fn calendar_for(date: NaiveDate) -> CalendarMode {
    match (date.month(), date.day()) {
        (10, 20..) | (11, ..=2) => CalendarMode::Halloween,
        (12, 20..) | (1, ..=10) => CalendarMode::Christmas,
        _ => CalendarMode::Neutral,
    }
}

/// Check if current time is within a time range
fn time_in_range(current: &NaiveTime, start: &NaiveTime, end: &NaiveTime) -> bool {
    if start <= end {
        // Normal range (e.g., 06:00 - 18:00)
        current >= start && current < end
    } else {
        // Range crosses midnight (e.g., 22:00 - 06:00)
        current >= start || current < end
    }
}

/// Parse time string in HH:MM format
fn parse_time(time_str: &str) -> Result<NaiveTime> {
    let parts: Vec<&str> = time_str.split(':').collect();
    if parts.len() != 2 {
        anyhow::bail!("Invalid time format: {} (expected HH:MM)", time_str);
    }

    let hour: u32 = parts[0]
        .parse()
        .with_context(|| format!("Invalid hour in time: {}", time_str))?;
    let minute: u32 = parts[1]
        .parse()
        .with_context(|| format!("Invalid minute in time: {}", time_str))?;

    NaiveTime::from_hms_opt(hour, minute, 0).with_context(|| format!("Invalid time: {}", time_str))
}
