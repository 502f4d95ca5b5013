use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::scheduler::Timing;
use crate::selector::BrightnessPolicy;
use crate::validate_enum;
use common::CalendarMode;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralSettings,

    #[serde(default)]
    pub library: LibrarySettings,

    #[serde(default)]
    pub timing: TimingSettings,

    #[serde(default)]
    pub brightness: BrightnessSettings,

    #[serde(default)]
    pub mode: ModeSettings,

    #[serde(default)]
    pub video: VideoSettings,
}

/// General daemon settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GeneralSettings {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Where clips come from
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LibrarySettings {
    /// Files, directories or glob patterns
    #[serde(default)]
    pub sources: Vec<String>,

    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Seconds between automatic rescans (0 = never)
    #[serde(default)]
    pub rescan_interval: u64,
}

impl Default for LibrarySettings {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            extensions: default_extensions(),
            rescan_interval: 0,
        }
    }
}

fn default_extensions() -> Vec<String> {
    vec![
        "mov".to_string(),
        "mp4".to_string(),
        "3gp".to_string(),
        "mkv".to_string(),
    ]
}

/// Scheduler timing, all values in milliseconds
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimingSettings {
    #[serde(default = "default_fade_duration")]
    pub fade_duration: u64,

    #[serde(default = "default_prepare_lead")]
    pub prepare_lead: u64,

    #[serde(default = "default_start_advance")]
    pub start_advance: u64,

    #[serde(default = "default_near_completion")]
    pub near_completion: u64,

    #[serde(default = "default_retry_backoff")]
    pub retry_backoff: u64,

    #[serde(default = "default_fade_poll")]
    pub fade_poll: u64,

    #[serde(default = "default_start_settle")]
    pub start_settle: u64,

    #[serde(default = "default_position_poll")]
    pub position_poll: u64,

    #[serde(default = "default_frame_interval")]
    pub frame_interval: u64,

    #[serde(default = "default_surface_poll")]
    pub surface_poll: u64,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            fade_duration: default_fade_duration(),
            prepare_lead: default_prepare_lead(),
            start_advance: default_start_advance(),
            near_completion: default_near_completion(),
            retry_backoff: default_retry_backoff(),
            fade_poll: default_fade_poll(),
            start_settle: default_start_settle(),
            position_poll: default_position_poll(),
            frame_interval: default_frame_interval(),
            surface_poll: default_surface_poll(),
        }
    }
}

fn default_fade_duration() -> u64 {
    1000
}
fn default_prepare_lead() -> u64 {
    2000
}
fn default_start_advance() -> u64 {
    300
}
fn default_near_completion() -> u64 {
    1200
}
fn default_retry_backoff() -> u64 {
    500
}
fn default_fade_poll() -> u64 {
    50
}
fn default_start_settle() -> u64 {
    100
}
fn default_position_poll() -> u64 {
    100
}
fn default_frame_interval() -> u64 {
    16
} // ~60 fps
fn default_surface_poll() -> u64 {
    100
}

impl TimingSettings {
    pub fn to_timing(&self) -> Timing {
        let ms = Duration::from_millis;
        Timing {
            fade: ms(self.fade_duration),
            prepare_lead: ms(self.prepare_lead),
            start_advance: ms(self.start_advance),
            near_completion: ms(self.near_completion),
            retry_backoff: ms(self.retry_backoff),
            fade_poll: ms(self.fade_poll),
            start_settle: ms(self.start_settle),
            position_poll: ms(self.position_poll),
            frame_interval: ms(self.frame_interval),
            surface_poll: ms(self.surface_poll),
        }
    }
}

/// Default brightness per clip class
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BrightnessSettings {
    #[serde(default = "default_full")]
    pub day: f32,

    #[serde(default = "default_night_brightness")]
    pub night: f32,

    #[serde(default = "default_day_night_brightness")]
    pub day_night: f32,

    /// `d_` and `n_` clips
    #[serde(default = "default_full")]
    pub tagged: f32,
}

impl Default for BrightnessSettings {
    fn default() -> Self {
        Self {
            day: default_full(),
            night: default_night_brightness(),
            day_night: default_day_night_brightness(),
            tagged: default_full(),
        }
    }
}

fn default_full() -> f32 {
    1.0
}
fn default_night_brightness() -> f32 {
    0.8
}
fn default_day_night_brightness() -> f32 {
    0.5
}

impl BrightnessSettings {
    pub fn to_policy(&self) -> BrightnessPolicy {
        BrightnessPolicy {
            day: self.day,
            night: self.night,
            day_night: self.day_night,
            tagged: self.tagged,
        }
    }
}

/// Automatic day/night and calendar feed
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModeSettings {
    #[serde(default = "default_true")]
    pub auto: bool,

    #[serde(default = "default_day_start")]
    pub day_start: String, // Format: "HH:MM"

    #[serde(default = "default_day_end")]
    pub day_end: String, // Format: "HH:MM"

    /// Calendar periods during which video plays
    #[serde(default = "default_video_periods")]
    pub video_periods: Vec<String>,

    /// Seconds between feed checks
    #[serde(default = "default_check_interval")]
    pub check_interval: u64,
}

impl Default for ModeSettings {
    fn default() -> Self {
        Self {
            auto: true,
            day_start: default_day_start(),
            day_end: default_day_end(),
            video_periods: default_video_periods(),
            check_interval: default_check_interval(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_day_start() -> String {
    "07:00".to_string()
}
fn default_day_end() -> String {
    "19:00".to_string()
}
fn default_video_periods() -> Vec<String> {
    vec!["christmas".to_string()]
}
fn default_check_interval() -> u64 {
    60
}

impl ModeSettings {
    /// Parsed `video_periods`; unknown names were rejected by validation
    pub fn periods(&self) -> Vec<CalendarMode> {
        self.video_periods
            .iter()
            .filter_map(|name| CalendarMode::parse(name))
            .collect()
    }
}

/// Decoder settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VideoSettings {
    #[serde(default = "default_decode_width")]
    pub decode_width: u32,

    #[serde(default = "default_decode_height")]
    pub decode_height: u32,

    /// Duration reported by the stub engine (builds without `video`)
    #[serde(default = "default_simulated_duration")]
    pub simulated_duration: u64,
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            decode_width: default_decode_width(),
            decode_height: default_decode_height(),
            simulated_duration: default_simulated_duration(),
        }
    }
}

fn default_decode_width() -> u32 {
    1920
}
fn default_decode_height() -> u32 {
    1080
}
fn default_simulated_duration() -> u64 {
    10_000
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::info!(
                "Config file not found at {}, using defaults",
                path.display()
            );
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::info!("Loaded configuration from {}", path.display());
        config.validate()?;

        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("standclock");

        Ok(config_dir.join("config.toml"))
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        self.validate_log_level(&self.general.log_level)?;
        self.validate_timing(&self.timing)?;

        let b = &self.brightness;
        for (name, value) in [
            ("day", b.day),
            ("night", b.night),
            ("day_night", b.day_night),
            ("tagged", b.tagged),
        ] {
            if !(0.0..=1.0).contains(&value) {
                anyhow::bail!("Brightness '{}' must be within 0.0-1.0: {}", name, value);
            }
        }

        self.validate_time(&self.mode.day_start)?;
        self.validate_time(&self.mode.day_end)?;
        for period in &self.mode.video_periods {
            self.validate_period(period)?;
        }
        if self.mode.check_interval == 0 {
            anyhow::bail!("mode.check_interval must be greater than 0");
        }

        if self.video.decode_width == 0 || self.video.decode_height == 0 {
            anyhow::bail!(
                "Invalid decode size: {}x{}",
                self.video.decode_width,
                self.video.decode_height
            );
        }
        if self.video.simulated_duration == 0 {
            anyhow::bail!("video.simulated_duration must be greater than 0");
        }

        Ok(())
    }

    fn validate_timing(&self, timing: &TimingSettings) -> Result<()> {
        if timing.fade_duration == 0 {
            anyhow::bail!("timing.fade_duration must be greater than 0");
        }

        for (name, value) in [
            ("fade_poll", timing.fade_poll),
            ("position_poll", timing.position_poll),
            ("frame_interval", timing.frame_interval),
            ("surface_poll", timing.surface_poll),
        ] {
            if value == 0 {
                anyhow::bail!("timing.{} must be greater than 0", name);
            }
        }

        if timing.near_completion < timing.fade_duration {
            anyhow::bail!(
                "timing.near_completion ({}) must not be shorter than fade_duration ({})",
                timing.near_completion,
                timing.fade_duration
            );
        }

        Ok(())
    }

    fn validate_log_level(&self, level: &str) -> Result<()> {
        validate_enum!(level, "trace", "debug", "info", "warn", "error")
    }

    fn validate_period(&self, period: &str) -> Result<()> {
        validate_enum!(period, "neutral", "halloween", "christmas")
    }

    fn validate_time(&self, time: &str) -> Result<()> {
        let parts: Vec<&str> = time.split(':').collect();
        if parts.len() != 2 {
            anyhow::bail!("Invalid time format: {} (expected HH:MM)", time);
        }

        let hour: u32 = parts[0]
            .parse()
            .with_context(|| format!("Invalid hour in time: {}", time))?;
        let minute: u32 = parts[1]
            .parse()
            .with_context(|| format!("Invalid minute in time: {}", time))?;

        if hour >= 24 {
            anyhow::bail!("Invalid hour (must be 0-23): {}", time);
        }
        if minute >= 60 {
            anyhow::bail!("Invalid minute (must be 0-59): {}", time);
        }

        Ok(())
    }
}
