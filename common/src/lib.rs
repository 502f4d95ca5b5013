//! Common types and utilities for Standclock.
//!
//! This crate defines the shared data structures and IPC protocol used for
//! communication between the daemon (`standclockd`) and
//! client (`standctl`).
//!
//! # IPC Protocol
//!
//! Communication happens over a Unix domain socket using JSON-serialized
//! messages, one per line. The client sends [`Command`] variants and receives
//! [`Response`] variants.
//!
//! # Examples
//!
//! ```no_run
//! use common::{CalendarMode, Command};
//!
//! // Switch the display to night mode during the Christmas period
//! let cmd = Command::SetMode {
//!     is_day: false,
//!     calendar: CalendarMode::Christmas,
//! };
//!
//! // Serialize for sending over IPC
//! let json = serde_json::to_string(&cmd).unwrap();
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Common error types shared between client and daemon.
///
/// All errors are serializable for transmission over IPC.
#[derive(Error, Debug, Serialize, Deserialize)]
pub enum StandError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("IPC error: {0}")]
    Ipc(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<std::io::Error> for StandError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<serde_json::Error> for StandError {
    fn from(e: serde_json::Error) -> Self {
        Self::Ipc(e.to_string())
    }
}

/// Seasonal calendar period pushed alongside day/night.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CalendarMode {
    #[default]
    Neutral,
    Halloween,
    Christmas,
}

impl CalendarMode {
    /// Parse a calendar mode name (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "neutral" | "none" => Some(Self::Neutral),
            "halloween" => Some(Self::Halloween),
            "christmas" | "xmas" => Some(Self::Christmas),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Neutral => "neutral",
            Self::Halloween => "halloween",
            Self::Christmas => "christmas",
        }
    }
}

impl fmt::Display for CalendarMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Display mode: day/night plus the current calendar period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mode {
    pub is_day: bool,
    pub calendar: CalendarMode,
}

impl Default for Mode {
    fn default() -> Self {
        Self {
            is_day: true,
            calendar: CalendarMode::Neutral,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}",
            if self.is_day { "day" } else { "night" },
            self.calendar
        )
    }
}

/// Solid backdrop colour shown instead of video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackdropColor {
    White,
    Black,
}

impl BackdropColor {
    /// White during the day, black at night
    pub fn for_day(is_day: bool) -> Self {
        if is_day { Self::White } else { Self::Black }
    }

    /// ARGB8888 value for compositors
    pub fn argb(&self) -> u32 {
        match self {
            Self::White => 0xFFFF_FFFF,
            Self::Black => 0xFF00_0000,
        }
    }
}

/// Commands sent from client to daemon via IPC.
///
/// Each command maps onto one external input of the display core. Commands
/// are serialized to JSON and sent over a Unix socket.
///
/// # Examples
///
/// ```
/// use common::Command;
///
/// // Replace the video catalog
/// let cmd = Command::SetPlaylist {
///     paths: vec!["/srv/clips/d_meadow.mp4".to_string()],
/// };
/// ```
#[derive(Debug, Serialize, Deserialize)]
pub enum Command {
    /// Replace the video catalog with an explicit list of paths.
    SetPlaylist {
        /// Absolute paths to video clips
        paths: Vec<String>,
    },
    /// Re-scan the configured library sources
    Rescan,
    /// Push a day/night and calendar mode (disables the automatic feed)
    SetMode { is_day: bool, calendar: CalendarMode },
    /// Re-enable the automatic mode feed
    AutoMode,
    /// Suspend playback and all pending timers
    Pause,
    /// Resume playback, rescheduling timers from wall-clock time
    Resume,
    /// Query display status
    Status,
    /// Ping the daemon
    Ping,
    /// Kill the daemon
    Kill,
}

/// Response from daemon to client
#[derive(Debug, Serialize, Deserialize)]
pub enum Response {
    Ok,
    Error(StandError),
    Status(DisplayStatus),
    Pong,
}

/// Display status information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayStatus {
    pub version: String,
    pub uptime_secs: u64,
    /// Scheduler phase name (e.g. "playing", "crossfading", "backdrop")
    pub phase: String,
    pub mode: Mode,
    pub paused: bool,
    /// Whether the automatic mode feed is driving the mode
    pub auto_mode: bool,
    pub catalog_size: usize,
    pub current: Option<String>,
    pub standby: Option<String>,
    /// Time left on the visible clip
    pub remaining_ms: Option<u64>,
    /// Opacity of the two playback surfaces, in surface order
    pub opacity: [f32; 2],
    pub backdrop: Option<BackdropColor>,
}

/// IPC socket path helper
pub fn get_socket_path() -> std::path::PathBuf {
    let runtime_dir = std::env::var("XDG_RUNTIME_DIR")
        .unwrap_or_else(|_| format!("/run/user/{}", unsafe { libc::getuid() }));

    std::path::PathBuf::from(runtime_dir).join("standclock.sock")
}
