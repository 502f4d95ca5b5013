//! Video assets and the filename authoring convention.
//!
//! Content authors steer selection and exposure through the file name alone
//! (matched case-insensitively):
//!
//! - `d_...`  day-only clip
//! - `n_...`  night-only clip
//! - `dn_...` day/night clip (night-eligible, dimmed by default)
//! - `...b_NN...` explicit brightness of `NN` percent

use std::path::{Path, PathBuf};

/// One video clip plus the metadata derived from its file name.
///
/// Assets are immutable once the catalog is built.
#[derive(Debug, Clone, PartialEq)]
pub struct Asset {
    path: PathBuf,
    /// Lowercased file name
    name: String,
    day_only: bool,
    night_only: bool,
    day_night: bool,
    brightness_hint: Option<f32>,
}

impl Asset {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        Self {
            day_only: name.starts_with("d_"),
            night_only: name.starts_with("n_"),
            day_night: name.contains("dn_"),
            brightness_hint: parse_brightness_hint(&name),
            name,
            path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lowercased file name, used for logging and status
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_day_only(&self) -> bool {
        self.day_only
    }

    pub fn is_night_only(&self) -> bool {
        self.night_only
    }

    pub fn is_day_night(&self) -> bool {
        self.day_night
    }

    /// Member of the day pool
    pub fn plays_by_day(&self) -> bool {
        self.day_only
    }

    /// Member of the night pool
    pub fn plays_by_night(&self) -> bool {
        self.night_only || self.name.starts_with("dn_")
    }

    /// Explicit `b_NN` brightness, already clamped to [0, 1]
    pub fn brightness_hint(&self) -> Option<f32> {
        self.brightness_hint
    }
}

/// Find the first `b_` followed by two ASCII digits.
///
/// Malformed hints (`b_x1`, `b_5.`) are skipped rather than treated as errors.
fn parse_brightness_hint(name: &str) -> Option<f32> {
    let bytes = name.as_bytes();

    name.match_indices("b_").find_map(|(idx, _)| {
        let digits = bytes.get(idx + 2..idx + 4)?;
        if !digits.iter().all(u8::is_ascii_digit) {
            return None;
        }

        let percent = (digits[0] - b'0') as f32 * 10.0 + (digits[1] - b'0') as f32;
        Some((percent / 100.0).clamp(0.0, 1.0))
    })
}
