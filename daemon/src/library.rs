use glob::{Pattern, glob};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::config::LibrarySettings;

/// Media library: where the catalog comes from and when to look again
#[derive(Debug, Clone)]
pub struct Library {
    sources: Vec<String>,
    extensions: Vec<String>,

    /// None = never rescan
    rescan_interval: Option<Duration>,

    last_scan: Option<Instant>,
}

impl Library {
    pub fn new(settings: &LibrarySettings) -> Self {
        Self {
            sources: settings.sources.clone(),
            extensions: settings.extensions.clone(),
            rescan_interval: (settings.rescan_interval > 0)
                .then(|| Duration::from_secs(settings.rescan_interval)),
            last_scan: None,
        }
    }

    pub fn has_sources(&self) -> bool {
        !self.sources.is_empty()
    }

    /// Owned copy of the scan inputs, for running the scan off the control loop
    pub fn scanner(&self) -> impl FnOnce() -> Vec<PathBuf> + Send + 'static {
        let sources = self.sources.clone();
        let extensions = self.extensions.clone();
        move || scan_sources(&sources, &extensions)
    }

    pub fn mark_scanned(&mut self, now: Instant) {
        self.last_scan = Some(now);
    }

    /// When the next periodic rescan is due
    pub fn next_rescan(&self) -> Option<Instant> {
        let interval = self.rescan_interval?;
        self.last_scan.map(|t| t + interval)
    }

    pub fn should_rescan(&self, now: Instant) -> bool {
        self.next_rescan().is_some_and(|at| now >= at)
    }
}

/// Collect clips from files, directories and glob patterns.
///
/// The result is sorted and free of duplicates.
pub fn scan_sources(sources: &[String], extensions: &[String]) -> Vec<PathBuf> {
    let mut clips = Vec::new();

    for source in sources {
        let expanded_source = shellexpand::tilde(source);

        let source_path = Path::new(expanded_source.as_ref());
        if source_path.is_file() {
            if has_valid_extension(source_path, extensions) {
                clips.push(source_path.to_path_buf());
            } else {
                log::debug!("Skipping {}: unsupported extension", source_path.display());
            }
            continue;
        }

        if source_path.is_dir() {
            let pattern = format!("{}/*", Pattern::escape(&expanded_source));
            if let Ok(entries) = glob(&pattern) {
                clips.extend(
                    entries
                        .flatten()
                        .filter(|entry| entry.is_file() && has_valid_extension(entry, extensions)),
                );
            }
            continue;
        }

        // Try as glob pattern
        match glob(&expanded_source) {
            Ok(entries) => {
                clips.extend(
                    entries
                        .flatten()
                        .filter(|entry| entry.is_file() && has_valid_extension(entry, extensions)),
                );
            }
            Err(e) => {
                log::warn!("Failed to glob pattern '{}': {}", source, e);
            }
        }
    }

    clips.sort();
    clips.dedup();

    log::info!(
        "Library scan found {} clips in {} sources",
        clips.len(),
        sources.len()
    );
    clips
}

fn has_valid_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
}
