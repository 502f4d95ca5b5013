use crate::asset::Asset;
use common::Mode;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{RngCore, SeedableRng};
use std::sync::Arc;

/// Brightness values used when a clip carries no explicit `b_NN` hint
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BrightnessPolicy {
    /// Untagged clips during the day
    pub day: f32,
    /// Untagged clips at night
    pub night: f32,
    /// `dn_` clips
    pub day_night: f32,
    /// `d_` and `n_` clips
    pub tagged: f32,
}

impl Default for BrightnessPolicy {
    fn default() -> Self {
        Self {
            day: 1.0,
            night: 0.8,
            day_night: 0.5,
            tagged: 1.0,
        }
    }
}

/// Chooses the next clip from the catalog according to the active mode.
///
/// The playlist (mode-filtered subset) is recomputed on every pick because
/// the mode can change between two selections.
pub struct ContentSelector {
    catalog: Vec<Arc<Asset>>,
    policy: BrightnessPolicy,
    rng: Box<dyn RngCore + Send>,
}

impl ContentSelector {
    pub fn new(policy: BrightnessPolicy) -> Self {
        Self::with_rng(policy, StdRng::from_os_rng())
    }

    /// Create a selector with a caller-provided RNG (seeded in tests)
    pub fn with_rng(policy: BrightnessPolicy, rng: impl RngCore + Send + 'static) -> Self {
        Self {
            catalog: Vec::new(),
            policy,
            rng: Box::new(rng),
        }
    }

    /// Replace the whole catalog
    pub fn set_catalog<I, P>(&mut self, paths: I)
    where
        I: IntoIterator<Item = P>,
        P: Into<std::path::PathBuf>,
    {
        self.catalog = paths
            .into_iter()
            .map(|p| Arc::new(Asset::new(p)))
            .collect();

        let day = self.catalog.iter().filter(|a| a.plays_by_day()).count();
        let night = self.catalog.iter().filter(|a| a.plays_by_night()).count();
        log::info!(
            "Catalog set: {} clips (day pool: {}, night pool: {})",
            self.catalog.len(),
            day,
            night
        );
    }

    pub fn catalog_len(&self) -> usize {
        self.catalog.len()
    }

    pub fn is_empty(&self) -> bool {
        self.catalog.is_empty()
    }

    /// Mode-appropriate subset, falling back to the full catalog when empty
    pub fn playlist(&self, mode: Mode) -> Vec<&Arc<Asset>> {
        let pool: Vec<&Arc<Asset>> = self
            .catalog
            .iter()
            .filter(|a| {
                if mode.is_day {
                    a.plays_by_day()
                } else {
                    a.plays_by_night()
                }
            })
            .collect();

        if pool.is_empty() {
            self.catalog.iter().collect()
        } else {
            pool
        }
    }

    /// Uniformly random pick; `None` only when the catalog is empty
    pub fn pick_next(&mut self, mode: Mode) -> Option<Arc<Asset>> {
        let pool: Vec<Arc<Asset>> = self.playlist(mode).into_iter().cloned().collect();
        pool.choose(&mut self.rng).cloned()
    }

    /// Peak opacity for a clip under the given mode
    pub fn brightness_for(&self, asset: &Asset, mode: Mode) -> f32 {
        if let Some(hint) = asset.brightness_hint() {
            return hint;
        }

        if asset.is_day_only() || asset.is_night_only() {
            self.policy.tagged
        } else if asset.is_day_night() {
            self.policy.day_night
        } else if mode.is_day {
            self.policy.day
        } else {
            self.policy.night
        }
    }
}
