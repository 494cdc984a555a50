use std::collections::BTreeMap;

use rand::RngCore;

use crate::config::ConfigFile;
use crate::error::{AppError, AppResult};

use super::caliber::{self, Caliber};
use super::cartridge::{self, Cartridge};
use super::feature::{Feature, Patterns};

/// The full request catalog: process-wide header features, the parameter
/// tree and the cartridge forest. Built once from the configuration and
/// shared read-only by every worker.
#[derive(Debug)]
pub struct Magazine {
    features: Vec<Feature>,
    calibers: BTreeMap<String, Caliber>,
    cartridges: Vec<Cartridge>,
}

impl Magazine {
    /// Shapes the free-form config sections into the typed catalog. A
    /// missing `requests` section defaults to a single `GET /` cartridge.
    ///
    /// # Errors
    ///
    /// Returns an error when a request definition is malformed.
    pub fn from_config(config: &ConfigFile) -> AppResult<Self> {
        let patterns = Patterns::new().map_err(AppError::config)?;

        let features = config
            .headers
            .as_ref()
            .map(|map| cartridge::parse_feature_map(map, &patterns))
            .unwrap_or_default();

        let calibers = config
            .params
            .as_ref()
            .map(|map| caliber::build_root(map, &patterns.array_key))
            .unwrap_or_default();

        let mut next_id = 0u32;
        let mut cartridges = match config.requests.as_deref() {
            Some(raw) => cartridge::parse_cartridges(raw, &patterns, &mut next_id)?,
            None => Vec::new(),
        };
        if cartridges.is_empty() {
            cartridges.push(Cartridge::default_root(&patterns, &mut next_id));
        }

        Ok(Self {
            features,
            calibers,
            cartridges,
        })
    }

    /// Process-wide header features, applied before cartridge headers.
    #[must_use]
    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    #[must_use]
    pub fn cartridges(&self) -> &[Cartridge] {
        &self.cartridges
    }

    pub(crate) fn find_caliber(
        &self,
        path: &str,
        session: &mut Option<usize>,
        rng: &mut dyn RngCore,
    ) -> Option<&Caliber> {
        caliber::find(&self.calibers, path, session, rng)
    }

    /// Document-order leaves, the rows of the final report.
    #[must_use]
    pub fn leaves(&self) -> Vec<&Cartridge> {
        Cartridge::plain_slice(&self.cartridges)
    }

    /// Shots one worker fires per batch.
    #[must_use]
    pub fn shots_per_batch(&self) -> usize {
        self.cartridges.iter().map(Cartridge::leaf_count).sum()
    }
}
