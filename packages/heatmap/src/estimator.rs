//! Road-count noise estimate.
//!
//! `score = road_count * weight_factor`. Scores at or below `floor` become
//! exactly 0 so sparse areas do not render as faint speckles, and a
//! configured `ceiling` caps the result. With the default constants
//! (`weight_factor = 0.5`, `floor = 1`) up to two roads score 0, three
//! roads score 1.5, and twelve score 6.

use soundmap_config::ScoringConfig;

/// Maps road counts to noise scores.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimator {
    config: ScoringConfig,
}

impl Estimator {
    /// Creates an estimator with the given constants.
    #[must_use]
    pub const fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    /// The constants in use.
    #[must_use]
    pub const fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Noise score for `road_count` roads near an anchor.
    #[must_use]
    pub fn estimate(&self, road_count: u64) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let raw = road_count as f64 * self.config.weight_factor;
        if raw <= self.config.floor {
            return 0.0;
        }
        self.config.ceiling.map_or(raw, |ceiling| raw.min(ceiling))
    }
}

impl Default for Estimator {
    fn default() -> Self {
        Self::new(ScoringConfig::default())
    }
}
