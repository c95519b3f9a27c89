#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Noise heatmap pipeline.
//!
//! A region change flows through four stages:
//!
//! 1. [`fetcher::InfrastructureFetcher`] queries Overpass for the buildings
//!    in the region, then issues a single batched road-count query for the
//!    buildings whose anchor is not already in the [`cache::ScoreCache`].
//! 2. [`estimator::Estimator`] turns each road count into a noise score.
//! 3. [`assembler`] wraps the scored points and display settings into a
//!    [`soundmap_models::HeatmapLayer`].
//! 4. [`refresh::HeatmapRefresher`] debounces region changes and only
//!    applies a layer if no newer region change arrived while it was being
//!    fetched.

pub mod assembler;
pub mod batch;
pub mod cache;
pub mod estimator;
pub mod fetcher;
pub mod refresh;
pub mod source;

use std::time::Duration;

use soundmap_models::BoundingRegion;
use soundmap_overpass::OverpassError;
use strum_macros::{AsRefStr, Display};
use thiserror::Error;

pub use cache::{CacheKey, CacheStats, ScoreCache};
pub use estimator::Estimator;
pub use fetcher::{FetchOptions, InfrastructureFetcher, Survey};
pub use refresh::{HeatmapRefresher, RefreshOutcome};
pub use source::InfrastructureSource;

/// Stage of a fetch that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum FetchPhase {
    /// Building footprint query.
    Buildings,
    /// Batched road-count query.
    RoadCounts,
    /// Point survey (road and building counts around a center).
    Survey,
    /// Any stage that exceeded its deadline.
    Timeout,
}

/// Underlying reason for a [`FetchError`].
#[derive(Debug, Error)]
pub enum FetchCause {
    /// Overpass request failed.
    #[error(transparent)]
    Overpass(#[from] OverpassError),

    /// Overpass returned a different number of counts than were requested.
    #[error("expected {expected} road counts, got {actual}")]
    CountMismatch {
        /// Anchors sent in the batch.
        expected: usize,
        /// Counts received.
        actual: usize,
    },

    /// A stage did not finish in time.
    #[error("{during} did not finish within {after:?}")]
    TimedOut {
        /// Stage that was running.
        during: FetchPhase,
        /// Deadline that elapsed.
        after: Duration,
    },

    /// Another fetch was computing this anchor's score and failed.
    #[error("concurrent score computation for {key} failed")]
    ConcurrentFailure {
        /// Cache key of the abandoned anchor.
        key: CacheKey,
    },
}

/// A heatmap fetch failed. The previous heatmap stays in place.
#[derive(Debug, Error)]
#[error("Failed to fetch {phase} for {region}: {cause}")]
pub struct FetchError {
    /// Region being fetched.
    pub region: BoundingRegion,
    /// Stage that failed.
    pub phase: FetchPhase,
    /// Why it failed.
    #[source]
    pub cause: FetchCause,
}

impl FetchError {
    /// Creates an error for `phase`, reclassifying Overpass timeouts as
    /// [`FetchPhase::Timeout`].
    #[must_use]
    pub fn new(region: BoundingRegion, phase: FetchPhase, cause: FetchCause) -> Self {
        let timed_out = match &cause {
            FetchCause::Overpass(e) => e.is_timeout(),
            FetchCause::TimedOut { .. } => true,
            FetchCause::CountMismatch { .. } | FetchCause::ConcurrentFailure { .. } => false,
        };
        let phase = if timed_out { FetchPhase::Timeout } else { phase };
        Self {
            region,
            phase,
            cause,
        }
    }
}
