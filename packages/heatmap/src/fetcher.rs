//! Region → scored building points.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use soundmap_config::OverpassConfig;
use soundmap_models::{BoundingRegion, GeoPoint, InfrastructureCount, WeightedPoint};
use soundmap_overpass::OverpassError;

use crate::batch::RoadCountBatch;
use crate::cache::{CacheKey, Lookup, PendingScore, ScoreCache};
use crate::estimator::Estimator;
use crate::source::InfrastructureSource;
use crate::{FetchCause, FetchError, FetchPhase};

/// Query limits for one fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    /// Building query cap.
    pub max_buildings: u32,
    /// Road-count radius around each anchor, in meters.
    pub road_radius_m: u32,
    /// Deadline for each network stage.
    pub timeout: Duration,
}

impl From<&OverpassConfig> for FetchOptions {
    fn from(config: &OverpassConfig) -> Self {
        Self {
            max_buildings: config.max_buildings,
            road_radius_m: config.road_radius_m,
            timeout: config.timeout(),
        }
    }
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            max_buildings: 100,
            road_radius_m: 100,
            timeout: Duration::from_secs(10),
        }
    }
}

/// Infrastructure counted around a point, with its noise score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Survey {
    /// Survey center.
    pub center: GeoPoint,
    /// Survey radius in meters.
    pub radius_m: u32,
    /// Roads and buildings within the radius.
    pub counts: InfrastructureCount,
    /// Estimated score for the road count.
    pub score: f64,
}

/// Times a fetch looks an anchor up again after the fetch computing it gave
/// up, before failing with [`FetchCause::ConcurrentFailure`].
const RECLAIM_ROUNDS: usize = 2;

/// Where a building's score comes from.
enum Slot {
    Known(f64),
    Batched(usize),
    Waiting(usize),
    SameAnchorAs(usize),
}

/// Turns a region into one weighted point per building.
pub struct InfrastructureFetcher {
    source: Arc<dyn InfrastructureSource>,
    cache: ScoreCache,
    estimator: Estimator,
    options: FetchOptions,
}

impl InfrastructureFetcher {
    /// Creates a fetcher.
    #[must_use]
    pub fn new(
        source: Arc<dyn InfrastructureSource>,
        cache: ScoreCache,
        estimator: Estimator,
        options: FetchOptions,
    ) -> Self {
        Self {
            source,
            cache,
            estimator,
            options,
        }
    }

    /// Shared score cache.
    #[must_use]
    pub const fn cache(&self) -> &ScoreCache {
        &self.cache
    }

    /// Score estimator.
    #[must_use]
    pub const fn estimator(&self) -> &Estimator {
        &self.estimator
    }

    /// Fetches every building in `region` (up to the configured cap) and
    /// scores it.
    ///
    /// Buildings whose anchor is cached are scored from the cache. The rest
    /// are counted in a single batched road-count query; none is issued if
    /// every anchor is cached. Points come back in building-query order.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] if either query fails or times out, or if the
    /// road-count response does not line up with the request.
    pub async fn fetch(&self, region: &BoundingRegion) -> Result<Vec<WeightedPoint>, FetchError> {
        let limit = self.options.max_buildings;
        let buildings = self
            .timed(region, FetchPhase::Buildings, self.source.buildings(region, limit))
            .await?;

        if buildings.len() >= limit as usize {
            log::debug!("Building query for {region} hit the {limit}-building cap");
        }

        let mut slots = Vec::with_capacity(buildings.len());
        let mut batch = RoadCountBatch::default();
        let mut waiting: Vec<(GeoPoint, PendingScore)> = Vec::new();
        let mut first_with_key: BTreeMap<CacheKey, usize> = BTreeMap::new();

        for (index, building) in buildings.iter().enumerate() {
            let key = self.cache.key_for(building.anchor);
            if let Some(&first) = first_with_key.get(&key) {
                slots.push(Slot::SameAnchorAs(first));
                continue;
            }
            first_with_key.insert(key, index);

            slots.push(match self.cache.lookup(key).await {
                Lookup::Hit(score) => Slot::Known(score),
                Lookup::Claimed(claim) => {
                    batch.push(building.anchor, claim);
                    Slot::Batched(batch.len() - 1)
                }
                Lookup::Pending(pending) => {
                    waiting.push((building.anchor, pending));
                    Slot::Waiting(waiting.len() - 1)
                }
            });
        }

        // Our own claims are resolved before waiting on anyone else's, so
        // two fetches waiting on each other's anchors always make progress.
        let batched = self.score_batch(region, batch).await?;
        let waited = self.wait_for_others(region, waiting).await?;

        let mut scores: Vec<f64> = Vec::with_capacity(slots.len());
        for slot in &slots {
            let score = match *slot {
                Slot::Known(score) => score,
                Slot::Batched(i) => batched[i],
                Slot::Waiting(i) => waited[i],
                Slot::SameAnchorAs(first) => scores[first],
            };
            scores.push(score);
        }

        log::debug!(
            "Scored {} buildings in {region} ({} counted, {} awaited)",
            buildings.len(),
            batched.len(),
            waited.len()
        );

        Ok(buildings
            .iter()
            .zip(scores)
            .map(|(building, score)| WeightedPoint::at(building.anchor, score))
            .collect())
    }

    /// Counts roads around `center` and buildings near it, and scores the
    /// road count.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] if the survey query fails or times out.
    pub async fn survey(&self, center: GeoPoint, radius_m: u32) -> Result<Survey, FetchError> {
        let region = BoundingRegion {
            north_east: center,
            south_west: center,
        };
        let counts = self
            .timed(&region, FetchPhase::Survey, self.source.survey(center, radius_m))
            .await?;
        Ok(Survey {
            center,
            radius_m,
            counts,
            score: self.estimator.estimate(counts.road_count),
        })
    }

    async fn score_batch(
        &self,
        region: &BoundingRegion,
        batch: RoadCountBatch,
    ) -> Result<Vec<f64>, FetchError> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let counts = self
            .timed(
                region,
                FetchPhase::RoadCounts,
                self.source
                    .road_counts(batch.anchors(), self.options.road_radius_m),
            )
            .await?;

        let paired = batch
            .pair(counts)
            .map_err(|cause| FetchError::new(*region, FetchPhase::RoadCounts, cause))?;

        let mut scores = Vec::with_capacity(paired.len());
        for (claim, road_count) in paired {
            let score = self.estimator.estimate(road_count);
            claim.fulfil(score).await;
            scores.push(score);
        }
        Ok(scores)
    }

    /// Waits for anchors another fetch is counting. An anchor whose other
    /// fetch failed or was dropped is looked up again: it is then either
    /// cached, claimed and counted here, or being counted by yet another
    /// fetch, which is waited on in the next round.
    async fn wait_for_others(
        &self,
        region: &BoundingRegion,
        waiting: Vec<(GeoPoint, PendingScore)>,
    ) -> Result<Vec<f64>, FetchError> {
        let deadline = tokio::time::Instant::now() + self.options.timeout;
        let mut scores = vec![0.0; waiting.len()];
        let mut outstanding: Vec<(usize, GeoPoint, PendingScore)> = waiting
            .into_iter()
            .enumerate()
            .map(|(index, (anchor, pending))| (index, anchor, pending))
            .collect();

        for round in 0..=RECLAIM_ROUNDS {
            if outstanding.is_empty() {
                break;
            }

            let (slots, pending): (Vec<(usize, GeoPoint)>, Vec<PendingScore>) = outstanding
                .into_iter()
                .map(|(index, anchor, pending)| ((index, anchor), pending))
                .unzip();
            let results = tokio::time::timeout_at(
                deadline,
                futures::future::join_all(pending.into_iter().map(PendingScore::wait)),
            )
            .await
            .map_err(|_| {
                FetchError::new(
                    *region,
                    FetchPhase::RoadCounts,
                    FetchCause::TimedOut {
                        during: FetchPhase::RoadCounts,
                        after: self.options.timeout,
                    },
                )
            })?;

            outstanding = Vec::new();
            let mut batch = RoadCountBatch::default();
            let mut reclaimed = Vec::new();

            for ((index, anchor), result) in slots.into_iter().zip(results) {
                if let Some(score) = result {
                    scores[index] = score;
                    continue;
                }

                let key = self.cache.key_for(anchor);
                if round == RECLAIM_ROUNDS {
                    return Err(FetchError::new(
                        *region,
                        FetchPhase::RoadCounts,
                        FetchCause::ConcurrentFailure { key },
                    ));
                }

                log::debug!("Concurrent score computation for {key} gave up, looking it up again");
                match self.cache.lookup(key).await {
                    Lookup::Hit(score) => scores[index] = score,
                    Lookup::Claimed(claim) => {
                        batch.push(anchor, claim);
                        reclaimed.push(index);
                    }
                    Lookup::Pending(pending) => outstanding.push((index, anchor, pending)),
                }
            }

            let counted = self.score_batch(region, batch).await?;
            for (index, score) in reclaimed.into_iter().zip(counted) {
                scores[index] = score;
            }
        }

        Ok(scores)
    }

    async fn timed<T>(
        &self,
        region: &BoundingRegion,
        phase: FetchPhase,
        request: impl Future<Output = Result<T, OverpassError>> + Send,
    ) -> Result<T, FetchError> {
        match tokio::time::timeout(self.options.timeout, request).await {
            Ok(result) => result.map_err(|e| FetchError::new(*region, phase, e.into())),
            Err(_) => Err(FetchError::new(
                *region,
                phase,
                FetchCause::TimedOut {
                    during: phase,
                    after: self.options.timeout,
                },
            )),
        }
    }
}
