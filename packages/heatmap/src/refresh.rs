//! Region-change handling.
//!
//! Every call to [`HeatmapRefresher::refresh`] takes a new generation
//! number. A refresh only replaces the current layer if its generation is
//! still the newest when it finishes; otherwise its result is dropped, so
//! a slow response for an old region can never overwrite a newer one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use soundmap_config::RefreshConfig;
use soundmap_models::{BoundingRegion, HeatmapDisplay, HeatmapLayer};

use crate::FetchError;
use crate::assembler::assemble;
use crate::fetcher::InfrastructureFetcher;

/// Result of a refresh that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    /// The layer is now current.
    Applied(HeatmapLayer),
    /// A newer region change arrived first; nothing was applied.
    Superseded,
}

/// Owns the current heatmap layer and applies region changes to it.
///
/// One refresher serves one map view. Several refreshers may share a
/// fetcher, and with it the score cache and in-flight road counts.
pub struct HeatmapRefresher {
    fetcher: Arc<InfrastructureFetcher>,
    display: HeatmapDisplay,
    options: RefreshConfig,
    generation: AtomicU64,
    current: RwLock<Option<(u64, HeatmapLayer)>>,
}

impl HeatmapRefresher {
    /// Creates a refresher with no layer applied yet. Layers are assembled
    /// with `display`; `options` controls debouncing and placeholders.
    #[must_use]
    pub const fn new(
        fetcher: Arc<InfrastructureFetcher>,
        display: HeatmapDisplay,
        options: RefreshConfig,
    ) -> Self {
        Self {
            fetcher,
            display,
            options,
            generation: AtomicU64::new(0),
            current: RwLock::new(None),
        }
    }

    /// Fetcher used for region changes, shared with any other refresher
    /// built from it.
    #[must_use]
    pub const fn fetcher(&self) -> &Arc<InfrastructureFetcher> {
        &self.fetcher
    }

    /// The layer most recently applied, if any.
    #[must_use]
    pub fn current(&self) -> Option<HeatmapLayer> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|(_, layer)| layer.clone())
    }

    fn is_superseded(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) != generation
    }

    /// Waits out the debounce window, fetches `region`, and applies the
    /// resulting layer unless a newer refresh started in the meantime.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] if the fetch for the newest region fails. The
    /// current layer is left untouched. Failures of superseded refreshes
    /// are logged and reported as [`RefreshOutcome::Superseded`].
    pub async fn refresh(&self, region: BoundingRegion) -> Result<RefreshOutcome, FetchError> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let debounce = self.options.debounce();
        if !debounce.is_zero() {
            tokio::time::sleep(debounce).await;
            if self.is_superseded(generation) {
                log::debug!("Region change #{generation} to {region} superseded during debounce");
                return Ok(RefreshOutcome::Superseded);
            }
        }

        log::info!("Fetching heatmap for {region} (#{generation})");
        let result = self.fetcher.fetch(&region).await;

        if self.is_superseded(generation) {
            match result {
                Ok(points) => log::debug!(
                    "Discarding {} points for {region}: superseded by a newer region",
                    points.len()
                ),
                Err(e) => log::debug!("Ignoring failure of superseded fetch #{generation}: {e}"),
            }
            return Ok(RefreshOutcome::Superseded);
        }

        let points = result.inspect_err(|e| {
            log::error!("{e}, keeping the previous heatmap");
        })?;
        let layer = assemble(region, points, &self.display, self.options.placeholder);

        let mut current = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if self.is_superseded(generation)
            || current.as_ref().is_some_and(|(applied, _)| *applied > generation)
        {
            return Ok(RefreshOutcome::Superseded);
        }
        *current = Some((generation, layer.clone()));
        drop(current);

        log::info!(
            "Applied heatmap for {region} with {} points",
            layer.points.len()
        );
        Ok(RefreshOutcome::Applied(layer))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use soundmap_config::{CacheConfig, ScoringConfig};

    use super::*;
    use crate::FetchPhase;
    use crate::cache::ScoreCache;
    use crate::estimator::Estimator;
    use crate::fetcher::FetchOptions;
    use crate::fetcher::tests::{FakeSource, anchor, region};

    fn refresher(source: Arc<FakeSource>, debounce_ms: u64) -> Arc<HeatmapRefresher> {
        let fetcher = InfrastructureFetcher::new(
            source,
            ScoreCache::new(&CacheConfig::default()),
            Estimator::new(ScoringConfig::default()),
            FetchOptions::default(),
        );
        Arc::new(HeatmapRefresher::new(
            Arc::new(fetcher),
            HeatmapDisplay::default(),
            RefreshConfig {
                debounce_ms,
                ..RefreshConfig::default()
            },
        ))
    }

    fn small_region() -> BoundingRegion {
        BoundingRegion {
            north_east: anchor(47.615, -122.32),
            south_west: anchor(47.605, -122.34),
        }
    }

    fn two_buildings() -> Arc<FakeSource> {
        Arc::new(FakeSource::with_buildings(&[
            (anchor(47.61, -122.33), 3),
            (anchor(47.65, -122.30), 12),
        ]))
    }

    #[tokio::test]
    async fn applies_layer_and_exposes_it() {
        let refresher = refresher(two_buildings(), 0);
        assert!(refresher.current().is_none());

        let RefreshOutcome::Applied(layer) = refresher.refresh(region()).await.unwrap() else {
            panic!("refresh should apply");
        };
        assert_eq!(layer.points.len(), 2);
        assert_eq!(refresher.current(), Some(layer));
    }

    #[tokio::test]
    async fn empty_region_applies_placeholder_layer() {
        let refresher = refresher(Arc::new(FakeSource::default()), 0);
        let RefreshOutcome::Applied(layer) = refresher.refresh(region()).await.unwrap() else {
            panic!("refresh should apply");
        };
        assert_eq!(layer.points.len(), 2);
        assert!(layer.points.iter().all(|p| p.weight.abs() < f64::EPSILON));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_older_fetch_never_overwrites_newer_region() {
        let source = two_buildings();
        *source.road_count_delay.lock().unwrap() = Duration::from_millis(500);
        let refresher = refresher(source.clone(), 0);

        let older = tokio::spawn({
            let refresher = refresher.clone();
            async move { refresher.refresh(region()).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        let newer = refresher.refresh(small_region()).await.unwrap();
        let older = older.await.unwrap().unwrap();

        assert_eq!(older, RefreshOutcome::Superseded);
        let RefreshOutcome::Applied(layer) = newer else {
            panic!("newest refresh should apply");
        };
        assert_eq!(layer.region, small_region());
        assert_eq!(layer.points.len(), 1);
        assert_eq!(refresher.current().unwrap().region, small_region());

        // The newer fetch reused the anchor the older one was counting.
        assert_eq!(source.road_count_call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_superseded_fetch_does_not_break_newer_refresh() {
        let source = two_buildings();
        *source.road_count_delay.lock().unwrap() = Duration::from_millis(500);
        source
            .failing_road_counts
            .store(1, std::sync::atomic::Ordering::SeqCst);
        let refresher = refresher(source.clone(), 0);

        let older = tokio::spawn({
            let refresher = refresher.clone();
            async move { refresher.refresh(region()).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        let newer = refresher.refresh(region()).await.unwrap();
        let older = older.await.unwrap().unwrap();

        assert_eq!(older, RefreshOutcome::Superseded);
        assert!(matches!(newer, RefreshOutcome::Applied(_)));
        assert_eq!(source.road_count_call_count(), 2);
        assert!(refresher.current().is_some());
    }

    #[tokio::test]
    async fn refreshers_sharing_a_fetcher_keep_separate_layers() {
        let source = two_buildings();
        let shared = refresher(source.clone(), 0).fetcher().clone();
        let first = HeatmapRefresher::new(
            shared.clone(),
            HeatmapDisplay::default(),
            RefreshConfig {
                debounce_ms: 0,
                ..RefreshConfig::default()
            },
        );
        let second = HeatmapRefresher::new(
            shared,
            HeatmapDisplay::default(),
            RefreshConfig {
                debounce_ms: 0,
                ..RefreshConfig::default()
            },
        );

        let (a, b) = tokio::join!(first.refresh(region()), second.refresh(small_region()));
        assert!(matches!(a.unwrap(), RefreshOutcome::Applied(_)));
        assert!(matches!(b.unwrap(), RefreshOutcome::Applied(_)));
        assert_eq!(first.current().unwrap().region, region());
        assert_eq!(second.current().unwrap().region, small_region());
        assert_eq!(source.road_count_call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn debounce_drops_intermediate_regions() {
        let source = two_buildings();
        let refresher = refresher(source.clone(), 250);

        let first = tokio::spawn({
            let refresher = refresher.clone();
            async move { refresher.refresh(region()).await }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;

        let second = refresher.refresh(small_region()).await.unwrap();
        assert_eq!(first.await.unwrap().unwrap(), RefreshOutcome::Superseded);
        assert!(matches!(second, RefreshOutcome::Applied(_)));
        assert_eq!(
            source
                .building_calls
                .load(std::sync::atomic::Ordering::SeqCst),
            1
        );
    }

    #[tokio::test]
    async fn failure_keeps_previous_layer() {
        let source = two_buildings();
        let refresher = refresher(source.clone(), 0);

        let RefreshOutcome::Applied(before) = refresher.refresh(region()).await.unwrap() else {
            panic!("refresh should apply");
        };

        *source.fail_buildings.lock().unwrap() = true;
        let err = refresher.refresh(small_region()).await.unwrap_err();
        assert_eq!(err.phase, FetchPhase::Buildings);
        assert_eq!(refresher.current(), Some(before));
    }
}
