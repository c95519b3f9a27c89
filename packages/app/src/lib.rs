#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! The sound map as one object.
//!
//! [`SoundMap`] wires the Overpass client, score cache, estimator and
//! refreshers together from an [`AppConfig`], and adds place search,
//! recording markers and permission handling on top. The HTTP server and
//! the CLI both drive it.
//!
//! Each map session gets its own [`HeatmapRefresher`], so region changes
//! only supersede earlier changes of the same session. All sessions share
//! one fetcher and score cache.

pub mod recordings;

use std::sync::Arc;

use moka::sync::Cache;
use soundmap_config::{AppConfig, RefreshConfig};
use soundmap_geocoder::{GeocodeError, NominatimClient};
use soundmap_heatmap::{
    CacheStats, Estimator, FetchError, FetchOptions, HeatmapRefresher, InfrastructureFetcher,
    InfrastructureSource, RefreshOutcome, ScoreCache, Survey,
};
use soundmap_models::{
    BoundingRegion, Capability, GeoPoint, HeatmapDisplay, HeatmapLayer, LegendBand, MapRegion,
    PermissionState, RecordingMarker, RecordingSession,
};
use soundmap_overpass::OverpassClient;
use thiserror::Error;
use uuid::Uuid;

pub use recordings::RecordingStore;

/// Session used when a caller does not name one.
pub const DEFAULT_SESSION: &str = "default";

/// The user declined a capability the operation needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Permission for {capability} was denied")]
pub struct PermissionDenied {
    /// The declined capability.
    pub capability: Capability,
}

impl PermissionDenied {
    /// Fails with [`PermissionDenied`] unless `state` is granted.
    ///
    /// # Errors
    ///
    /// Returns [`PermissionDenied`] if `state` is [`PermissionState::Denied`].
    pub const fn check(capability: Capability, state: PermissionState) -> Result<(), Self> {
        match state {
            PermissionState::Granted => Ok(()),
            PermissionState::Denied => Err(Self { capability }),
        }
    }
}

/// Errors surfaced by [`SoundMap`].
#[derive(Debug, Error)]
pub enum AppError {
    /// Heatmap or survey fetch failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Place search failed.
    #[error(transparent)]
    Geocode(#[from] GeocodeError),

    /// A required permission was denied.
    #[error(transparent)]
    PermissionDenied(#[from] PermissionDenied),

    /// Caller-supplied data was rejected.
    #[error("Invalid input: {message}")]
    InvalidInput {
        /// What was wrong.
        message: String,
    },

    /// An HTTP client could not be constructed.
    #[error("Setup failed: {message}")]
    Setup {
        /// Description of the failure.
        message: String,
    },
}

/// Heatmap sessions, search and recordings.
pub struct SoundMap {
    fetcher: Arc<InfrastructureFetcher>,
    sessions: Cache<String, Arc<HeatmapRefresher>>,
    display: HeatmapDisplay,
    refresh: RefreshConfig,
    geocoder: NominatimClient,
    recordings: RecordingStore,
}

impl SoundMap {
    /// Builds the production pipeline against the configured Overpass and
    /// Nominatim endpoints.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Setup`] if either HTTP client cannot be built.
    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        let overpass = OverpassClient::new(&config.overpass).map_err(|e| AppError::Setup {
            message: format!("Overpass client: {e}"),
        })?;
        let geocoder = NominatimClient::new(&config.nominatim).map_err(|e| AppError::Setup {
            message: format!("Nominatim client: {e}"),
        })?;
        log::info!(
            "Using Overpass at {} and Nominatim at {}",
            overpass.base_url(),
            config.nominatim.base_url
        );
        Ok(Self::new(config, Arc::new(overpass), geocoder))
    }

    /// Builds the pipeline over an arbitrary infrastructure source.
    #[must_use]
    pub fn new(
        config: &AppConfig,
        source: Arc<dyn InfrastructureSource>,
        geocoder: NominatimClient,
    ) -> Self {
        let fetcher = InfrastructureFetcher::new(
            source,
            ScoreCache::new(&config.cache),
            Estimator::new(config.scoring),
            FetchOptions::from(&config.overpass),
        );

        let mut sessions = Cache::builder().max_capacity(config.refresh.max_sessions);
        if let Some(idle) = config.refresh.session_idle() {
            sessions = sessions.time_to_idle(idle);
        }

        Self {
            fetcher: Arc::new(fetcher),
            sessions: sessions.build(),
            display: config.heatmap.clone(),
            refresh: config.refresh,
            geocoder,
            recordings: RecordingStore::default(),
        }
    }

    fn refresher(&self, session: &str) -> Arc<HeatmapRefresher> {
        self.sessions.get_with_by_ref(session, || {
            log::debug!("Starting heatmap session {session:?}");
            Arc::new(HeatmapRefresher::new(
                self.fetcher.clone(),
                self.display.clone(),
                self.refresh,
            ))
        })
    }

    /// Handles a region change in `session`. See
    /// [`HeatmapRefresher::refresh`].
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Fetch`] if the session's newest region could not
    /// be fetched; its previous heatmap stays current.
    pub async fn on_region_change(
        &self,
        session: &str,
        region: BoundingRegion,
    ) -> Result<RefreshOutcome, AppError> {
        let refresher = self.refresher(session);
        Ok(refresher.refresh(region).await?)
    }

    /// The heatmap layer currently on screen in `session`.
    #[must_use]
    pub fn current_heatmap(&self, session: &str) -> Option<HeatmapLayer> {
        self.sessions
            .get(session)
            .and_then(|refresher| refresher.current())
    }

    /// Searches for a place and returns the region to move the map to.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Geocode`] if nothing matches or the search fails.
    pub async fn search(&self, query: &str) -> Result<MapRegion, AppError> {
        let region = self.geocoder.search(query).await.inspect_err(|e| {
            log::warn!("Search for {query:?} failed: {e}");
        })?;
        Ok(region)
    }

    /// Region to open the map on: the user's location if it was shared,
    /// otherwise the default city view.
    #[must_use]
    pub fn starting_region(location: Option<GeoPoint>, permission: PermissionState) -> MapRegion {
        match (location, PermissionDenied::check(Capability::Location, permission)) {
            (Some(point), Ok(())) => MapRegion::centered_on(point),
            (_, Err(e)) => {
                log::info!("{e}, starting at the default region");
                MapRegion::default()
            }
            (None, Ok(())) => MapRegion::default(),
        }
    }

    /// Pins a finished recording to the map.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::PermissionDenied`] if the microphone permission
    /// was denied, or [`AppError::InvalidInput`] for a malformed session.
    pub fn add_recording(
        &self,
        location: GeoPoint,
        session: RecordingSession,
        microphone: PermissionState,
    ) -> Result<RecordingMarker, AppError> {
        PermissionDenied::check(Capability::Microphone, microphone)?;
        self.recordings.add(location, session)
    }

    /// All recording markers, oldest first.
    #[must_use]
    pub fn recordings(&self) -> Vec<RecordingMarker> {
        self.recordings.all()
    }

    /// Looks up a marker for replay.
    #[must_use]
    pub fn recording(&self, id: Uuid) -> Option<RecordingMarker> {
        self.recordings.get(id)
    }

    /// Counts roads and buildings around `center` and scores the result.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Fetch`] if the survey query fails.
    pub async fn survey(&self, center: GeoPoint, radius_m: u32) -> Result<Survey, AppError> {
        Ok(self.fetcher.survey(center, radius_m).await?)
    }

    /// Score cache counters.
    pub async fn cache_stats(&self) -> CacheStats {
        self.fetcher.cache().stats().await
    }

    /// The sound level key shown next to the map.
    #[must_use]
    pub fn legend() -> Vec<LegendBand> {
        soundmap_models::legend()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use soundmap_models::{Building, InfrastructureCount};
    use soundmap_overpass::OverpassError;

    use super::*;

    struct TwoBuildings;

    const FIRST: GeoPoint = GeoPoint {
        latitude: 47.61,
        longitude: -122.33,
    };
    const SECOND: GeoPoint = GeoPoint {
        latitude: 47.62,
        longitude: -122.34,
    };

    #[async_trait]
    impl InfrastructureSource for TwoBuildings {
        async fn buildings(
            &self,
            _region: &BoundingRegion,
            _limit: u32,
        ) -> Result<Vec<Building>, OverpassError> {
            Ok(vec![
                Building {
                    id: 1,
                    anchor: FIRST,
                },
                Building {
                    id: 2,
                    anchor: SECOND,
                },
            ])
        }

        async fn road_counts(
            &self,
            anchors: &[GeoPoint],
            _radius_m: u32,
        ) -> Result<Vec<u64>, OverpassError> {
            Ok(anchors
                .iter()
                .map(|a| if *a == FIRST { 3 } else { 12 })
                .collect())
        }

        async fn survey(
            &self,
            _center: GeoPoint,
            _radius_m: u32,
        ) -> Result<InfrastructureCount, OverpassError> {
            Ok(InfrastructureCount {
                building_count: 7,
                road_count: 9,
            })
        }
    }

    fn sound_map() -> SoundMap {
        let mut config = AppConfig::defaults();
        config.refresh.debounce_ms = 0;
        config.nominatim.base_url = "http://127.0.0.1:9/search".to_string();
        let geocoder = NominatimClient::new(&config.nominatim).unwrap();
        SoundMap::new(&config, Arc::new(TwoBuildings), geocoder)
    }

    fn seattle() -> BoundingRegion {
        MapRegion::default().bounds()
    }

    #[tokio::test]
    async fn region_change_applies_scored_layer() {
        let map = sound_map();
        let RefreshOutcome::Applied(layer) = map
            .on_region_change(DEFAULT_SESSION, seattle())
            .await
            .unwrap()
        else {
            panic!("refresh should apply");
        };
        let weights: Vec<f64> = layer.points.iter().map(|p| p.weight).collect();
        assert_eq!(weights, vec![1.5, 6.0]);
        assert_eq!(map.current_heatmap(DEFAULT_SESSION), Some(layer));

        map.on_region_change(DEFAULT_SESSION, seattle())
            .await
            .unwrap();
        let stats = map.cache_stats().await;
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.hits, 2);
    }

    #[tokio::test]
    async fn sessions_do_not_supersede_each_other() {
        let mut config = AppConfig::defaults();
        config.nominatim.base_url = "http://127.0.0.1:9/search".to_string();
        let geocoder = NominatimClient::new(&config.nominatim).unwrap();
        let map = SoundMap::new(&config, Arc::new(TwoBuildings), geocoder);

        let downtown = MapRegion::centered_on(FIRST).bounds();
        let (a, b) = tokio::join!(
            map.on_region_change("phone", seattle()),
            map.on_region_change("tablet", downtown),
        );
        assert!(matches!(a.unwrap(), RefreshOutcome::Applied(_)));
        assert!(matches!(b.unwrap(), RefreshOutcome::Applied(_)));

        assert_eq!(map.current_heatmap("phone").unwrap().region, seattle());
        assert_eq!(map.current_heatmap("tablet").unwrap().region, downtown);
        assert!(map.current_heatmap("watch").is_none());

        // Both sessions scored from one shared cache.
        assert_eq!(map.cache_stats().await.entries, 2);
    }

    #[tokio::test]
    async fn survey_reports_counts_and_score() {
        let survey = sound_map().survey(FIRST, 500).await.unwrap();
        assert_eq!(survey.counts.road_count, 9);
        assert!((survey.score - 4.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn blank_search_is_not_found() {
        let err = sound_map().search("   ").await.unwrap_err();
        assert!(matches!(err, AppError::Geocode(GeocodeError::NotFound { .. })));
    }

    #[tokio::test]
    async fn unreachable_geocoder_is_network_failure() {
        let err = sound_map().search("Seattle").await.unwrap_err();
        let AppError::Geocode(e) = err else {
            panic!("expected geocode error, got {err:?}");
        };
        assert!(e.is_network_failure());
    }

    #[test]
    fn starting_region_uses_location_only_when_granted() {
        let here = GeoPoint {
            latitude: 40.7128,
            longitude: -74.006,
        };
        let granted = SoundMap::starting_region(Some(here), PermissionState::Granted);
        assert!((granted.latitude - 40.7128).abs() < f64::EPSILON);

        let denied = SoundMap::starting_region(Some(here), PermissionState::Denied);
        assert_eq!(denied, MapRegion::default());

        let unknown = SoundMap::starting_region(None, PermissionState::Granted);
        assert_eq!(unknown, MapRegion::default());
    }

    #[test]
    fn recording_requires_microphone_permission() {
        let map = sound_map();
        let session = RecordingSession {
            uri: "file:///rec.m4a".to_string(),
            average_loudness: 68.0,
        };

        let err = map
            .add_recording(FIRST, session.clone(), PermissionState::Denied)
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::PermissionDenied(PermissionDenied {
                capability: Capability::Microphone
            })
        ));
        assert!(map.recordings().is_empty());

        let marker = map
            .add_recording(FIRST, session, PermissionState::Granted)
            .unwrap();
        assert_eq!(map.recording(marker.id), Some(marker));
    }

    #[test]
    fn legend_has_four_bands() {
        assert_eq!(SoundMap::legend().len(), 4);
    }
}
