#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! API request and response types for the sound map server.
//!
//! These types are serialized to JSON for the REST API. They are separate
//! from the pipeline types to allow independent evolution of the API
//! contract.

use serde::{Deserialize, Serialize};
use soundmap_heatmap::{CacheStats, Survey};
use soundmap_models::{GeoPoint, HeatmapLayer, PermissionState, RecordingSession};

/// Query parameters for the heatmap endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeatmapQueryParams {
    /// Bounding box as `west,south,east,north`.
    pub bbox: Option<String>,
    /// Map session the region change belongs to.
    pub session: Option<String>,
}

/// Query parameters naming a map session.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionParams {
    /// Map session id.
    pub session: Option<String>,
}

/// Query parameters for the search endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQueryParams {
    /// Free-text place name.
    pub q: Option<String>,
}

/// Query parameters for the initial region endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitialRegionParams {
    /// Device latitude, if the device shared one.
    pub lat: Option<f64>,
    /// Device longitude, if the device shared one.
    pub lon: Option<f64>,
    /// Location permission; granted when omitted.
    #[serde(default)]
    pub permission: PermissionState,
}

/// Query parameters for the survey endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyQueryParams {
    /// Center latitude.
    pub lat: f64,
    /// Center longitude.
    pub lon: f64,
    /// Radius in meters (default 1000).
    pub radius: Option<u32>,
}

/// Body of `POST /api/recordings`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRecording {
    /// Where the recording was made.
    pub latitude: f64,
    /// Where the recording was made.
    pub longitude: f64,
    /// Device URI of the audio.
    pub uri: String,
    /// Mean loudness in decibels.
    pub average_loudness: f64,
    /// Microphone permission; granted when omitted.
    #[serde(default)]
    pub microphone: PermissionState,
}

impl NewRecording {
    /// The recording part of the request.
    #[must_use]
    pub fn session(&self) -> RecordingSession {
        RecordingSession {
            uri: self.uri.clone(),
            average_loudness: self.average_loudness,
        }
    }
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiHealth {
    /// Whether the server is healthy.
    pub healthy: bool,
    /// Server version.
    pub version: String,
}

/// Score cache counters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiCacheStats {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that needed a road-count query.
    pub misses: u64,
    /// Cached scores.
    pub entries: u64,
}

impl From<CacheStats> for ApiCacheStats {
    fn from(stats: CacheStats) -> Self {
        Self {
            hits: stats.hits,
            misses: stats.misses,
            entries: stats.entries,
        }
    }
}

/// Infrastructure around a point.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiSurvey {
    /// Survey center.
    pub center: GeoPoint,
    /// Radius in meters.
    pub radius_m: u32,
    /// Highway segments within the radius.
    pub road_count: u64,
    /// Buildings within the radius.
    pub building_count: u64,
    /// Estimated noise score.
    pub score: f64,
}

impl From<Survey> for ApiSurvey {
    fn from(survey: Survey) -> Self {
        Self {
            center: survey.center,
            radius_m: survey.radius_m,
            road_count: survey.counts.road_count,
            building_count: survey.counts.building_count,
            score: survey.score,
        }
    }
}

/// Failed heatmap refresh. The previous layer, if any, is still current.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiHeatmapError {
    /// Error message.
    pub error: String,
    /// Stage that failed.
    pub phase: String,
    /// Layer that stays on screen.
    pub previous: Option<HeatmapLayer>,
}
