#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared types for the sound map.
//!
//! Geographic primitives ([`GeoPoint`], [`BoundingRegion`], [`MapRegion`]),
//! infrastructure counts returned by Overpass, and the weighted points the
//! heatmap renderer consumes. Heatmap display settings and the legend live
//! in [`heatmap`]; audio recording markers live in [`recording`].

pub mod heatmap;
pub mod recording;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

pub use heatmap::{HeatmapDisplay, HeatmapGradient, HeatmapLayer, LegendBand, legend};
pub use recording::{RecordingMarker, RecordingSession};

/// Latitude span of the default map view, in degrees.
pub const DEFAULT_LATITUDE_DELTA: f64 = 0.0922;

/// Longitude span of the default map view, in degrees.
pub const DEFAULT_LONGITUDE_DELTA: f64 = 0.0421;

/// Map center used when the user's location is unavailable (Seattle).
pub const DEFAULT_CENTER: GeoPoint = GeoPoint {
    latitude: 47.608_013,
    longitude: -122.335_167,
};

/// A WGS84 coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoPoint {
    /// Latitude in degrees, -90 to 90.
    pub latitude: f64,
    /// Longitude in degrees, -180 to 180.
    pub longitude: f64,
}

impl GeoPoint {
    /// Creates a point after validating both coordinates.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidCoordinateError`] if either coordinate is not finite
    /// or falls outside its valid range.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, InvalidCoordinateError> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(InvalidCoordinateError::Latitude(latitude));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(InvalidCoordinateError::Longitude(longitude));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }
}

impl std::fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.6}, {:.6})", self.latitude, self.longitude)
    }
}

/// Error returned when a coordinate or region is out of range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InvalidCoordinateError {
    /// Latitude outside -90..=90 or not finite.
    Latitude(f64),
    /// Longitude outside -180..=180 or not finite.
    Longitude(f64),
    /// North edge lies south of the south edge.
    InvertedRegion {
        /// Northern latitude that was provided.
        north: f64,
        /// Southern latitude that was provided.
        south: f64,
    },
}

impl std::fmt::Display for InvalidCoordinateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Latitude(v) => write!(f, "invalid latitude {v}: expected -90 to 90"),
            Self::Longitude(v) => write!(f, "invalid longitude {v}: expected -180 to 180"),
            Self::InvertedRegion { north, south } => {
                write!(f, "north edge {north} lies south of south edge {south}")
            }
        }
    }
}

impl std::error::Error for InvalidCoordinateError {}

/// The rectangular extent of a heatmap refresh.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundingRegion {
    /// North-east corner.
    pub north_east: GeoPoint,
    /// South-west corner.
    pub south_west: GeoPoint,
}

impl BoundingRegion {
    /// Creates a region from its two corners.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidCoordinateError::InvertedRegion`] if the north-east
    /// corner is south of the south-west corner.
    pub fn new(north_east: GeoPoint, south_west: GeoPoint) -> Result<Self, InvalidCoordinateError> {
        if north_east.latitude < south_west.latitude {
            return Err(InvalidCoordinateError::InvertedRegion {
                north: north_east.latitude,
                south: south_west.latitude,
            });
        }
        Ok(Self {
            north_east,
            south_west,
        })
    }

    /// Parses a bounding box string `"west,south,east,north"`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidCoordinateError`] if any coordinate is out of range.
    /// Returns `Ok(None)` unless the string is exactly four numbers.
    pub fn parse_bbox(s: &str) -> Result<Option<Self>, InvalidCoordinateError> {
        let Ok(parts) = s
            .split(',')
            .map(|p| p.trim().parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
        else {
            return Ok(None);
        };
        let [west, south, east, north] = parts[..] else {
            return Ok(None);
        };
        let region = Self::new(GeoPoint::new(north, east)?, GeoPoint::new(south, west)?)?;
        Ok(Some(region))
    }

    /// Southern latitude boundary.
    #[must_use]
    pub const fn south(&self) -> f64 {
        self.south_west.latitude
    }

    /// Western longitude boundary.
    #[must_use]
    pub const fn west(&self) -> f64 {
        self.south_west.longitude
    }

    /// Northern latitude boundary.
    #[must_use]
    pub const fn north(&self) -> f64 {
        self.north_east.latitude
    }

    /// Eastern longitude boundary.
    #[must_use]
    pub const fn east(&self) -> f64 {
        self.north_east.longitude
    }

    /// Midpoint of the region.
    #[must_use]
    pub fn center(&self) -> GeoPoint {
        GeoPoint {
            latitude: (self.north() + self.south()) / 2.0,
            longitude: (self.east() + self.west()) / 2.0,
        }
    }

    /// Whether `point` lies inside the region (edges inclusive).
    #[must_use]
    pub fn contains(&self, point: GeoPoint) -> bool {
        (self.south()..=self.north()).contains(&point.latitude)
            && (self.west()..=self.east()).contains(&point.longitude)
    }
}

impl std::fmt::Display for BoundingRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{:.5},{:.5} .. {:.5},{:.5}]",
            self.south(),
            self.west(),
            self.north(),
            self.east()
        )
    }
}

/// A map view region: a center plus the visible latitude/longitude span.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapRegion {
    /// Center latitude.
    pub latitude: f64,
    /// Center longitude.
    pub longitude: f64,
    /// Visible latitude span in degrees.
    pub latitude_delta: f64,
    /// Visible longitude span in degrees.
    pub longitude_delta: f64,
}

impl MapRegion {
    /// A region centered on `center` with the default view span.
    #[must_use]
    pub const fn centered_on(center: GeoPoint) -> Self {
        Self {
            latitude: center.latitude,
            longitude: center.longitude,
            latitude_delta: DEFAULT_LATITUDE_DELTA,
            longitude_delta: DEFAULT_LONGITUDE_DELTA,
        }
    }

    /// Center of the view.
    #[must_use]
    pub const fn center(&self) -> GeoPoint {
        GeoPoint {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }

    /// The visible extent, clamped to valid coordinate ranges.
    #[must_use]
    pub fn bounds(&self) -> BoundingRegion {
        let half_lat = self.latitude_delta.abs() / 2.0;
        let half_lon = self.longitude_delta.abs() / 2.0;
        BoundingRegion {
            north_east: GeoPoint {
                latitude: (self.latitude + half_lat).min(90.0),
                longitude: (self.longitude + half_lon).min(180.0),
            },
            south_west: GeoPoint {
                latitude: (self.latitude - half_lat).max(-90.0),
                longitude: (self.longitude - half_lon).max(-180.0),
            },
        }
    }
}

impl Default for MapRegion {
    fn default() -> Self {
        Self::centered_on(DEFAULT_CENTER)
    }
}

/// Infrastructure counted around a query anchor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfrastructureCount {
    /// Buildings within the query radius.
    pub building_count: u64,
    /// Road and path segments within the query radius.
    pub road_count: u64,
}

/// A building footprint returned by the building query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Building {
    /// `OpenStreetMap` way ID.
    pub id: u64,
    /// Minimum corner of the footprint's bounding box.
    pub anchor: GeoPoint,
}

/// A single heatmap sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightedPoint {
    /// Latitude.
    pub latitude: f64,
    /// Longitude.
    pub longitude: f64,
    /// Non-negative intensity.
    pub weight: f64,
}

impl WeightedPoint {
    /// Creates a sample at `point`. Negative or NaN weights become 0.
    #[must_use]
    pub const fn at(point: GeoPoint, weight: f64) -> Self {
        Self {
            latitude: point.latitude,
            longitude: point.longitude,
            weight: if weight > 0.0 { weight } else { 0.0 },
        }
    }
}

/// A device capability gated behind a user permission.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Capability {
    /// Foreground location access.
    Location,
    /// Microphone access for recordings.
    Microphone,
}

/// Whether the user granted a capability.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PermissionState {
    /// Permission granted.
    #[default]
    Granted,
    /// Permission denied.
    Denied,
}
