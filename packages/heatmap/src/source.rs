//! Where infrastructure data comes from.

use async_trait::async_trait;
use soundmap_models::{BoundingRegion, Building, GeoPoint, InfrastructureCount};
use soundmap_overpass::{OverpassClient, OverpassError};

/// Provider of building footprints and nearby road counts.
///
/// [`OverpassClient`] is the production implementation; tests substitute
/// canned data.
#[async_trait]
pub trait InfrastructureSource: Send + Sync {
    /// Up to `limit` buildings intersecting `region`, in a stable order.
    ///
    /// # Errors
    ///
    /// Returns [`OverpassError`] if the query fails.
    async fn buildings(
        &self,
        region: &BoundingRegion,
        limit: u32,
    ) -> Result<Vec<Building>, OverpassError>;

    /// Road counts within `radius_m` of each anchor. Entry `i` of the result
    /// belongs to `anchors[i]`.
    ///
    /// # Errors
    ///
    /// Returns [`OverpassError`] if the query fails.
    async fn road_counts(
        &self,
        anchors: &[GeoPoint],
        radius_m: u32,
    ) -> Result<Vec<u64>, OverpassError>;

    /// Road and building counts within `radius_m` of `center`.
    ///
    /// # Errors
    ///
    /// Returns [`OverpassError`] if the query fails.
    async fn survey(
        &self,
        center: GeoPoint,
        radius_m: u32,
    ) -> Result<InfrastructureCount, OverpassError>;
}

#[async_trait]
impl InfrastructureSource for OverpassClient {
    async fn buildings(
        &self,
        region: &BoundingRegion,
        limit: u32,
    ) -> Result<Vec<Building>, OverpassError> {
        Self::buildings(self, region, limit).await
    }

    async fn road_counts(
        &self,
        anchors: &[GeoPoint],
        radius_m: u32,
    ) -> Result<Vec<u64>, OverpassError> {
        Self::road_counts(self, anchors, radius_m).await
    }

    async fn survey(
        &self,
        center: GeoPoint,
        radius_m: u32,
    ) -> Result<InfrastructureCount, OverpassError> {
        Self::survey(self, center, radius_m).await
    }
}
