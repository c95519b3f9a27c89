//! HTTP client for an Overpass interpreter endpoint.

use soundmap_config::OverpassConfig;
use soundmap_models::{BoundingRegion, Building, GeoPoint, InfrastructureCount};

use crate::{OverpassError, query, response, retry};

/// Overpass interpreter client.
///
/// Queries are sent as a form-encoded `data` field in a POST body, which
/// avoids URL length limits for large road-count batches.
#[derive(Debug, Clone)]
pub struct OverpassClient {
    client: reqwest::Client,
    base_url: String,
    timeout_secs: u64,
    max_retries: u32,
}

impl OverpassClient {
    /// Builds a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`OverpassError::Http`] if the HTTP client cannot be built.
    pub fn new(config: &OverpassConfig) -> Result<Self, OverpassError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("soundmap/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
        })
    }

    /// Interpreter endpoint this client talks to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetches up to `limit` buildings intersecting `region`.
    ///
    /// Dense regions may hold more buildings than `limit`; only the first
    /// `limit` returned by Overpass are included.
    ///
    /// # Errors
    ///
    /// Returns [`OverpassError`] if the request or response parsing fails.
    pub async fn buildings(
        &self,
        region: &BoundingRegion,
        limit: u32,
    ) -> Result<Vec<Building>, OverpassError> {
        let q = query::buildings(region, limit, self.timeout_secs);
        let body = self.interpret(&q).await?;
        let buildings = response::parse_buildings(&body)?;
        log::debug!("Overpass returned {} buildings for {region}", buildings.len());
        Ok(buildings)
    }

    /// Counts highway ways within `radius_m` of each anchor.
    ///
    /// The result is positional: entry `i` belongs to `anchors[i]`. No
    /// request is made for an empty slice. The caller is responsible for
    /// checking that the number of counts matches the number of anchors.
    ///
    /// # Errors
    ///
    /// Returns [`OverpassError`] if the request or response parsing fails.
    pub async fn road_counts(
        &self,
        anchors: &[GeoPoint],
        radius_m: u32,
    ) -> Result<Vec<u64>, OverpassError> {
        if anchors.is_empty() {
            return Ok(Vec::new());
        }
        let q = query::road_counts(anchors, radius_m, self.timeout_secs);
        let body = self.interpret(&q).await?;
        response::parse_counts(&body)
    }

    /// Counts highways and buildings within `radius_m` of `center`.
    ///
    /// # Errors
    ///
    /// Returns [`OverpassError`] if the request or response parsing fails.
    pub async fn survey(
        &self,
        center: GeoPoint,
        radius_m: u32,
    ) -> Result<InfrastructureCount, OverpassError> {
        let q = query::survey(center, radius_m, self.timeout_secs);
        let body = self.interpret(&q).await?;
        response::parse_survey(&body)
    }

    async fn interpret(&self, q: &str) -> Result<serde_json::Value, OverpassError> {
        log::trace!("Overpass query: {q}");
        retry::send_json(
            || self.client.post(&self.base_url).form(&[("data", q)]),
            self.max_retries,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> OverpassConfig {
        OverpassConfig {
            base_url: "http://127.0.0.1:9/api/interpreter".to_string(),
            timeout_secs: 1,
            max_retries: 0,
            max_buildings: 100,
            road_radius_m: 100,
        }
    }

    #[tokio::test]
    async fn empty_anchor_batch_skips_request() {
        // Port 9 (discard) is never listening for HTTP; any request would fail.
        let client = OverpassClient::new(&config()).unwrap();
        let counts = client.road_counts(&[], 100).await.unwrap();
        assert!(counts.is_empty());
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_an_error() {
        let client = OverpassClient::new(&config()).unwrap();
        let anchor = GeoPoint {
            latitude: 47.6,
            longitude: -122.3,
        };
        assert!(client.road_counts(&[anchor], 100).await.is_err());
    }
}
