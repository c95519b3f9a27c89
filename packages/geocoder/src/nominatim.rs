//! Nominatim / `OpenStreetMap` search client.
//!
//! The public instance requires a descriptive `User-Agent` identifying the
//! application and allows at most **1 request per second**. Searches are
//! user-initiated, so no client-side throttling is applied.
//!
//! See <https://nominatim.org/release-docs/develop/api/Search/>

use soundmap_config::NominatimConfig;
use soundmap_models::{GeoPoint, MapRegion};

use crate::GeocodeError;

/// Nominatim search client.
#[derive(Debug, Clone)]
pub struct NominatimClient {
    client: reqwest::Client,
    base_url: String,
}

impl NominatimClient {
    /// Builds a client that identifies itself with the configured
    /// `User-Agent`.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError::Network`] if the HTTP client cannot be built.
    pub fn new(config: &NominatimConfig) -> Result<Self, GeocodeError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout())
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }

    /// Searches for `query` and returns a region centered on the first
    /// match with the default view span.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError::NotFound`] if nothing matches, or another
    /// [`GeocodeError`] if the request or response parsing fails.
    pub async fn search(&self, query: &str) -> Result<MapRegion, GeocodeError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(GeocodeError::NotFound {
                query: query.to_string(),
            });
        }

        let resp = self
            .client
            .get(&self.base_url)
            .query(&[("q", query), ("format", "jsonv2"), ("limit", "1")])
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(GeocodeError::Status {
                status: resp.status().as_u16(),
            });
        }

        let body: serde_json::Value = resp.json().await?;
        let center = parse_response(&body)?.ok_or_else(|| GeocodeError::NotFound {
            query: query.to_string(),
        })?;

        log::debug!("Nominatim resolved {query:?} to {center}");
        Ok(MapRegion::centered_on(center))
    }
}

/// Parses a Nominatim JSON response, returning the first match.
fn parse_response(body: &serde_json::Value) -> Result<Option<GeoPoint>, GeocodeError> {
    let results = body.as_array().ok_or_else(|| GeocodeError::Parse {
        message: "Nominatim response is not an array".to_string(),
    })?;

    let Some(first) = results.first() else {
        return Ok(None);
    };

    let lat = coordinate(first, "lat")?;
    let lon = coordinate(first, "lon")?;

    GeoPoint::new(lat, lon)
        .map(Some)
        .map_err(|e| GeocodeError::Parse {
            message: e.to_string(),
        })
}

/// Nominatim encodes coordinates as strings; accept numbers as well.
fn coordinate(result: &serde_json::Value, field: &str) -> Result<f64, GeocodeError> {
    let value = &result[field];
    value
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .or_else(|| value.as_f64())
        .ok_or_else(|| GeocodeError::Parse {
            message: format!("Missing {field} in Nominatim response"),
        })
}
