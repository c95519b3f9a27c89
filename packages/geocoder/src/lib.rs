#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Place search for the sound map.
//!
//! Turns free text ("Seattle", "Pike Place Market") into a map region
//! centered on the first Nominatim match, using the default view span.

pub mod nominatim;

pub use nominatim::NominatimClient;

use thiserror::Error;

/// Errors from place search.
#[derive(Debug, Error)]
pub enum GeocodeError {
    /// Nothing matched the query.
    #[error("No place found for {query:?}")]
    NotFound {
        /// The search text.
        query: String,
    },

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Network(#[from] reqwest::Error),

    /// Nominatim answered with a non-success status.
    #[error("Nominatim returned HTTP {status}")]
    Status {
        /// HTTP status code.
        status: u16,
    },

    /// Response parsing failed.
    #[error("Parse error: {message}")]
    Parse {
        /// Description of the parsing failure.
        message: String,
    },
}

impl GeocodeError {
    /// Whether the failure came from the network rather than the query.
    #[must_use]
    pub const fn is_network_failure(&self) -> bool {
        !matches!(self, Self::NotFound { .. })
    }
}
