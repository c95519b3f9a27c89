#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Overpass API client for the sound map.
//!
//! Three query shapes are used:
//!
//! 1. **Buildings**: every `building` way intersecting a bounding region,
//!    returned with its bounding box (`out bb`) and capped at a fixed count.
//!    The minimum corner of each box becomes the building's anchor.
//! 2. **Road counts**: one `out count` clause per anchor, counting
//!    `highway` ways within a radius. Overpass answers with one `count`
//!    element per clause, **in clause order**; the response carries no key
//!    tying a count back to its anchor, so callers correlate by position.
//! 3. **Survey**: highway and building counts around a single point.
//!
//! See <https://wiki.openstreetmap.org/wiki/Overpass_API/Overpass_QL>

pub mod client;
pub mod query;
pub mod response;
pub mod retry;

pub use client::OverpassClient;

use thiserror::Error;

/// Errors from Overpass requests.
#[derive(Debug, Error)]
pub enum OverpassError {
    /// Connection or transport failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The request did not complete within the configured timeout.
    #[error("Request timed out")]
    Timeout,

    /// Overpass answered with a non-success status.
    #[error("Overpass returned HTTP {status}: {body_preview}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Start of the response body (Overpass explains errors there).
        body_preview: String,
    },

    /// Response body did not match the expected shape.
    #[error("Parse error: {message}")]
    Parse {
        /// Description of the parsing failure.
        message: String,
    },
}

impl OverpassError {
    /// Whether the failure was a timeout, from either the HTTP client or
    /// an outer deadline.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout => true,
            Self::Http(e) => e.is_timeout(),
            Self::Status { .. } | Self::Parse { .. } => false,
        }
    }

    pub(crate) fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }
}
