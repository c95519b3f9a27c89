//! Audio recording markers placed on the map.
//!
//! Capturing and playing audio happens on the device; the map only keeps
//! the recording's URI and its averaged loudness.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::GeoPoint;

/// The result of one finished recording on the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingSession {
    /// Where the device stored the audio.
    pub uri: String,
    /// Mean loudness over the recording, in decibels.
    pub average_loudness: f64,
}

/// A recording pinned to the map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingMarker {
    /// Marker ID.
    pub id: Uuid,
    /// Where the recording was made.
    pub location: GeoPoint,
    /// Audio URI to replay.
    pub uri: String,
    /// Mean loudness in decibels.
    pub average_loudness: f64,
    /// When the marker was placed.
    pub recorded_at: DateTime<Utc>,
}

impl RecordingMarker {
    /// Pins `session` at `location` with a fresh ID and the current time.
    #[must_use]
    pub fn new(location: GeoPoint, session: RecordingSession) -> Self {
        Self {
            id: Uuid::new_v4(),
            location,
            uri: session.uri,
            average_loudness: session.average_loudness,
            recorded_at: Utc::now(),
        }
    }
}
