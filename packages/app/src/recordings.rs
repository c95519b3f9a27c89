//! In-memory store of recording markers.

use std::sync::{PoisonError, RwLock};

use soundmap_models::{GeoPoint, RecordingMarker, RecordingSession};
use uuid::Uuid;

use crate::AppError;

/// Markers placed during this process's lifetime, oldest first.
#[derive(Debug, Default)]
pub struct RecordingStore {
    markers: RwLock<Vec<RecordingMarker>>,
}

impl RecordingStore {
    /// Pins `session` at `location`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::InvalidInput`] if the URI is blank or the
    /// loudness is not a finite number.
    pub fn add(
        &self,
        location: GeoPoint,
        session: RecordingSession,
    ) -> Result<RecordingMarker, AppError> {
        if session.uri.trim().is_empty() {
            return Err(AppError::InvalidInput {
                message: "recording URI is empty".to_string(),
            });
        }
        if !session.average_loudness.is_finite() {
            return Err(AppError::InvalidInput {
                message: format!(
                    "average loudness must be finite, got {}",
                    session.average_loudness
                ),
            });
        }

        let marker = RecordingMarker::new(location, session);
        log::info!(
            "Placed recording {} at {} ({:.1} dB)",
            marker.id,
            marker.location,
            marker.average_loudness
        );
        self.markers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(marker.clone());
        Ok(marker)
    }

    /// All markers, oldest first.
    #[must_use]
    pub fn all(&self) -> Vec<RecordingMarker> {
        self.markers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The marker with `id`, if any.
    #[must_use]
    pub fn get(&self, id: Uuid) -> Option<RecordingMarker> {
        self.markers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|marker| marker.id == id)
            .cloned()
    }
}
