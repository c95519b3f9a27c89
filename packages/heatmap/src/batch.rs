//! Positional pairing of a batched road-count request with its response.
//!
//! Overpass returns one count per clause, in clause order, with nothing
//! identifying which anchor a count belongs to. [`RoadCountBatch`] keeps
//! each anchor next to the claim for its score so the response can only be
//! consumed by zipping it against the same sequence, after checking that
//! the lengths agree.

use soundmap_models::GeoPoint;

use crate::FetchCause;
use crate::cache::ScoreClaim;

/// Anchors queued for one road-count request, in request order.
#[derive(Debug, Default)]
pub struct RoadCountBatch {
    anchors: Vec<GeoPoint>,
    claims: Vec<ScoreClaim>,
}

impl RoadCountBatch {
    /// Queues `anchor`, whose score will be stored through `claim`.
    pub fn push(&mut self, anchor: GeoPoint, claim: ScoreClaim) {
        self.anchors.push(anchor);
        self.claims.push(claim);
    }

    /// Anchors in request order.
    #[must_use]
    pub fn anchors(&self) -> &[GeoPoint] {
        &self.anchors
    }

    /// Number of queued anchors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    /// Whether nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    /// Pairs each claim with the count at the same position.
    ///
    /// # Errors
    ///
    /// Returns [`FetchCause::CountMismatch`] if `counts` is not exactly as
    /// long as the batch. The claims are released in that case.
    pub fn pair(self, counts: Vec<u64>) -> Result<Vec<(ScoreClaim, u64)>, FetchCause> {
        if counts.len() != self.claims.len() {
            return Err(FetchCause::CountMismatch {
                expected: self.claims.len(),
                actual: counts.len(),
            });
        }
        Ok(self.claims.into_iter().zip(counts).collect())
    }
}
