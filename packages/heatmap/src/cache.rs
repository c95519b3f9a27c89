//! Score cache keyed by anchor coordinates.
//!
//! Keys are fixed-point coordinates truncated to a configured number of
//! decimal places (7 by default, the precision Overpass reports bounds at).
//! Truncation instead of rounding keeps two anchors that Overpass reports
//! differently from colliding on a shared rounded value.
//!
//! The cache also tracks scores that are being computed. [`ScoreCache::lookup`]
//! hands out at most one [`ScoreClaim`] per key; concurrent lookups for the
//! same key get a [`PendingScore`] that resolves when the claim is fulfilled,
//! so overlapping fetches never query Overpass twice for one anchor.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use moka::future::Cache;
use soundmap_config::CacheConfig;
use soundmap_models::GeoPoint;
use tokio::sync::{Mutex, watch};

/// Scaled values closer than this to an integer are treated as that
/// integer before truncating, so `47.6` keys as `47.6000000` and not
/// `47.5999999`.
const SNAP_EPSILON: f64 = 1e-6;

/// Fixed-point anchor coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    latitude: i64,
    longitude: i64,
    precision: u32,
}

impl CacheKey {
    /// Truncates `point` to `precision` decimal places.
    #[must_use]
    pub fn new(point: GeoPoint, precision: u32) -> Self {
        Self {
            latitude: fixed_point(point.latitude, precision),
            longitude: fixed_point(point.longitude, precision),
            precision,
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
fn fixed_point(value: f64, precision: u32) -> i64 {
    let scaled = value * 10f64.powi(precision as i32);
    let nearest = scaled.round();
    if (scaled - nearest).abs() < SNAP_EPSILON {
        nearest as i64
    } else {
        scaled.trunc() as i64
    }
}

fn write_fixed(f: &mut std::fmt::Formatter<'_>, value: i64, precision: u32) -> std::fmt::Result {
    let sign = if value < 0 { "-" } else { "" };
    let magnitude = value.unsigned_abs();
    if precision == 0 {
        return write!(f, "{sign}{magnitude}");
    }
    let scale = 10u64.pow(precision);
    write!(
        f,
        "{sign}{}.{:0width$}",
        magnitude / scale,
        magnitude % scale,
        width = precision as usize
    )
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write_fixed(f, self.latitude, self.precision)?;
        f.write_str(",")?;
        write_fixed(f, self.longitude, self.precision)
    }
}

/// Hit/miss counters and current size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that required a computation (or waited on one).
    pub misses: u64,
    /// Cached scores (approximate until pending evictions run).
    pub entries: u64,
}

/// Result of [`ScoreCache::lookup`].
#[derive(Debug)]
pub enum Lookup {
    /// Score already known.
    Hit(f64),
    /// Caller must compute the score and [`ScoreClaim::fulfil`] it.
    Claimed(ScoreClaim),
    /// Another caller is computing the score.
    Pending(PendingScore),
}

/// Exclusive right to compute one key's score.
///
/// Dropping a claim without fulfilling it releases the key: waiters observe
/// the failure and the next lookup claims it again.
#[derive(Debug)]
pub struct ScoreClaim {
    key: CacheKey,
    sender: watch::Sender<Option<f64>>,
    cache: ScoreCache,
}

impl ScoreClaim {
    /// Key being computed.
    #[must_use]
    pub const fn key(&self) -> CacheKey {
        self.key
    }

    /// Stores `score` and wakes every waiter.
    pub async fn fulfil(self, score: f64) {
        let inner = &self.cache.inner;
        {
            let mut pending = inner.pending.lock().await;
            inner.scores.insert(self.key, score).await;
            pending.remove(&self.key);
        }
        // Waiters may all have gone away; that is fine.
        let _ = self.sender.send(Some(score));
    }
}

/// A score another caller is computing.
#[derive(Debug)]
pub struct PendingScore {
    key: CacheKey,
    receiver: watch::Receiver<Option<f64>>,
}

impl PendingScore {
    /// Key being waited on.
    #[must_use]
    pub const fn key(&self) -> CacheKey {
        self.key
    }

    /// Waits for the score. Returns `None` if the computing caller gave up.
    pub async fn wait(mut self) -> Option<f64> {
        self.receiver
            .wait_for(Option::is_some)
            .await
            .ok()
            .and_then(|score| *score)
    }
}

#[derive(Debug)]
struct Inner {
    scores: Cache<CacheKey, f64>,
    pending: Mutex<BTreeMap<CacheKey, watch::Receiver<Option<f64>>>>,
    precision: u32,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Memoized anchor scores with size-bounded, optionally time-limited
/// retention. Cloning shares the same cache.
#[derive(Debug, Clone)]
pub struct ScoreCache {
    inner: Arc<Inner>,
}

impl ScoreCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new(config: &CacheConfig) -> Self {
        let mut builder = Cache::builder().max_capacity(config.max_capacity);
        if let Some(ttl) = config.time_to_live() {
            builder = builder.time_to_live(ttl);
        }
        Self {
            inner: Arc::new(Inner {
                scores: builder.build(),
                pending: Mutex::new(BTreeMap::new()),
                precision: config.key_precision,
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
            }),
        }
    }

    /// Key for `point` at this cache's precision.
    #[must_use]
    pub fn key_for(&self, point: GeoPoint) -> CacheKey {
        CacheKey::new(point, self.inner.precision)
    }

    /// Cached score for `key`, if any.
    pub async fn get(&self, key: &CacheKey) -> Option<f64> {
        self.inner.scores.get(key).await
    }

    /// Stores `score` for `key`, replacing any previous value.
    pub async fn put(&self, key: CacheKey, score: f64) {
        self.inner.scores.insert(key, score).await;
    }

    /// Returns the cached score, a claim to compute it, or a handle to a
    /// computation already in flight.
    pub async fn lookup(&self, key: CacheKey) -> Lookup {
        if let Some(score) = self.get(&key).await {
            return self.hit(key, score);
        }

        let mut pending = self.inner.pending.lock().await;

        // A claim may have been fulfilled between the check above and
        // taking the lock.
        if let Some(score) = self.get(&key).await {
            return self.hit(key, score);
        }

        self.inner.misses.fetch_add(1, Ordering::Relaxed);

        if let Some(receiver) = pending.get(&key) {
            // A closed channel without a value means the claim was dropped.
            if receiver.has_changed().is_ok() {
                log::debug!("Score for {key} is already being computed, waiting");
                return Lookup::Pending(PendingScore {
                    key,
                    receiver: receiver.clone(),
                });
            }
        }

        let (sender, receiver) = watch::channel(None);
        pending.insert(key, receiver);
        drop(pending);

        Lookup::Claimed(ScoreClaim {
            key,
            sender,
            cache: self.clone(),
        })
    }

    fn hit(&self, key: CacheKey, score: f64) -> Lookup {
        self.inner.hits.fetch_add(1, Ordering::Relaxed);
        log::debug!("Deduplicated road-count query for {key} (cached score {score})");
        Lookup::Hit(score)
    }

    /// Current counters.
    pub async fn stats(&self) -> CacheStats {
        self.inner.scores.run_pending_tasks().await;
        CacheStats {
            hits: self.inner.hits.load(Ordering::Relaxed),
            misses: self.inner.misses.load(Ordering::Relaxed),
            entries: self.inner.scores.entry_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> ScoreCache {
        ScoreCache::new(&CacheConfig::default())
    }

    fn point(latitude: f64, longitude: f64) -> GeoPoint {
        GeoPoint {
            latitude,
            longitude,
        }
    }

    #[test]
    fn key_truncates_instead_of_rounding() {
        let a = CacheKey::new(point(47.123_456_79, -122.987_654_39), 7);
        assert_eq!(a.to_string(), "47.1234567,-122.9876543");

        let b = CacheKey::new(point(47.123_456_71, -122.987_654_31), 7);
        assert_eq!(a, b);
    }

    #[test]
    fn key_snaps_representation_error() {
        assert_eq!(
            CacheKey::new(point(47.6, -122.3), 7).to_string(),
            "47.6000000,-122.3000000"
        );
    }

    #[test]
    fn key_formats_small_negative_values() {
        assert_eq!(
            CacheKey::new(point(-0.5, 0.25), 2).to_string(),
            "-0.50,0.25"
        );
        assert_eq!(CacheKey::new(point(12.9, -3.9), 0).to_string(), "12,-3");
    }

    #[test]
    fn distinct_anchors_get_distinct_keys() {
        let a = CacheKey::new(point(47.600_000_1, -122.3), 7);
        let b = CacheKey::new(point(47.600_000_2, -122.3), 7);
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn put_then_get() {
        let cache = cache();
        let key = cache.key_for(point(47.6, -122.3));
        assert!(cache.get(&key).await.is_none());
        cache.put(key, 2.5).await;
        assert_eq!(cache.get(&key).await, Some(2.5));
    }

    #[tokio::test]
    async fn second_lookup_while_claimed_is_pending() {
        let cache = cache();
        let key = cache.key_for(point(47.6, -122.3));

        let Lookup::Claimed(claim) = cache.lookup(key).await else {
            panic!("first lookup should claim");
        };
        let Lookup::Pending(waiter) = cache.lookup(key).await else {
            panic!("second lookup should wait");
        };

        claim.fulfil(6.0).await;
        assert_eq!(waiter.wait().await, Some(6.0));
        assert!(matches!(cache.lookup(key).await, Lookup::Hit(s) if (s - 6.0).abs() < f64::EPSILON));
    }

    #[tokio::test]
    async fn dropped_claim_releases_key() {
        let cache = cache();
        let key = cache.key_for(point(47.6, -122.3));

        let Lookup::Claimed(claim) = cache.lookup(key).await else {
            panic!("first lookup should claim");
        };
        let Lookup::Pending(waiter) = cache.lookup(key).await else {
            panic!("second lookup should wait");
        };

        drop(claim);
        assert_eq!(waiter.wait().await, None);
        assert!(matches!(cache.lookup(key).await, Lookup::Claimed(_)));
    }

    #[tokio::test]
    async fn stats_count_hits_and_misses() {
        let cache = cache();
        let key = cache.key_for(point(47.6, -122.3));

        if let Lookup::Claimed(claim) = cache.lookup(key).await {
            claim.fulfil(1.5).await;
        }
        let _ = cache.lookup(key).await;
        let _ = cache.lookup(key).await;

        let stats = cache.stats().await;
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.entries, 1);
    }

    #[tokio::test]
    async fn capacity_bounds_entries() {
        let cache = ScoreCache::new(&CacheConfig {
            max_capacity: 10,
            ..CacheConfig::default()
        });
        for i in 0..100 {
            let key = cache.key_for(point(f64::from(i) * 0.001, 0.0));
            cache.put(key, 1.0).await;
        }
        let stats = cache.stats().await;
        assert!(stats.entries <= 10, "entries = {}", stats.entries);
    }
}
