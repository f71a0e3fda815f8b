//! Windowed sub-index history.
//!
//! The [`HistoryStore`] keeps, per scope and per pollutant, the sub-index
//! samples observed within a trailing window and returns their average on
//! every write.
//!
//! # Concurrency and Lock Acquisition
//!
//! - **Scope map** (`RwLock`): read-locked to look a scope up, write-locked
//!   only the first time a scope is seen. Never held while a bucket is locked.
//! - **Buckets** (`Mutex`, one per scope and pollutant): held for the whole
//!   insert, evict and average sequence, so concurrent writers to the same
//!   bucket never lose a sample and never average a half-evicted sequence.
//!
//! Writers to different locations, or to different pollutants of the same
//! location, do not contend beyond the brief scope-map lookup.
//!
//! # Eviction
//!
//! Eviction happens on writes only. A bucket that stops receiving samples
//! keeps its last values until its next write; reads report what is stored.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use serde::Serialize;
use time::OffsetDateTime;
use tracing::trace;

use aqi_types::Pollutant;

use crate::error::{Error, Result};

/// Default averaging window: five minutes.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Longest accepted averaging window: one day.
pub const MAX_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Key identifying a history scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ScopeKey {
    /// The aggregate region across all sensors.
    Overall,
    /// A single sensor location, keyed by its canonical coordinate string.
    Location(String),
}

impl ScopeKey {
    /// Build the canonical location key for a pair of coordinates.
    ///
    /// Coordinates use the shortest representation that round-trips, so
    /// readings from the same coordinates always land in the same scope.
    /// Negative zero is normalized to zero.
    ///
    /// ```
    /// use aqi_core::ScopeKey;
    ///
    /// assert_eq!(ScopeKey::location(28.6, 77.2).as_str(), "28.6,77.2");
    /// assert_eq!(ScopeKey::location(-0.0, 77.0).as_str(), "0,77");
    /// ```
    pub fn location(latitude: f64, longitude: f64) -> Self {
        // Adding positive zero turns -0.0 into 0.0 and leaves everything else alone
        ScopeKey::Location(format!("{},{}", latitude + 0.0, longitude + 0.0))
    }

    /// The key as a string. The overall scope is `"overall"`.
    pub fn as_str(&self) -> &str {
        match self {
            ScopeKey::Overall => "overall",
            ScopeKey::Location(key) => key,
        }
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One sub-index observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SubIndexSample {
    /// The sub-index value.
    pub value: f64,
    /// When it was observed.
    #[serde(with = "time::serde::rfc3339")]
    pub observed_at: OffsetDateTime,
}

/// Samples for one (scope, pollutant) bucket.
#[derive(Debug, Default)]
struct PollutantHistory {
    samples: VecDeque<SubIndexSample>,
    first_seen_at: Option<OffsetDateTime>,
}

impl PollutantHistory {
    /// Insert a sample keeping timestamp order.
    ///
    /// Samples almost always arrive in order and go to the back. A writer that
    /// read the clock before a racing writer but locked the bucket after it
    /// lands at its sorted position instead.
    fn insert(&mut self, sample: SubIndexSample) {
        if self.first_seen_at.is_none() {
            self.first_seen_at = Some(sample.observed_at);
        }
        match self.samples.back() {
            Some(last) if last.observed_at > sample.observed_at => {
                let pos = self
                    .samples
                    .partition_point(|s| s.observed_at <= sample.observed_at);
                self.samples.insert(pos, sample);
            }
            _ => self.samples.push_back(sample),
        }
    }

    /// Drop every sample observed before `cutoff`. Returns how many went.
    fn evict_before(&mut self, cutoff: OffsetDateTime) -> usize {
        let mut evicted = 0;
        while self
            .samples
            .front()
            .is_some_and(|s| s.observed_at < cutoff)
        {
            self.samples.pop_front();
            evicted += 1;
        }
        evicted
    }

    fn average(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let total: f64 = self.samples.iter().map(|s| s.value).sum();
        Some(total / self.samples.len() as f64)
    }
}

/// All pollutant buckets of one scope.
#[derive(Debug, Default)]
struct ScopeHistory {
    buckets: [Mutex<PollutantHistory>; Pollutant::COUNT],
}

impl ScopeHistory {
    fn bucket(&self, pollutant: Pollutant) -> std::sync::MutexGuard<'_, PollutantHistory> {
        self.buckets[pollutant.index()]
            .lock()
            .expect("history bucket lock poisoned - a thread panicked while holding the lock")
    }
}

/// Outcome of a single [`HistoryStore::record`] call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordOutcome {
    /// Average of the samples retained after the write.
    pub average: f64,
    /// Samples retained after the write.
    pub retained: usize,
    /// Samples evicted by the write.
    pub evicted: usize,
}

/// Diagnostic view of one pollutant bucket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PollutantSnapshot {
    /// Average of the stored samples.
    pub average: f64,
    /// Number of stored samples.
    pub sample_count: usize,
    /// When the bucket received its first sample.
    #[serde(with = "time::serde::rfc3339")]
    pub first_seen_at: OffsetDateTime,
    /// Timestamp of the newest stored sample.
    #[serde(with = "time::serde::rfc3339")]
    pub last_observed_at: OffsetDateTime,
}

/// Diagnostic view of one scope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScopeSnapshot {
    /// The scope's key.
    pub scope: String,
    /// Per-pollutant state, only for buckets holding samples.
    pub pollutants: BTreeMap<Pollutant, PollutantSnapshot>,
}

/// Per-scope, per-pollutant windowed history.
///
/// # Example
///
/// ```
/// use aqi_core::{HistoryStore, ScopeKey};
/// use aqi_types::Pollutant;
/// use std::time::Duration;
/// use time::OffsetDateTime;
///
/// let store = HistoryStore::new(Duration::from_secs(300)).unwrap();
/// let scope = ScopeKey::location(28.6, 77.2);
/// let now = OffsetDateTime::now_utc();
///
/// store.record(&scope, Pollutant::Pm10, 60.0, now);
/// store.record(&scope, Pollutant::Pm10, 80.0, now);
/// assert_eq!(store.record(&scope, Pollutant::Pm10, 100.0, now), 80.0);
/// ```
pub struct HistoryStore {
    window: Duration,
    scopes: RwLock<HashMap<ScopeKey, Arc<ScopeHistory>>>,
}

impl HistoryStore {
    /// Create a store with the given averaging window.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the window is zero or longer than
    /// [`MAX_WINDOW`].
    pub fn new(window: Duration) -> Result<Self> {
        if window.is_zero() {
            return Err(Error::invalid_config("history window must be non-zero"));
        }
        if window > MAX_WINDOW {
            return Err(Error::invalid_config(format!(
                "history window of {}s exceeds the maximum of {}s",
                window.as_secs(),
                MAX_WINDOW.as_secs()
            )));
        }
        Ok(Self {
            window,
            scopes: RwLock::new(HashMap::new()),
        })
    }

    /// The averaging window shared by every scope.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record a sub-index and return the bucket's new windowed average.
    pub fn record(
        &self,
        scope: &ScopeKey,
        pollutant: Pollutant,
        sub_index: f64,
        now: OffsetDateTime,
    ) -> f64 {
        self.record_detailed(scope, pollutant, sub_index, now).average
    }

    /// Record a sub-index and report what the write did.
    ///
    /// Insert, eviction and averaging run under the bucket's lock as one unit.
    pub fn record_detailed(
        &self,
        scope: &ScopeKey,
        pollutant: Pollutant,
        sub_index: f64,
        now: OffsetDateTime,
    ) -> RecordOutcome {
        let history = self.scope_or_insert(scope);
        let mut bucket = history.bucket(pollutant);

        bucket.insert(SubIndexSample {
            value: sub_index,
            observed_at: now,
        });
        // A cutoff before the earliest representable instant evicts nothing
        let evicted = now
            .checked_sub(time::Duration::seconds_f64(self.window.as_secs_f64()))
            .map_or(0, |cutoff| bucket.evict_before(cutoff));
        if evicted > 0 {
            trace!(%scope, %pollutant, evicted, "Evicted samples outside window");
        }

        // The new sample is never older than the cutoff, so the bucket is non-empty
        let average = bucket.average().unwrap_or(sub_index);

        RecordOutcome {
            average,
            retained: bucket.samples.len(),
            evicted,
        }
    }

    /// Current stored average for a bucket, without evicting anything.
    pub fn average(&self, scope: &ScopeKey, pollutant: Pollutant) -> Option<f64> {
        self.scope(scope)?.bucket(pollutant).average()
    }

    /// Copy of the samples stored for a bucket, oldest first.
    pub fn samples(&self, scope: &ScopeKey, pollutant: Pollutant) -> Vec<SubIndexSample> {
        self.scope(scope)
            .map(|history| history.bucket(pollutant).samples.iter().copied().collect())
            .unwrap_or_default()
    }

    /// When a bucket received its first sample.
    pub fn first_seen_at(&self, scope: &ScopeKey, pollutant: Pollutant) -> Option<OffsetDateTime> {
        self.scope(scope)?.bucket(pollutant).first_seen_at
    }

    /// Diagnostic snapshot of a scope, or `None` if it was never referenced.
    pub fn snapshot(&self, scope: &ScopeKey) -> Option<ScopeSnapshot> {
        let history = self.scope(scope)?;
        let pollutants = Pollutant::ALL
            .into_iter()
            .filter_map(|p| {
                let bucket = history.bucket(p);
                let average = bucket.average()?;
                let last = bucket.samples.back()?;
                Some((
                    p,
                    PollutantSnapshot {
                        average,
                        sample_count: bucket.samples.len(),
                        first_seen_at: bucket.first_seen_at.unwrap_or(last.observed_at),
                        last_observed_at: last.observed_at,
                    },
                ))
            })
            .collect();

        Some(ScopeSnapshot {
            scope: scope.to_string(),
            pollutants,
        })
    }

    /// Every scope referenced so far, sorted with the overall scope first.
    pub fn scope_keys(&self) -> Vec<ScopeKey> {
        let mut keys: Vec<ScopeKey> = self.read_scopes().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Number of scopes referenced so far.
    pub fn scope_count(&self) -> usize {
        self.read_scopes().len()
    }

    fn scope(&self, key: &ScopeKey) -> Option<Arc<ScopeHistory>> {
        self.read_scopes().get(key).cloned()
    }

    fn scope_or_insert(&self, key: &ScopeKey) -> Arc<ScopeHistory> {
        if let Some(history) = self.scope(key) {
            return history;
        }
        let mut scopes = self
            .scopes
            .write()
            .expect("scope map lock poisoned - a thread panicked while holding the lock");
        Arc::clone(scopes.entry(key.clone()).or_default())
    }

    fn read_scopes(&self) -> std::sync::RwLockReadGuard<'_, HashMap<ScopeKey, Arc<ScopeHistory>>> {
        self.scopes
            .read()
            .expect("scope map lock poisoned - a thread panicked while holding the lock")
    }
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            scopes: RwLock::new(HashMap::new()),
        }
    }
}

impl fmt::Debug for HistoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HistoryStore")
            .field("window", &self.window)
            .field("scopes", &self.scope_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(secs: i64) -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(1_700_000_000 + secs).unwrap()
    }

    fn store() -> HistoryStore {
        HistoryStore::new(DEFAULT_WINDOW).unwrap()
    }

    #[test]
    fn test_zero_window_rejected() {
        assert!(matches!(
            HistoryStore::new(Duration::ZERO),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_oversized_window_rejected() {
        assert!(matches!(
            HistoryStore::new(Duration::from_secs(u64::MAX)),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            HistoryStore::new(MAX_WINDOW + Duration::from_secs(1)),
            Err(Error::InvalidConfig(_))
        ));

        let store = HistoryStore::new(MAX_WINDOW).unwrap();
        assert_eq!(store.window(), MAX_WINDOW);
        assert_eq!(store.record(&ScopeKey::Overall, Pollutant::Pm10, 50.0, t(0)), 50.0);
    }

    #[test]
    fn test_write_near_earliest_instant_keeps_sample() {
        let store = store();
        let earliest = time::PrimitiveDateTime::MIN.assume_utc();

        let outcome = store.record_detailed(&ScopeKey::Overall, Pollutant::Co, 75.0, earliest);
        assert_eq!(outcome.average, 75.0);
        assert_eq!(outcome.evicted, 0);
        assert_eq!(outcome.retained, 1);
    }

    #[test]
    fn test_average_of_samples_in_window() {
        let store = store();
        let scope = ScopeKey::Overall;

        assert_eq!(store.record(&scope, Pollutant::Pm25, 60.0, t(0)), 60.0);
        assert_eq!(store.record(&scope, Pollutant::Pm25, 80.0, t(10)), 70.0);
        assert_eq!(store.record(&scope, Pollutant::Pm25, 100.0, t(20)), 80.0);
    }

    #[test]
    fn test_write_evicts_samples_older_than_window() {
        let store = store();
        let scope = ScopeKey::location(1.0, 2.0);

        store.record(&scope, Pollutant::No2, 100.0, t(0));
        store.record(&scope, Pollutant::No2, 200.0, t(120));

        // Six minutes later only the 120s sample and the new one remain
        let outcome = store.record_detailed(&scope, Pollutant::No2, 300.0, t(360));
        assert_eq!(outcome.evicted, 1);
        assert_eq!(outcome.retained, 2);
        assert_eq!(outcome.average, 250.0);

        let samples = store.samples(&scope, Pollutant::No2);
        assert!(samples.iter().all(|s| s.observed_at >= t(360) - DEFAULT_WINDOW));
    }

    #[test]
    fn test_sample_exactly_at_window_edge_is_kept() {
        let store = store();
        let scope = ScopeKey::Overall;

        store.record(&scope, Pollutant::Co, 10.0, t(0));
        let outcome = store.record_detailed(&scope, Pollutant::Co, 30.0, t(300));
        assert_eq!(outcome.evicted, 0);
        assert_eq!(outcome.average, 20.0);
    }

    #[test]
    fn test_reads_do_not_evict() {
        let store = store();
        let scope = ScopeKey::Overall;

        store.record(&scope, Pollutant::O3, 42.0, t(0));
        // Long idle: the stale value is still reported until the next write
        assert_eq!(store.average(&scope, Pollutant::O3), Some(42.0));
        assert_eq!(store.samples(&scope, Pollutant::O3).len(), 1);

        assert_eq!(store.record(&scope, Pollutant::O3, 10.0, t(3_600)), 10.0);
    }

    #[test]
    fn test_first_seen_is_set_once() {
        let store = store();
        let scope = ScopeKey::Overall;

        assert_eq!(store.first_seen_at(&scope, Pollutant::Pb), None);
        store.record(&scope, Pollutant::Pb, 1.0, t(5));
        store.record(&scope, Pollutant::Pb, 1.0, t(900));
        assert_eq!(store.first_seen_at(&scope, Pollutant::Pb), Some(t(5)));
    }

    #[test]
    fn test_out_of_order_sample_inserted_sorted() {
        let store = store();
        let scope = ScopeKey::Overall;

        store.record(&scope, Pollutant::Nh3, 1.0, t(10));
        store.record(&scope, Pollutant::Nh3, 2.0, t(30));
        store.record(&scope, Pollutant::Nh3, 3.0, t(20));

        let times: Vec<_> = store
            .samples(&scope, Pollutant::Nh3)
            .iter()
            .map(|s| s.observed_at)
            .collect();
        assert_eq!(times, vec![t(10), t(20), t(30)]);
    }

    #[test]
    fn test_scopes_are_isolated() {
        let store = store();
        let a = ScopeKey::location(10.0, 20.0);
        let b = ScopeKey::location(30.0, 40.0);

        store.record(&b, Pollutant::Pm10, 50.0, t(0));
        store.record(&a, Pollutant::Pm10, 400.0, t(1));

        assert_eq!(store.average(&b, Pollutant::Pm10), Some(50.0));
        assert_eq!(store.average(&a, Pollutant::Pm10), Some(400.0));
        assert_eq!(store.average(&a, Pollutant::So2), None);
    }

    #[test]
    fn test_scope_keys_sorted_overall_first() {
        let store = store();
        store.record(&ScopeKey::location(5.0, 5.0), Pollutant::Co, 1.0, t(0));
        store.record(&ScopeKey::Overall, Pollutant::Co, 1.0, t(0));
        store.record(&ScopeKey::location(1.0, 1.0), Pollutant::Co, 1.0, t(0));

        let keys = store.scope_keys();
        assert_eq!(keys[0], ScopeKey::Overall);
        assert_eq!(keys.len(), 3);
        assert_eq!(store.scope_count(), 3);
    }

    #[test]
    fn test_snapshot_lists_only_populated_buckets() {
        let store = store();
        let scope = ScopeKey::location(28.6, 77.2);
        assert!(store.snapshot(&scope).is_none());

        store.record(&scope, Pollutant::So2, 20.0, t(0));
        store.record(&scope, Pollutant::So2, 40.0, t(60));

        let snapshot = store.snapshot(&scope).unwrap();
        assert_eq!(snapshot.scope, "28.6,77.2");
        assert_eq!(snapshot.pollutants.len(), 1);

        let s = &snapshot.pollutants[&Pollutant::So2];
        assert_eq!(s.average, 30.0);
        assert_eq!(s.sample_count, 2);
        assert_eq!(s.first_seen_at, t(0));
        assert_eq!(s.last_observed_at, t(60));
    }

    #[test]
    fn test_location_key_formatting() {
        assert_eq!(ScopeKey::location(28.6, 77.2).as_str(), "28.6,77.2");
        assert_eq!(ScopeKey::location(19.0, -72.85).as_str(), "19,-72.85");
        assert_eq!(ScopeKey::location(-0.0, -0.0).as_str(), "0,0");
        assert_eq!(ScopeKey::location(28.6, 77.2), ScopeKey::location(28.6, 77.2));
        assert_eq!(ScopeKey::Overall.to_string(), "overall");
    }

    #[test]
    fn test_concurrent_writers_lose_nothing() {
        let store = Arc::new(store());
        let scope = ScopeKey::location(28.6, 77.2);
        let now = t(0);

        let handles: Vec<_> = (0..2)
            .map(|worker| {
                let store = Arc::clone(&store);
                let scope = scope.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        store.record(&scope, Pollutant::Pm25, f64::from(worker * 50 + i), now);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let samples = store.samples(&scope, Pollutant::Pm25);
        assert_eq!(samples.len(), 100);
        // 0..100 averages to 49.5
        assert_eq!(store.average(&scope, Pollutant::Pm25), Some(49.5));
    }
}
