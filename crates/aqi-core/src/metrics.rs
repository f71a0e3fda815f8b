//! Engine counters.
//!
//! Counters are plain relaxed atomics: they are monotonic tallies read for
//! diagnostics and never used to synchronize anything.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Point-in-time copy of the engine counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    /// Readings that produced a result.
    pub readings_processed: u64,
    /// Readings rejected by validation before any history write.
    pub readings_rejected: u64,
    /// Readings that failed on an unrecognized pollutant identifier.
    pub unknown_pollutant_failures: u64,
    /// Sub-index samples written to history (location and overall writes both count).
    pub samples_recorded: u64,
    /// Samples evicted for falling outside the window.
    pub samples_evicted: u64,
}

impl EngineStats {
    /// Total readings seen, successful or not.
    pub fn readings_total(&self) -> u64 {
        self.readings_processed + self.readings_rejected + self.unknown_pollutant_failures
    }
}

/// Thread-safe engine counters.
#[derive(Debug, Default)]
pub struct EngineMetrics {
    readings_processed: AtomicU64,
    readings_rejected: AtomicU64,
    unknown_pollutant_failures: AtomicU64,
    samples_recorded: AtomicU64,
    samples_evicted: AtomicU64,
}

impl EngineMetrics {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_processed(&self) {
        self.readings_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.readings_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_unknown_pollutant(&self) {
        self.unknown_pollutant_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_samples(&self, recorded: u64, evicted: u64) {
        self.samples_recorded.fetch_add(recorded, Ordering::Relaxed);
        if evicted > 0 {
            self.samples_evicted.fetch_add(evicted, Ordering::Relaxed);
        }
    }

    /// Get a snapshot of the current counters.
    pub fn snapshot(&self) -> EngineStats {
        EngineStats {
            readings_processed: self.readings_processed.load(Ordering::Relaxed),
            readings_rejected: self.readings_rejected.load(Ordering::Relaxed),
            unknown_pollutant_failures: self.unknown_pollutant_failures.load(Ordering::Relaxed),
            samples_recorded: self.samples_recorded.load(Ordering::Relaxed),
            samples_evicted: self.samples_evicted.load(Ordering::Relaxed),
        }
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        self.readings_processed.store(0, Ordering::Relaxed);
        self.readings_rejected.store(0, Ordering::Relaxed);
        self.unknown_pollutant_failures.store(0, Ordering::Relaxed);
        self.samples_recorded.store(0, Ordering::Relaxed);
        self.samples_evicted.store(0, Ordering::Relaxed);
    }
}
