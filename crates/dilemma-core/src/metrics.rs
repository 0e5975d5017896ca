//! Process-wide arena counters.
//!
//! Incremented at the call site, read back with the getters, and emitted as
//! one `info!` line by [`Metrics::flush`] (end of a match or tournament).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Relaxed atomic counters.
pub struct Metrics {
    matches_completed: AtomicU64,
    matches_terminated: AtomicU64,
    rounds_played: AtomicU64,
    degraded_calls: AtomicU64,
    stats_update_failures: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            matches_completed: AtomicU64::new(0),
            matches_terminated: AtomicU64::new(0),
            rounds_played: AtomicU64::new(0),
            degraded_calls: AtomicU64::new(0),
            stats_update_failures: AtomicU64::new(0),
        }
    }

    pub fn inc_matches_completed(&self) {
        self.matches_completed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "matches_completed", "counter incremented");
    }

    /// A match that ended failed or aborted.
    pub fn inc_matches_terminated(&self) {
        self.matches_terminated.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "matches_terminated", "counter incremented");
    }

    pub fn inc_rounds_played(&self) {
        self.rounds_played.fetch_add(1, Ordering::Relaxed);
    }

    /// A completion call whose error was absorbed into an empty reply.
    pub fn inc_degraded_calls(&self) {
        self.degraded_calls.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "degraded_calls", "counter incremented");
    }

    /// A completed match whose model aggregate could not be updated.
    pub fn inc_stats_update_failures(&self) {
        self.stats_update_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "stats_update_failures", "counter incremented");
    }

    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            matches_completed = self.matches_completed(),
            matches_terminated = self.matches_terminated(),
            rounds_played = self.rounds_played(),
            degraded_calls = self.degraded_calls(),
            stats_update_failures = self.stats_update_failures(),
        );
    }

    pub fn matches_completed(&self) -> u64 {
        self.matches_completed.load(Ordering::Relaxed)
    }

    pub fn matches_terminated(&self) -> u64 {
        self.matches_terminated.load(Ordering::Relaxed)
    }

    pub fn rounds_played(&self) -> u64 {
        self.rounds_played.load(Ordering::Relaxed)
    }

    pub fn degraded_calls(&self) -> u64 {
        self.degraded_calls.load(Ordering::Relaxed)
    }

    pub fn stats_update_failures(&self) -> u64 {
        self.stats_update_failures.load(Ordering::Relaxed)
    }

    /// Zero everything (tests).
    pub fn reset(&self) {
        self.matches_completed.store(0, Ordering::Relaxed);
        self.matches_terminated.store(0, Ordering::Relaxed);
        self.rounds_played.store(0, Ordering::Relaxed);
        self.degraded_calls.store(0, Ordering::Relaxed);
        self.stats_update_failures.store(0, Ordering::Relaxed);
    }
}
