//! Oscillation counters.
//!
//! Atomic so the figures can be read from a logging hook while the
//! oscillator keeps running.

use std::sync::atomic::{AtomicU64, Ordering};

/// Running totals for the oscillation loop.
pub struct OscillationStats {
    cycles: AtomicU64,
    spawn_failures: AtomicU64,
    signal_failures: AtomicU64,
}

impl OscillationStats {
    /// Creates a new OscillationStats instance with all counters at zero.
    pub fn new() -> Self {
        Self {
            cycles: AtomicU64::new(0),
            spawn_failures: AtomicU64::new(0),
            signal_failures: AtomicU64::new(0),
        }
    }

    /// Increments the completed cycle counter by one.
    pub fn add_cycle(&self) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
    }

    /// Increments the failed spawn counter by one.
    pub fn add_spawn_failure(&self) {
        self.spawn_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Increments the failed signal counter by one.
    pub fn add_signal_failure(&self) {
        self.signal_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    pub fn get_spawn_failures(&self) -> u64 {
        self.spawn_failures.load(Ordering::Relaxed)
    }

    pub fn get_signal_failures(&self) -> u64 {
        self.signal_failures.load(Ordering::Relaxed)
    }
}

impl Default for OscillationStats {
    fn default() -> Self {
        Self::new()
    }
}
