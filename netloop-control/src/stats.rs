use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Loop-wide counters. These are shared between the tick workers and observers.
#[derive(Debug, Default)]
pub struct LoopStats {
    ticks: AtomicU64,
    applied: AtomicU64,
    held: AtomicU64,
    rate_limited: AtomicU64,
    probe_failures: AtomicU64,
    apply_failures: AtomicU64,
    anomalies: AtomicU64,
    timeouts: AtomicU64,
    store_failures: AtomicU64,
}

impl LoopStats {
    #[inline]
    pub(crate) fn increment_ticks(&self) -> u64 {
        self.ticks.fetch_add(1, Ordering::Relaxed) + 1
    }

    #[inline]
    pub(crate) fn increment_applied(&self) {
        self.applied.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn increment_held(&self) {
        self.held.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn increment_rate_limited(&self) {
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn increment_probe_failures(&self) {
        self.probe_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn increment_apply_failures(&self) {
        self.apply_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn increment_anomalies(&self) {
        self.anomalies.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn increment_timeouts(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn increment_store_failures(&self) {
        self.store_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn applied(&self) -> u64 {
        self.applied.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn held(&self) -> u64 {
        self.held.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn rate_limited(&self) -> u64 {
        self.rate_limited.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn probe_failures(&self) -> u64 {
        self.probe_failures.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn apply_failures(&self) -> u64 {
        self.apply_failures.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn anomalies(&self) -> u64 {
        self.anomalies.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn timeouts(&self) -> u64 {
        self.timeouts.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn store_failures(&self) -> u64 {
        self.store_failures.load(Ordering::Relaxed)
    }

    /// A plain copy of all counters.
    pub fn summary(&self) -> StatsSummary {
        StatsSummary {
            ticks: self.ticks(),
            applied: self.applied(),
            held: self.held(),
            rate_limited: self.rate_limited(),
            probe_failures: self.probe_failures(),
            apply_failures: self.apply_failures(),
            anomalies: self.anomalies(),
            timeouts: self.timeouts(),
            store_failures: self.store_failures(),
        }
    }
}

/// Point-in-time copy of [`LoopStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StatsSummary {
    pub ticks: u64,
    pub applied: u64,
    pub held: u64,
    pub rate_limited: u64,
    pub probe_failures: u64,
    pub apply_failures: u64,
    pub anomalies: u64,
    pub timeouts: u64,
    pub store_failures: u64,
}
