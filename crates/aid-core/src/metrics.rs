//! Global atomic counters for resolution activity.
//!
//! Counters are bumped silently by the orchestrator. Call
//! [`Metrics::flush`] to log the current values as one `info!` event, e.g.
//! when a CLI command or conformance run ends.

use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide counters.
pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    resolutions_started: AtomicU64,
    resolutions_failed: AtomicU64,
    dns_retries: AtomicU64,
    fetches: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            resolutions_started: AtomicU64::new(0),
            resolutions_failed: AtomicU64::new(0),
            dns_retries: AtomicU64::new(0),
            fetches: AtomicU64::new(0),
        }
    }

    pub fn inc_resolutions_started(&self) {
        self.resolutions_started.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "resolutions_started", "counter incremented");
    }

    pub fn inc_resolutions_failed(&self) {
        self.resolutions_failed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "resolutions_failed", "counter incremented");
    }

    pub fn inc_dns_retries(&self) {
        self.dns_retries.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "dns_retries", "counter incremented");
    }

    /// Counts HTTP requests issued, redirects included.
    pub fn inc_fetches(&self) {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "fetches", "counter incremented");
    }

    /// Emit all counters as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            resolutions_started = self.resolutions_started(),
            resolutions_failed = self.resolutions_failed(),
            dns_retries = self.dns_retries(),
            fetches = self.fetches(),
        );
    }

    pub fn resolutions_started(&self) -> u64 {
        self.resolutions_started.load(Ordering::Relaxed)
    }

    pub fn resolutions_failed(&self) -> u64 {
        self.resolutions_failed.load(Ordering::Relaxed)
    }

    pub fn dns_retries(&self) -> u64 {
        self.dns_retries.load(Ordering::Relaxed)
    }

    pub fn fetches(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        self.resolutions_started.store(0, Ordering::Relaxed);
        self.resolutions_failed.store(0, Ordering::Relaxed);
        self.dns_retries.store(0, Ordering::Relaxed);
        self.fetches.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = Metrics::new();
        m.inc_resolutions_started();
        m.inc_resolutions_started();
        m.inc_resolutions_failed();
        m.inc_dns_retries();
        m.inc_fetches();
        m.inc_fetches();
        m.inc_fetches();
        assert_eq!(m.resolutions_started(), 2);
        assert_eq!(m.resolutions_failed(), 1);
        assert_eq!(m.dns_retries(), 1);
        assert_eq!(m.fetches(), 3);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = Metrics::new();
        m.inc_resolutions_started();
        m.inc_fetches();
        m.reset();
        assert_eq!(m.resolutions_started(), 0);
        assert_eq!(m.fetches(), 0);
    }
}
