//! Engine counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic counters for the dispatch boundary and verification
/// outcomes. Cheap to bump from any task; read via [`snapshot`].
///
/// [`snapshot`]: EngineStats::snapshot
#[derive(Debug, Default)]
pub struct EngineStats {
    received: AtomicU64,
    handled: AtomicU64,
    dropped: AtomicU64,
    security_failures: AtomicU64,
    decryption_failures: AtomicU64,
    verified: AtomicU64,
    rejected: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub received: u64,
    pub handled: u64,
    pub dropped: u64,
    pub security_failures: u64,
    pub decryption_failures: u64,
    pub verified: u64,
    pub rejected: u64,
}

impl EngineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_handled(&self) {
        self.handled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_security_failures(&self) {
        self.security_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_decryption_failures(&self) {
        self.decryption_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_verified(&self) {
        self.verified.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            handled: self.handled.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            security_failures: self.security_failures.load(Ordering::Relaxed),
            decryption_failures: self.decryption_failures.load(Ordering::Relaxed),
            verified: self.verified.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}
