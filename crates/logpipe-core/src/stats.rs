//! Scheduler statistics
//!
//! Counters shared between producers and the worker. Every data-loss path of
//! the scheduler (rejection, oversized packets, overflow drops, evictions,
//! clears) is counted here so it stays observable even though `schedule()`
//! never reports it to the caller as an error.

use std::sync::atomic::{AtomicU64, Ordering};
use serde::{Deserialize, Serialize};

/// Delivery counters for one scheduler
/// Uses atomic counters so producers and the worker can update them without locking
#[derive(Debug, Default)]
pub struct SchedulerStats {
    scheduled: AtomicU64,
    rejected: AtomicU64,
    oversized: AtomicU64,
    dropped: AtomicU64,
    evicted: AtomicU64,
    evicted_bytes: AtomicU64,
    cleared: AtomicU64,
    executed: AtomicU64,
    failed: AtomicU64,
}

impl SchedulerStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a command admitted to the backlog
    pub fn record_scheduled(&self) {
        self.scheduled.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a command refused because the scheduler was not running
    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a packet larger than the whole backlog capacity
    pub fn record_oversized(&self) {
        self.oversized.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an incoming packet dropped by the overflow policy
    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record queued packets evicted by a trim
    pub fn record_evicted(&self, commands: usize, bytes: usize) {
        self.evicted.fetch_add(commands as u64, Ordering::Relaxed);
        self.evicted_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Record pending commands discarded by a clear
    pub fn record_cleared(&self, commands: usize) {
        self.cleared.fetch_add(commands as u64, Ordering::Relaxed);
    }

    /// Record a command the sink executed successfully
    pub fn record_executed(&self) {
        self.executed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a command the sink failed to execute
    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn scheduled(&self) -> u64 {
        self.scheduled.load(Ordering::Relaxed)
    }

    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    pub fn oversized(&self) -> u64 {
        self.oversized.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    pub fn evicted_bytes(&self) -> u64 {
        self.evicted_bytes.load(Ordering::Relaxed)
    }

    pub fn cleared(&self) -> u64 {
        self.cleared.load(Ordering::Relaxed)
    }

    pub fn executed(&self) -> u64 {
        self.executed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Commands accepted by `schedule()` that never reached the sink
    pub fn lost(&self) -> u64 {
        self.evicted() + self.cleared()
    }

    /// Point-in-time copy of all counters
    pub fn snapshot(&self) -> SchedulerSnapshot {
        SchedulerSnapshot {
            scheduled: self.scheduled(),
            rejected: self.rejected(),
            oversized: self.oversized(),
            dropped: self.dropped(),
            evicted: self.evicted(),
            evicted_bytes: self.evicted_bytes(),
            cleared: self.cleared(),
            executed: self.executed(),
            failed: self.failed(),
        }
    }
}

/// Plain copy of [`SchedulerStats`] for reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SchedulerSnapshot {
    pub scheduled: u64,
    pub rejected: u64,
    pub oversized: u64,
    pub dropped: u64,
    pub evicted: u64,
    pub evicted_bytes: u64,
    pub cleared: u64,
    pub executed: u64,
    pub failed: u64,
}
