//! Byte-accounted backlog queue
//!
//! The backlog holds commands waiting for a scheduler worker. It is a strict
//! FIFO backed by a `VecDeque`, and it tracks the memory it represents: every
//! item costs its command's byte size plus a fixed bookkeeping overhead.
//!
//! Under memory pressure [`BacklogQueue::trim`] evicts the oldest
//! `WritePacket` commands. Control commands (`Connect`, `Disconnect`,
//! `Dispatch`) are never evicted and keep their relative order.

use std::collections::VecDeque;
use smallvec::SmallVec;
use tracing::debug;

use crate::command::SchedulerCommand;

/// Default bookkeeping cost charged per queued command, in bytes
pub const DEFAULT_ITEM_OVERHEAD: usize = 24;

// ----------------------------------------------------------------------------
// Queue Item
// ----------------------------------------------------------------------------

struct QueueItem<P> {
    command: SchedulerCommand<P>,
    cost: usize,
}

// ----------------------------------------------------------------------------
// Trim Outcome
// ----------------------------------------------------------------------------

/// Result of an eviction scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrimOutcome {
    /// Bytes released, including per-item overhead
    pub freed_bytes: usize,
    /// Number of `WritePacket` commands evicted
    pub evicted: usize,
    /// Whether `freed_bytes` reached the requested target
    pub satisfied: bool,
}

// ----------------------------------------------------------------------------
// Backlog Queue
// ----------------------------------------------------------------------------

/// FIFO of pending scheduler commands with byte accounting
pub struct BacklogQueue<P> {
    items: VecDeque<QueueItem<P>>,
    total_bytes: usize,
    evictable_bytes: usize,
    item_overhead: usize,
}

impl<P> BacklogQueue<P> {
    /// Create an empty queue with the default per-item overhead
    pub fn new() -> Self {
        Self::with_overhead(DEFAULT_ITEM_OVERHEAD)
    }

    /// Create an empty queue charging `item_overhead` bytes per command
    pub fn with_overhead(item_overhead: usize) -> Self {
        Self {
            items: VecDeque::new(),
            total_bytes: 0,
            evictable_bytes: 0,
            item_overhead,
        }
    }

    /// Bytes a command will occupy once queued
    pub fn cost_of(&self, command: &SchedulerCommand<P>) -> usize {
        command.byte_size() + self.item_overhead
    }

    /// Append a command at the tail
    pub fn enqueue(&mut self, command: SchedulerCommand<P>) {
        let cost = self.cost_of(&command);
        self.total_bytes += cost;
        if command.action().is_evictable() {
            self.evictable_bytes += cost;
        }
        self.items.push_back(QueueItem { command, cost });
    }

    /// Remove and return the head command, or `None` when empty
    pub fn dequeue(&mut self) -> Option<SchedulerCommand<P>> {
        let item = self.items.pop_front()?;
        self.total_bytes -= item.cost;
        if item.command.action().is_evictable() {
            self.evictable_bytes -= item.cost;
        }
        Some(item.command)
    }

    /// Evict the oldest `WritePacket` commands until `target_bytes` are freed
    ///
    /// Returns `true` once the freed bytes reach the target, `false` if the
    /// scan ran out of evictable commands first.
    pub fn trim(&mut self, target_bytes: usize) -> bool {
        self.trim_report(target_bytes).satisfied
    }

    /// Same as [`trim`](Self::trim) but reports what was evicted
    pub fn trim_report(&mut self, target_bytes: usize) -> TrimOutcome {
        let mut outcome = TrimOutcome::default();
        if target_bytes == 0 {
            outcome.satisfied = true;
            return outcome;
        }

        // Control commands passed over during the scan, restored afterwards.
        let mut skipped: SmallVec<[QueueItem<P>; 4]> = SmallVec::new();

        while outcome.freed_bytes < target_bytes {
            let Some(item) = self.items.pop_front() else {
                break;
            };
            if item.command.action().is_evictable() {
                self.total_bytes -= item.cost;
                self.evictable_bytes -= item.cost;
                outcome.freed_bytes += item.cost;
                outcome.evicted += 1;
            } else {
                skipped.push(item);
            }
        }

        for item in skipped.into_iter().rev() {
            self.items.push_front(item);
        }

        outcome.satisfied = outcome.freed_bytes >= target_bytes;
        if outcome.evicted > 0 {
            debug!(
                "{} bytes trimmed ({} commands), {} bytes remain queued",
                outcome.freed_bytes, outcome.evicted, self.total_bytes
            );
        }
        outcome
    }

    /// Remove all commands
    pub fn clear(&mut self) -> usize {
        let mut removed = 0;
        while self.dequeue().is_some() {
            removed += 1;
        }
        removed
    }

    /// Number of queued commands
    pub fn count(&self) -> usize {
        self.items.len()
    }

    /// Total queued bytes including per-item overhead
    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Bytes a full [`trim`](Self::trim) could release
    ///
    /// Sum of the costs of queued `WritePacket` commands. A trim target above
    /// this value cannot be satisfied.
    pub fn evictable_bytes(&self) -> usize {
        self.evictable_bytes
    }

    pub fn item_overhead(&self) -> usize {
        self.item_overhead
    }

    /// Iterate over queued commands from head to tail
    pub fn iter(&self) -> impl Iterator<Item = &SchedulerCommand<P>> {
        self.items.iter().map(|item| &item.command)
    }
}

impl<P> Default for BacklogQueue<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> std::fmt::Debug for BacklogQueue<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BacklogQueue")
            .field("count", &self.items.len())
            .field("total_bytes", &self.total_bytes)
            .field("evictable_bytes", &self.evictable_bytes)
            .field("item_overhead", &self.item_overhead)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
