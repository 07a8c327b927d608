//! Scheduler Configuration
//!
//! Configuration for a scheduler and its backlog, plus the mapping from the
//! `async.*` connection options onto it.

use std::time::Duration;
use serde::{Deserialize, Serialize};

use crate::connections::OptionTable;
use crate::errors::ConfigError;
use crate::queue::DEFAULT_ITEM_OVERHEAD;

/// Default backlog capacity in kilobytes
pub const DEFAULT_QUEUE_KB: u64 = 2048;
/// Default number of commands taken from the backlog per worker pass
pub const DEFAULT_BATCH_SIZE: usize = 16;
/// Default time `stop()` waits for the backlog to drain
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

pub const OPTION_ASYNC_ENABLED: &str = "async.enabled";
pub const OPTION_ASYNC_QUEUE: &str = "async.queue";
pub const OPTION_ASYNC_OVERFLOW: &str = "async.overflow";
pub const OPTION_ASYNC_BATCH: &str = "async.batch";
pub const OPTION_ASYNC_CLEAR_ON_DISCONNECT: &str = "async.clearondisconnect";
pub const OPTION_ASYNC_SHUTDOWN: &str = "async.shutdown";
pub const OPTION_CAPTION: &str = "caption";

/// Option keys understood by every protocol
pub const COMMON_OPTION_KEYS: &[&str] = &[
    OPTION_ASYNC_ENABLED,
    OPTION_ASYNC_QUEUE,
    OPTION_ASYNC_OVERFLOW,
    OPTION_ASYNC_BATCH,
    OPTION_ASYNC_CLEAR_ON_DISCONNECT,
    OPTION_ASYNC_SHUTDOWN,
    OPTION_CAPTION,
];

// ----------------------------------------------------------------------------
// Overflow Policy
// ----------------------------------------------------------------------------

/// What `schedule()` does when trimming cannot make room for a packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OverflowPolicy {
    /// Queue the packet anyway; the backlog may exceed its capacity
    #[default]
    AdmitAnyway,
    /// Discard the incoming packet and leave the backlog untouched
    DropIncoming,
}

impl OverflowPolicy {
    /// Parse the `async.overflow` option value
    pub fn from_option(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "admit" => Some(OverflowPolicy::AdmitAnyway),
            "drop" => Some(OverflowPolicy::DropIncoming),
            _ => None,
        }
    }
}

// ----------------------------------------------------------------------------
// Scheduler Configuration
// ----------------------------------------------------------------------------

/// Configuration for one scheduler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Backlog capacity in bytes, per-item overhead included
    pub capacity_bytes: usize,
    /// Bookkeeping bytes charged per queued command
    pub item_overhead: usize,
    /// Maximum commands the worker takes per pass
    pub batch_size: usize,
    /// Behavior when trimming cannot free enough space
    pub overflow_policy: OverflowPolicy,
    /// Time the scheduler's `Drop` waits for the backlog to drain
    pub shutdown_timeout: Duration,
    /// Discard pending commands when a `Disconnect` is scheduled
    pub clear_on_disconnect: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            capacity_bytes: (DEFAULT_QUEUE_KB * 1024) as usize, // 2 MB
            item_overhead: DEFAULT_ITEM_OVERHEAD,
            batch_size: DEFAULT_BATCH_SIZE,
            overflow_policy: OverflowPolicy::AdmitAnyway,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            clear_on_disconnect: false,
        }
    }
}

impl SchedulerConfig {
    /// Small, exact configuration for tests
    ///
    /// No per-item overhead, so queued bytes equal packet sizes.
    pub fn testing() -> Self {
        Self {
            capacity_bytes: 1024,
            item_overhead: 0,
            batch_size: 4,
            overflow_policy: OverflowPolicy::AdmitAnyway,
            shutdown_timeout: Duration::from_secs(2),
            clear_on_disconnect: false,
        }
    }

    /// Configuration for memory-constrained processes
    pub fn low_memory() -> Self {
        Self {
            capacity_bytes: 256 * 1024,
            batch_size: 8,
            overflow_policy: OverflowPolicy::DropIncoming,
            shutdown_timeout: Duration::from_secs(2),
            ..Self::default()
        }
    }

    /// Configuration for bursty, high-volume producers
    pub fn high_throughput() -> Self {
        Self {
            capacity_bytes: 16 * 1024 * 1024,
            batch_size: 64,
            shutdown_timeout: Duration::from_secs(10),
            ..Self::default()
        }
    }

    pub fn with_capacity(mut self, capacity_bytes: usize) -> Self {
        self.capacity_bytes = capacity_bytes;
        self
    }

    pub fn with_overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.overflow_policy = policy;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_clear_on_disconnect(mut self, enabled: bool) -> Self {
        self.clear_on_disconnect = enabled;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Validate configuration consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity_bytes == 0 {
            return Err(invalid("Backlog capacity cannot be zero"));
        }
        if self.batch_size == 0 {
            return Err(invalid("Batch size cannot be zero"));
        }
        if self.item_overhead >= self.capacity_bytes {
            return Err(invalid("Item overhead must be smaller than the backlog capacity"));
        }
        Ok(())
    }

    /// Read the `async.*` options of a connection entry
    ///
    /// Missing options keep their defaults. `async.enabled` and `caption` are
    /// not part of the scheduler configuration and are ignored here.
    pub fn from_options(options: &OptionTable) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let overflow_policy = match options.string(OPTION_ASYNC_OVERFLOW) {
            Some(value) => {
                OverflowPolicy::from_option(value).ok_or_else(|| ConfigError::InvalidValue {
                    key: OPTION_ASYNC_OVERFLOW.to_string(),
                    value: value.to_string(),
                })?
            }
            None => defaults.overflow_policy,
        };

        let config = Self {
            capacity_bytes: options.size(OPTION_ASYNC_QUEUE, DEFAULT_QUEUE_KB) as usize,
            item_overhead: defaults.item_overhead,
            batch_size: options.integer(OPTION_ASYNC_BATCH, DEFAULT_BATCH_SIZE as u64) as usize,
            overflow_policy,
            shutdown_timeout: options.timespan(OPTION_ASYNC_SHUTDOWN, DEFAULT_SHUTDOWN_TIMEOUT),
            clear_on_disconnect: options.boolean(OPTION_ASYNC_CLEAR_ON_DISCONNECT, false),
        };
        config.validate()?;
        Ok(config)
    }
}

fn invalid(reason: &str) -> ConfigError {
    ConfigError::InvalidScheduler {
        reason: reason.to_string(),
    }
}
