//! Logpipe Runtime
//!
//! This crate drives the delivery core from `logpipe-core`:
//! - `Scheduler`: admission, backlog bounds and lifecycle
//! - the worker thread executing queued commands against a sink
//! - `SchedulerBuilder`: construction from configuration or a connection string

mod worker;

pub mod builder;
pub mod scheduler;

pub use builder::{SchedulerBuilder, DEFAULT_CAPTION};
pub use scheduler::{Scheduler, StopOutcome};
pub use worker::{ErrorListener, SinkFailure};

// Re-export core types for convenience
pub use logpipe_core::{
    ConnectionEntry, ConnectionsParser, LogpipeError, LogpipeResult, OverflowPolicy, Packet,
    ProtocolCommand, SchedulerAction, SchedulerCommand, SchedulerConfig, SchedulerError,
    SchedulerSnapshot, SchedulerStats, Sink, SinkError,
};
