//! Logpipe Core
//!
//! Building blocks for asynchronous log delivery: the scheduler command model,
//! the byte-accounted backlog queue, the sink contract, scheduler
//! configuration, and the connection string grammar. The worker that drives
//! these lives in `logpipe-runtime`.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod command;
pub mod config;
pub mod connections;
pub mod errors;
pub mod queue;
pub mod sink;
pub mod stats;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use command::{Packet, PacketPayload, ProtocolCommand, SchedulerAction, SchedulerCommand};
pub use config::{OverflowPolicy, SchedulerConfig, COMMON_OPTION_KEYS};
pub use connections::{ConnectionEntry, ConnectionsParser, OptionTable, OptionsParser};
pub use errors::{
    ConfigError, LogpipeError, LogpipeResult, ParseError, Result, SchedulerError, SinkError,
};
pub use queue::{BacklogQueue, TrimOutcome, DEFAULT_ITEM_OVERHEAD};
pub use sink::Sink;
pub use stats::{SchedulerSnapshot, SchedulerStats};
