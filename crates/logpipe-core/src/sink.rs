//! Sink Contract
//!
//! Defines the interface a protocol implementation exposes to a scheduler
//! worker. Concrete sinks (file, pipe, TCP, cloud) live outside this crate.

use crate::command::{Packet, ProtocolCommand, SchedulerCommand};
use crate::errors::SinkError;

// ----------------------------------------------------------------------------
// Sink Trait
// ----------------------------------------------------------------------------

/// Destination that executes scheduler commands
///
/// ## Execution model
///
/// A sink is owned by exactly one scheduler worker once the scheduler has
/// started. Every method is called from that worker thread only, one command
/// at a time, in the order the commands were scheduled. Calls are blocking
/// from the scheduler's point of view; a sink is responsible for its own I/O
/// timeouts.
///
/// Errors returned from any method are reported by the worker and never stop
/// it: the next command is executed regardless.
pub trait Sink: Send + 'static {
    /// Packet type written by this sink
    type Packet: Packet;

    /// Open the connection to the destination
    fn connect(&mut self) -> Result<(), SinkError>;

    /// Write a single packet
    fn write_packet(&mut self, packet: &Self::Packet) -> Result<(), SinkError>;

    /// Close the connection to the destination
    fn disconnect(&mut self) -> Result<(), SinkError>;

    /// Execute a protocol specific custom action
    ///
    /// The default implementation ignores the command.
    fn dispatch(&mut self, command: &ProtocolCommand) -> Result<(), SinkError> {
        let _ = command;
        Ok(())
    }

    /// Whether the sink has entered a failed state it cannot recover from
    ///
    /// Checked by the worker during shutdown: pending commands are discarded
    /// instead of being executed against a failed sink.
    fn is_failed(&self) -> bool {
        false
    }

    /// Execute one command by routing it to the matching method
    fn execute(&mut self, command: &SchedulerCommand<Self::Packet>) -> Result<(), SinkError> {
        match command {
            SchedulerCommand::Connect => self.connect(),
            SchedulerCommand::WritePacket(payload) => self.write_packet(payload.packet()),
            SchedulerCommand::Disconnect => self.disconnect(),
            SchedulerCommand::Dispatch(protocol_command) => self.dispatch(protocol_command),
        }
    }
}
