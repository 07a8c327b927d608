//! Scheduler command model
//!
//! A [`SchedulerCommand`] is the unit of work handed from producer threads to
//! a scheduler worker. Each variant carries exactly the payload its action
//! needs; only [`SchedulerCommand::WritePacket`] carries bulk data and counts
//! against the backlog capacity.

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

// ----------------------------------------------------------------------------
// Packet Contract
// ----------------------------------------------------------------------------

/// A log record that can be written to a sink
///
/// `size` is the memory footprint used for backlog accounting. It is read
/// once when the packet is wrapped in a command.
pub trait Packet: Send + 'static {
    fn size(&self) -> usize;
}

// ----------------------------------------------------------------------------
// Actions
// ----------------------------------------------------------------------------

/// The operation kind of a scheduler command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SchedulerAction {
    Connect,
    WritePacket,
    Disconnect,
    Dispatch,
}

impl SchedulerAction {
    /// Whether commands of this action may be evicted by a trim
    pub fn is_evictable(self) -> bool {
        matches!(self, SchedulerAction::WritePacket)
    }
}

impl fmt::Display for SchedulerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerAction::Connect => write!(f, "Connect"),
            SchedulerAction::WritePacket => write!(f, "WritePacket"),
            SchedulerAction::Disconnect => write!(f, "Disconnect"),
            SchedulerAction::Dispatch => write!(f, "Dispatch"),
        }
    }
}

// ----------------------------------------------------------------------------
// Protocol Command
// ----------------------------------------------------------------------------

/// A protocol specific custom action, delivered through `Dispatch`
///
/// The meaning of `action` is defined by the sink. `state` optionally carries
/// additional data the sink can downcast.
#[derive(Clone)]
pub struct ProtocolCommand {
    action: i32,
    state: Option<Arc<dyn Any + Send + Sync>>,
}

impl ProtocolCommand {
    pub fn new(action: i32) -> Self {
        Self {
            action,
            state: None,
        }
    }

    pub fn with_state<T: Any + Send + Sync>(action: i32, state: T) -> Self {
        Self {
            action,
            state: Some(Arc::new(state)),
        }
    }

    pub fn action(&self) -> i32 {
        self.action
    }

    /// Borrow the attached state if it has type `T`
    pub fn state<T: Any>(&self) -> Option<&T> {
        self.state.as_deref().and_then(|s| s.downcast_ref::<T>())
    }
}

impl fmt::Debug for ProtocolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolCommand")
            .field("action", &self.action)
            .field("has_state", &self.state.is_some())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Packet Payload
// ----------------------------------------------------------------------------

/// A packet together with the byte size captured at creation
#[derive(Debug)]
pub struct PacketPayload<P> {
    packet: P,
    size: usize,
}

impl<P: Packet> PacketPayload<P> {
    pub fn new(packet: P) -> Self {
        let size = packet.size();
        Self { packet, size }
    }
}

impl<P> PacketPayload<P> {
    pub fn packet(&self) -> &P {
        &self.packet
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn into_packet(self) -> P {
        self.packet
    }
}

// ----------------------------------------------------------------------------
// Scheduler Command
// ----------------------------------------------------------------------------

/// Work item queued for a scheduler worker
#[derive(Debug)]
pub enum SchedulerCommand<P> {
    Connect,
    WritePacket(PacketPayload<P>),
    Disconnect,
    Dispatch(ProtocolCommand),
}

impl<P: Packet> SchedulerCommand<P> {
    /// Wrap a packet, capturing its size
    pub fn write_packet(packet: P) -> Self {
        SchedulerCommand::WritePacket(PacketPayload::new(packet))
    }
}

impl<P> SchedulerCommand<P> {
    pub fn connect() -> Self {
        SchedulerCommand::Connect
    }

    pub fn disconnect() -> Self {
        SchedulerCommand::Disconnect
    }

    pub fn dispatch(command: ProtocolCommand) -> Self {
        SchedulerCommand::Dispatch(command)
    }

    pub fn action(&self) -> SchedulerAction {
        match self {
            SchedulerCommand::Connect => SchedulerAction::Connect,
            SchedulerCommand::WritePacket(_) => SchedulerAction::WritePacket,
            SchedulerCommand::Disconnect => SchedulerAction::Disconnect,
            SchedulerCommand::Dispatch(_) => SchedulerAction::Dispatch,
        }
    }

    /// Bytes this command contributes to the backlog, excluding item overhead
    pub fn byte_size(&self) -> usize {
        match self {
            SchedulerCommand::WritePacket(payload) => payload.size(),
            _ => 0,
        }
    }

    pub fn packet(&self) -> Option<&P> {
        match self {
            SchedulerCommand::WritePacket(payload) => Some(payload.packet()),
            _ => None,
        }
    }
}
