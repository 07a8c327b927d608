//! Test doubles for scheduler consumers
//!
//! Sinks that record what they execute, fail on demand, or block until a
//! test releases them. Enabled by the `testing` feature.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::command::{Packet, ProtocolCommand};
use crate::errors::SinkError;
use crate::sink::Sink;

// ----------------------------------------------------------------------------
// Test Packet
// ----------------------------------------------------------------------------

/// Packet with an identifier and a declared byte size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestPacket {
    pub id: u64,
    pub size: usize,
}

impl TestPacket {
    pub fn new(id: u64, size: usize) -> Self {
        Self { id, size }
    }
}

impl Packet for TestPacket {
    fn size(&self) -> usize {
        self.size
    }
}

// ----------------------------------------------------------------------------
// Journal
// ----------------------------------------------------------------------------

/// Something a test sink was asked to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkEvent {
    Connect,
    Write(u64),
    Disconnect,
    Dispatch(i32),
}

/// Shared, waitable log of sink events
#[derive(Debug, Clone, Default)]
pub struct Journal {
    inner: Arc<(Mutex<Vec<SinkEvent>>, Condvar)>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: SinkEvent) {
        let (events, changed) = &*self.inner;
        events.lock().push(event);
        changed.notify_all();
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.inner.0.lock().clone()
    }

    /// Identifiers of written packets in execution order
    pub fn written(&self) -> Vec<u64> {
        self.inner
            .0
            .lock()
            .iter()
            .filter_map(|event| match event {
                SinkEvent::Write(id) => Some(*id),
                _ => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.0.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Block until at least `count` events are recorded
    ///
    /// Returns `false` if `timeout` elapsed first.
    pub fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let (events, changed) = &*self.inner;
        let mut events = events.lock();
        while events.len() < count {
            if changed.wait_until(&mut events, deadline).timed_out() {
                return events.len() >= count;
            }
        }
        true
    }
}

// ----------------------------------------------------------------------------
// Gate
// ----------------------------------------------------------------------------

#[derive(Debug, Default)]
struct GateState {
    open: bool,
    waiting: usize,
}

/// Blocks sink writes until a test opens it
#[derive(Debug, Clone, Default)]
pub struct Gate {
    inner: Arc<(Mutex<GateState>, Condvar)>,
}

impl Gate {
    /// Create a closed gate
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self) {
        let (state, changed) = &*self.inner;
        state.lock().open = true;
        changed.notify_all();
    }

    /// Block until a caller is held at the gate
    pub fn wait_for_waiter(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let (state, changed) = &*self.inner;
        let mut state = state.lock();
        while state.waiting == 0 && !state.open {
            if changed.wait_until(&mut state, deadline).timed_out() {
                return state.waiting > 0;
            }
        }
        true
    }

    fn pass(&self) {
        let (state, changed) = &*self.inner;
        let mut state = state.lock();
        if state.open {
            return;
        }
        state.waiting += 1;
        changed.notify_all();
        while !state.open {
            changed.wait(&mut state);
        }
        state.waiting -= 1;
    }
}

// ----------------------------------------------------------------------------
// Recording Sink
// ----------------------------------------------------------------------------

/// Sink that journals every command it executes
///
/// Optionally fails or panics on a chosen packet id, and can be held behind a
/// [`Gate`] so its worker stays busy while a test fills the backlog.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    journal: Journal,
    gate: Option<Gate>,
    fail_on: Option<u64>,
    panic_on: Option<u64>,
    write_delay: Option<Duration>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_gate(mut self, gate: Gate) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Return an error when writing the packet with this id
    pub fn fail_on(mut self, id: u64) -> Self {
        self.fail_on = Some(id);
        self
    }

    /// Panic when writing the packet with this id
    pub fn panic_on(mut self, id: u64) -> Self {
        self.panic_on = Some(id);
        self
    }

    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = Some(delay);
        self
    }

    /// Handle to the journal, shared with every clone of this sink
    pub fn journal(&self) -> Journal {
        self.journal.clone()
    }
}

impl Sink for RecordingSink {
    type Packet = TestPacket;

    fn connect(&mut self) -> Result<(), SinkError> {
        self.journal.record(SinkEvent::Connect);
        Ok(())
    }

    fn write_packet(&mut self, packet: &TestPacket) -> Result<(), SinkError> {
        if let Some(gate) = &self.gate {
            gate.pass();
        }
        if let Some(delay) = self.write_delay {
            std::thread::sleep(delay);
        }
        if self.panic_on == Some(packet.id) {
            panic!("test sink panicked on packet {}", packet.id);
        }
        if self.fail_on == Some(packet.id) {
            return Err(SinkError::protocol(format!("rejected packet {}", packet.id)));
        }
        self.journal.record(SinkEvent::Write(packet.id));
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), SinkError> {
        self.journal.record(SinkEvent::Disconnect);
        Ok(())
    }

    fn dispatch(&mut self, command: &ProtocolCommand) -> Result<(), SinkError> {
        self.journal.record(SinkEvent::Dispatch(command.action()));
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Failing Sink
// ----------------------------------------------------------------------------

/// Sink whose destination is gone
///
/// Every command fails with [`SinkError::NotConnected`]. After `fail_after`
/// failed attempts the sink reports itself as failed.
#[derive(Debug, Clone, Default)]
pub struct FailingSink {
    attempts: Journal,
    fail_after: usize,
    gate: Option<Gate>,
    held: Vec<(u64, Gate)>,
}

impl FailingSink {
    pub fn new(fail_after: usize) -> Self {
        Self {
            attempts: Journal::new(),
            fail_after,
            gate: None,
            held: Vec::new(),
        }
    }

    /// Hold packet writes at `gate` before failing them
    pub fn with_gate(mut self, gate: Gate) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Hold only the write of packet `id` at `gate`
    pub fn with_gate_on(mut self, id: u64, gate: Gate) -> Self {
        self.held.push((id, gate));
        self
    }

    /// Journal of attempted commands, successful or not
    pub fn attempts(&self) -> Journal {
        self.attempts.clone()
    }

    fn attempt(&self, event: SinkEvent) -> Result<(), SinkError> {
        self.attempts.record(event);
        Err(SinkError::NotConnected)
    }
}

impl Sink for FailingSink {
    type Packet = TestPacket;

    fn connect(&mut self) -> Result<(), SinkError> {
        self.attempt(SinkEvent::Connect)
    }

    fn write_packet(&mut self, packet: &TestPacket) -> Result<(), SinkError> {
        if let Some(gate) = &self.gate {
            gate.pass();
        }
        for (_, gate) in self.held.iter().filter(|(id, _)| *id == packet.id) {
            gate.pass();
        }
        self.attempt(SinkEvent::Write(packet.id))
    }

    fn disconnect(&mut self) -> Result<(), SinkError> {
        self.attempt(SinkEvent::Disconnect)
    }

    fn is_failed(&self) -> bool {
        self.attempts.len() >= self.fail_after
    }
}
