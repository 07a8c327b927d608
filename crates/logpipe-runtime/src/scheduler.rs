//! Asynchronous command scheduler
//!
//! A [`Scheduler`] owns one sink and one worker thread. Producers hand it
//! commands through [`Scheduler::schedule`], which never blocks on I/O; the
//! worker executes them against the sink in submission order.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use logpipe_core::{
    BacklogQueue, OverflowPolicy, SchedulerAction, SchedulerCommand, SchedulerConfig,
    SchedulerError, SchedulerStats, Sink,
};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::worker::{ErrorListener, Worker};

// ----------------------------------------------------------------------------
// Shared State
// ----------------------------------------------------------------------------

/// Lifecycle of a scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Idle,
    Running,
    Stopping,
    Stopped,
}

pub(crate) struct State<P> {
    pub(crate) queue: BacklogQueue<P>,
    pub(crate) phase: Phase,
    pub(crate) worker_exited: bool,
}

/// State shared between producers, the controlling handle and the worker
pub(crate) struct Shared<P> {
    pub(crate) state: Mutex<State<P>>,
    /// Signalled when work is queued or shutdown begins
    pub(crate) work: Condvar,
    /// Signalled when the worker leaves its loop
    pub(crate) exited: Condvar,
    pub(crate) stats: SchedulerStats,
}

struct Control<S> {
    sink: Option<S>,
    worker: Option<JoinHandle<()>>,
}

/// Result of [`Scheduler::stop`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The scheduler was never started; nothing to stop
    NotStarted,
    /// A previous call already stopped the scheduler
    AlreadyStopped,
    /// The worker drained the backlog and exited
    Stopped,
    /// The worker was still busy when the timeout elapsed
    TimedOut,
}

// ----------------------------------------------------------------------------
// Scheduler
// ----------------------------------------------------------------------------

/// Non-blocking command scheduler backed by a single worker thread
///
/// All methods take `&self`; share a scheduler between producer threads with
/// an `Arc`. Dropping the scheduler stops it, waiting up to the configured
/// shutdown timeout for the backlog to drain.
pub struct Scheduler<S: Sink> {
    id: Uuid,
    caption: String,
    config: SchedulerConfig,
    shared: Arc<Shared<S::Packet>>,
    control: Mutex<Control<S>>,
    error_listener: Option<ErrorListener>,
}

impl<S: Sink> Scheduler<S> {
    pub(crate) fn from_parts(
        sink: S,
        config: SchedulerConfig,
        caption: String,
        error_listener: Option<ErrorListener>,
    ) -> Self {
        let shared = Shared {
            state: Mutex::new(State {
                queue: BacklogQueue::with_overhead(config.item_overhead),
                phase: Phase::Idle,
                worker_exited: false,
            }),
            work: Condvar::new(),
            exited: Condvar::new(),
            stats: SchedulerStats::new(),
        };

        Self {
            id: Uuid::new_v4(),
            caption,
            config,
            shared: Arc::new(shared),
            control: Mutex::new(Control {
                sink: Some(sink),
                worker: None,
            }),
            error_listener,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn caption(&self) -> &str {
        &self.caption
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn stats(&self) -> &SchedulerStats {
        &self.shared.stats
    }

    /// Whether the worker is running and accepting commands
    pub fn is_running(&self) -> bool {
        self.shared.state.lock().phase == Phase::Running
    }

    /// Current backlog as `(commands, bytes)`
    pub fn backlog(&self) -> (usize, usize) {
        let state = self.shared.state.lock();
        (state.queue.count(), state.queue.total_bytes())
    }

    /// Start the worker thread
    ///
    /// Calling `start` on a running scheduler does nothing. A scheduler that
    /// has been stopped cannot be started again.
    pub fn start(&self) -> Result<(), SchedulerError> {
        let mut control = self.control.lock();

        {
            let mut state = self.shared.state.lock();
            match state.phase {
                Phase::Running => {
                    debug!("Scheduler {} already running", self.caption);
                    return Ok(());
                }
                Phase::Stopping | Phase::Stopped => return Err(SchedulerError::AlreadyStopped),
                Phase::Idle => {}
            }
            state.phase = Phase::Running;
        }

        let Some(sink) = control.sink.take() else {
            self.shared.state.lock().phase = Phase::Stopped;
            return Err(SchedulerError::AlreadyStopped);
        };

        let worker = Worker::new(
            sink,
            Arc::clone(&self.shared),
            self.config.batch_size,
            self.caption.clone(),
            self.error_listener.clone(),
        );

        let spawned = thread::Builder::new()
            .name(format!("logpipe-{}", self.caption))
            .spawn(move || worker.run());

        match spawned {
            Ok(handle) => {
                control.worker = Some(handle);
                info!("Scheduler {} ({}) started", self.caption, self.id);
                Ok(())
            }
            Err(e) => {
                error!("Failed to spawn worker for scheduler {}: {}", self.caption, e);
                let mut state = self.shared.state.lock();
                state.phase = Phase::Stopped;
                state.worker_exited = true;
                Err(SchedulerError::Spawn(e))
            }
        }
    }

    /// Stop accepting commands and wait for the backlog to drain
    ///
    /// Waits at most `timeout` for the worker to finish. When the timeout
    /// elapses the worker keeps draining in the background and
    /// [`StopOutcome::TimedOut`] is returned; calling `stop` again waits
    /// again.
    pub fn stop(&self, timeout: Duration) -> StopOutcome {
        let mut control = self.control.lock();
        let deadline = Instant::now() + timeout;

        let mut state = self.shared.state.lock();
        match state.phase {
            Phase::Idle => return StopOutcome::NotStarted,
            Phase::Stopped => return StopOutcome::AlreadyStopped,
            Phase::Running => {
                debug!(
                    "Stopping scheduler {} with {} commands pending",
                    self.caption,
                    state.queue.count()
                );
                state.phase = Phase::Stopping;
                self.shared.work.notify_all();
            }
            Phase::Stopping => {}
        }

        while !state.worker_exited {
            if self.shared.exited.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }

        if !state.worker_exited {
            warn!(
                "Scheduler {} did not stop within {:?}, {} commands still pending",
                self.caption,
                timeout,
                state.queue.count()
            );
            return StopOutcome::TimedOut;
        }

        state.phase = Phase::Stopped;
        drop(state);

        if let Some(handle) = control.worker.take() {
            if handle.join().is_err() {
                error!("Scheduler {} worker terminated abnormally", self.caption);
            }
        }

        info!("Scheduler {} ({}) stopped", self.caption, self.id);
        StopOutcome::Stopped
    }

    /// Queue a command for the worker
    ///
    /// Returns `false` if the command was not admitted: the scheduler is not
    /// running, the packet is larger than the whole backlog, or the overflow
    /// policy dropped it. Never blocks on the sink.
    pub fn schedule(&self, command: SchedulerCommand<S::Packet>) -> bool {
        let stats = &self.shared.stats;
        let mut state = self.shared.state.lock();

        if state.phase != Phase::Running {
            stats.record_rejected();
            debug!(
                "Scheduler {} rejected {} (not running)",
                self.caption,
                command.action()
            );
            return false;
        }

        if !self.admit(&mut state.queue, &command) {
            return false;
        }

        state.queue.enqueue(command);
        stats.record_scheduled();
        drop(state);

        self.shared.work.notify_one();
        true
    }

    /// Discard all pending commands, returning how many were removed
    pub fn clear(&self) -> usize {
        let removed = self.shared.state.lock().queue.clear();
        if removed > 0 {
            self.shared.stats.record_cleared(removed);
            debug!("Scheduler {} cleared {} pending commands", self.caption, removed);
        }
        removed
    }

    /// Make room for `command`, deciding whether it may be queued
    fn admit(
        &self,
        queue: &mut BacklogQueue<S::Packet>,
        command: &SchedulerCommand<S::Packet>,
    ) -> bool {
        let stats = &self.shared.stats;

        match command.action() {
            SchedulerAction::WritePacket => {
                let capacity = self.config.capacity_bytes;
                let cost = queue.cost_of(command);

                if cost > capacity {
                    stats.record_oversized();
                    warn!(
                        "Scheduler {} rejected packet of {} bytes (capacity {} bytes)",
                        self.caption, cost, capacity
                    );
                    return false;
                }

                let needed = queue.total_bytes() + cost;
                if needed > capacity {
                    let deficit = needed - capacity;

                    // Dropping must leave the backlog untouched
                    if self.config.overflow_policy == OverflowPolicy::DropIncoming
                        && queue.evictable_bytes() < deficit
                    {
                        stats.record_dropped();
                        warn!(
                            "Scheduler {} dropped packet of {} bytes, backlog full ({} of {} bytes)",
                            self.caption,
                            cost,
                            queue.total_bytes(),
                            capacity
                        );
                        return false;
                    }

                    let outcome = queue.trim_report(deficit);
                    stats.record_evicted(outcome.evicted, outcome.freed_bytes);
                }
            }
            SchedulerAction::Disconnect if self.config.clear_on_disconnect => {
                let removed = queue.clear();
                if removed > 0 {
                    stats.record_cleared(removed);
                    debug!(
                        "Scheduler {} cleared {} pending commands before disconnect",
                        self.caption, removed
                    );
                }
            }
            _ => {}
        }

        true
    }
}

impl<S: Sink> Drop for Scheduler<S> {
    fn drop(&mut self) {
        if self.stop(self.config.shutdown_timeout) == StopOutcome::TimedOut {
            warn!(
                "Scheduler {} dropped while its worker was still busy; detaching worker",
                self.caption
            );
        }
    }
}

impl<S: Sink> std::fmt::Debug for Scheduler<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (count, bytes) = self.backlog();
        f.debug_struct("Scheduler")
            .field("id", &self.id)
            .field("caption", &self.caption)
            .field("running", &self.is_running())
            .field("backlog_count", &count)
            .field("backlog_bytes", &bytes)
            .finish()
    }
}
